use crate::config::TrackingConfig;
use crate::geo::distance_meters;
use crate::types::Fix;

/// What an accepted fix is trusted to drive, by its reported accuracy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccuracyGate {
    pub show_marker: bool,
    pub drive_camera: bool,
}

/// Movement filter that suppresses GPS dither while stationary.
#[derive(Clone, Copy, Debug)]
pub struct PositionFilter {
    pub min_movement_m: f64,
    pub marker_accuracy_m: f64,
    pub follow_accuracy_m: f64,
}

impl PositionFilter {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            min_movement_m: config.min_movement_m,
            marker_accuracy_m: config.marker_accuracy_m,
            follow_accuracy_m: config.follow_accuracy_m,
        }
    }

    /// Accept the first fix of a session, then only fixes that moved at
    /// least `min_movement_m` from the previously accepted one.
    pub fn accept(&self, candidate: &Fix, previous: Option<&Fix>) -> bool {
        match previous {
            None => true,
            Some(prev) => distance_meters(candidate.point, prev.point) >= self.min_movement_m,
        }
    }

    /// Accuracy gate, applied independently of [`accept`](Self::accept).
    pub fn gate(&self, fix: &Fix) -> AccuracyGate {
        AccuracyGate {
            show_marker: fix.accuracy_m <= self.marker_accuracy_m,
            drive_camera: self.within_follow_threshold(fix),
        }
    }

    pub fn within_follow_threshold(&self, fix: &Fix) -> bool {
        fix.accuracy_m <= self.follow_accuracy_m
    }
}

impl Default for PositionFilter {
    fn default() -> Self {
        Self::new(&TrackingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;

    fn fix_at(point: GeoPoint, accuracy_m: f64) -> Fix {
        Fix::new(point, accuracy_m, 0.0)
    }

    #[test]
    fn test_first_fix_always_accepted() {
        let filter = PositionFilter::default();
        assert!(filter.accept(&fix_at(GeoPoint::new(0.0, 0.0), 500.0), None));
    }

    #[test]
    fn test_movement_threshold() {
        let filter = PositionFilter::default();
        let origin = GeoPoint::new(0.0, 0.0);
        let previous = fix_at(origin, 5.0);

        let near = fix_at(origin.offset(0.0, 2.0), 5.0);
        assert!(!filter.accept(&near, Some(&previous)));

        let far = fix_at(origin.offset(0.0, 5.0), 5.0);
        assert!(filter.accept(&far, Some(&previous)));
    }

    #[test]
    fn test_identical_position_rejected() {
        let filter = PositionFilter::default();
        let p = GeoPoint::new(12.0, 34.0);
        assert!(!filter.accept(&fix_at(p, 5.0), Some(&fix_at(p, 5.0))));
    }

    #[test]
    fn test_accuracy_gate_tiers() {
        let filter = PositionFilter::default();
        let p = GeoPoint::new(0.0, 0.0);

        let good = filter.gate(&fix_at(p, 40.0));
        assert!(good.show_marker && good.drive_camera);

        let display_only = filter.gate(&fix_at(p, 80.0));
        assert!(display_only.show_marker);
        assert!(!display_only.drive_camera);

        let poor = filter.gate(&fix_at(p, 150.0));
        assert!(!poor.show_marker && !poor.drive_camera);

        let boundary = filter.gate(&fix_at(p, 60.0));
        assert!(boundary.drive_camera);
    }
}
