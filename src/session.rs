use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::{Fix, HeadingSample, HeadingSource};

/// What the single "start/stop tracking" control displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifiedState {
    /// No tracking feature is running
    Stopped,
    /// At least one of GPS, lock or compass is running
    Tracking,
}

/// All mutable tracking state for one viewer.
///
/// Owned by the session manager and passed by reference to the filter,
/// fuser and controller; none of them hold state of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSession {
    pub session_id: String,
    pub is_gps_active: bool,
    pub is_compass_active: bool,
    pub is_locked: bool,
    pub last_accepted_fix: Option<Fix>,
    pub last_heading: Option<HeadingSample>,
    pub has_performed_initial_zoom: bool,
    /// The position marker is currently on the map.
    pub marker_shown: bool,
}

impl TrackingSession {
    pub fn new() -> Self {
        Self {
            session_id: format!("session_{}", Utc::now().timestamp_millis()),
            is_gps_active: false,
            is_compass_active: false,
            is_locked: false,
            last_accepted_fix: None,
            last_heading: None,
            has_performed_initial_zoom: false,
            marker_shown: false,
        }
    }

    pub fn unified_state(&self) -> UnifiedState {
        if self.is_gps_active || self.is_locked || self.is_compass_active {
            UnifiedState::Tracking
        } else {
            UnifiedState::Stopped
        }
    }

    /// Clear everything tied to a running GPS watch.
    ///
    /// Lock cannot outlive GPS, and the next session must redo its first-lock
    /// zoom.
    pub fn reset_gps_state(&mut self) {
        self.is_gps_active = false;
        self.is_locked = false;
        self.last_accepted_fix = None;
        self.has_performed_initial_zoom = false;
        self.marker_shown = false;
        if matches!(
            self.last_heading.map(|h| h.source),
            Some(HeadingSource::GpsCourse | HeadingSource::MovementBearing)
        ) {
            self.last_heading = None;
        }
    }

    /// Forget the compass heading so GPS fallback starts clean.
    pub fn reset_compass_state(&mut self) {
        self.is_compass_active = false;
        if matches!(self.last_heading.map(|h| h.source), Some(HeadingSource::Compass)) {
            self.last_heading = None;
        }
    }

    /// Holds whenever no event handler is mid-flight.
    pub fn invariants_hold(&self) -> bool {
        (!self.is_locked || self.is_gps_active)
            && (self.is_gps_active || self.last_accepted_fix.is_none())
            && (self.is_gps_active || !self.has_performed_initial_zoom)
    }
}

impl Default for TrackingSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;

    #[test]
    fn test_new_session_is_stopped() {
        let session = TrackingSession::new();
        assert_eq!(session.unified_state(), UnifiedState::Stopped);
        assert!(!session.is_locked);
        assert!(!session.has_performed_initial_zoom);
        assert!(session.session_id.starts_with("session_"));
        assert!(session.invariants_hold());
    }

    #[test]
    fn test_any_feature_means_tracking() {
        let mut session = TrackingSession::new();
        session.is_compass_active = true;
        assert_eq!(session.unified_state(), UnifiedState::Tracking);
        session.is_compass_active = false;
        session.is_gps_active = true;
        assert_eq!(session.unified_state(), UnifiedState::Tracking);
    }

    #[test]
    fn test_reset_gps_state_clears_lock_and_zoom() {
        let mut session = TrackingSession::new();
        session.is_gps_active = true;
        session.is_locked = true;
        session.has_performed_initial_zoom = true;
        session.last_accepted_fix = Some(Fix::new(GeoPoint::new(1.0, 1.0), 5.0, 0.0));
        session.last_heading = Some(HeadingSample::new(90.0, HeadingSource::MovementBearing));

        session.reset_gps_state();

        assert!(!session.is_locked);
        assert!(!session.has_performed_initial_zoom);
        assert!(session.last_accepted_fix.is_none());
        assert!(session.last_heading.is_none());
        assert!(session.invariants_hold());
    }

    #[test]
    fn test_reset_gps_state_keeps_compass_heading() {
        let mut session = TrackingSession::new();
        session.is_gps_active = true;
        session.is_compass_active = true;
        session.last_heading = Some(HeadingSample::new(45.0, HeadingSource::Compass));

        session.reset_gps_state();

        assert_eq!(session.last_heading.map(|h| h.source), Some(HeadingSource::Compass));
        session.reset_compass_state();
        assert!(session.last_heading.is_none());
    }
}
