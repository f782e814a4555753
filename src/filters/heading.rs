//! Heading fusion with hysteresis.
//!
//! Compass readings are authoritative while the compass listener is active.
//! Otherwise heading falls back to the GPS course reported on the fix, then
//! to the bearing between the last two accepted positions.

use crate::config::TrackingConfig;
use crate::geo::{bearing_degrees, circular_difference};
use crate::session::TrackingSession;
use crate::types::{Fix, HeadingSample, HeadingSource, OrientationReading};

#[derive(Clone, Copy, Debug)]
pub struct HeadingFuser {
    pub min_change_deg: f64,
}

impl HeadingFuser {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            min_change_deg: config.min_heading_change_deg,
        }
    }

    /// Returns `sample` if it differs enough from `previous` to be adopted.
    pub fn fuse(&self, sample: HeadingSample, previous: Option<&HeadingSample>) -> Option<HeadingSample> {
        match previous {
            None => Some(sample),
            Some(prev) if circular_difference(sample.degrees, prev.degrees) >= self.min_change_deg => {
                Some(sample)
            }
            Some(_) => None,
        }
    }

    /// GPS-derived heading for `current`, ignoring the compass entirely.
    ///
    /// `previous` is the fix accepted before `current`, if any.
    pub fn gps_heading(&self, current: &Fix, previous: Option<&Fix>) -> Option<HeadingSample> {
        if let Some(course) = current.course_deg() {
            return Some(HeadingSample::new(course, HeadingSource::GpsCourse));
        }
        let prev = previous?;
        if prev.point == current.point {
            return None;
        }
        Some(HeadingSample::new(
            bearing_degrees(prev.point, current.point),
            HeadingSource::MovementBearing,
        ))
    }

    /// Heading update caused by a newly accepted fix.
    pub fn on_fix(
        &self,
        session: &TrackingSession,
        current: &Fix,
        previous: Option<&Fix>,
    ) -> Option<HeadingSample> {
        if session.is_compass_active {
            return None;
        }
        let sample = self.gps_heading(current, previous)?;
        self.fuse(sample, session.last_heading.as_ref())
    }

    /// Heading update caused by an orientation event.
    pub fn on_orientation(
        &self,
        session: &TrackingSession,
        reading: &OrientationReading,
    ) -> Option<HeadingSample> {
        if !session.is_compass_active {
            return None;
        }
        let degrees = reading.heading_deg()?;
        let previous = session
            .last_heading
            .as_ref()
            .filter(|h| h.source == HeadingSource::Compass);
        self.fuse(HeadingSample::new(degrees, HeadingSource::Compass), previous)
    }
}

impl Default for HeadingFuser {
    fn default() -> Self {
        Self::new(&TrackingConfig::default())
    }
}
