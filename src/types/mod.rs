use serde::{Deserialize, Serialize};

use crate::error::LocationErrorKind;
use crate::geo::{normalize_degrees, GeoPoint};
use crate::platform::PermissionOutcome;

/// One location sample as reported by the platform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub point: GeoPoint,
    pub accuracy_m: f64,
    /// Device-reported course over ground. Browsers report `NaN` or nothing
    /// while stationary; see [`Fix::course_deg`].
    #[serde(default)]
    pub reported_heading_deg: Option<f64>,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

impl Fix {
    pub fn new(point: GeoPoint, accuracy_m: f64, timestamp: f64) -> Self {
        Self {
            point,
            accuracy_m: accuracy_m.max(0.0),
            reported_heading_deg: None,
            timestamp,
        }
    }

    pub fn with_heading(mut self, heading_deg: f64) -> Self {
        self.reported_heading_deg = Some(heading_deg);
        self
    }

    /// The reported course, if present and numeric, wrapped into `[0, 360)`.
    pub fn course_deg(&self) -> Option<f64> {
        self.reported_heading_deg
            .filter(|h| h.is_finite())
            .map(normalize_degrees)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadingSource {
    Compass,
    GpsCourse,
    MovementBearing,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeadingSample {
    pub degrees: f64,
    pub source: HeadingSource,
}

impl HeadingSample {
    pub fn new(degrees: f64, source: HeadingSource) -> Self {
        Self {
            degrees: normalize_degrees(degrees),
            source,
        }
    }
}

/// Raw device-orientation event.
///
/// `compass_heading` is an absolute clockwise heading where the platform
/// provides one directly. Otherwise `alpha` is the counter-clockwise rotation
/// about the z axis, meaningful as a heading only when `absolute` is set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrientationReading {
    #[serde(default)]
    pub compass_heading: Option<f64>,
    #[serde(default)]
    pub alpha: Option<f64>,
    #[serde(default)]
    pub absolute: bool,
    pub timestamp: f64,
}

impl OrientationReading {
    /// Clockwise heading from north, if this reading carries one.
    pub fn heading_deg(&self) -> Option<f64> {
        if let Some(h) = self.compass_heading.filter(|h| h.is_finite()) {
            return Some(normalize_degrees(h));
        }
        if self.absolute {
            return self
                .alpha
                .filter(|a| a.is_finite())
                .map(|a| normalize_degrees(360.0 - a));
        }
        None
    }
}

/// Everything that can happen to a tracking session, in delivery order.
///
/// Platform callbacks and user gestures are converted to these by the
/// adapter layer and handed to `SensorSessionManager::dispatch` one at a time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SensorEvent {
    Position(Fix),
    LocationError(LocationErrorKind),
    Orientation(OrientationReading),
    PermissionResolved(PermissionOutcome),
    /// Drag gesture started by the user (never by a programmatic `set_view`).
    MapDragStart,
    /// Generic view change; may be user or programmatic in origin.
    MapViewChanged { center: GeoPoint, zoom: u8 },
    MapViewSettled,
    /// Fine-grained and unified controls.
    StartTracking,
    StopTracking,
    SetGps(bool),
    SetLock(bool),
    SetCompass(bool),
}
