//! Live positioning and orientation engine for a track viewer.
//!
//! Location and orientation callbacks are normalised into [`SensorEvent`]s
//! and applied one at a time by a [`SensorSessionManager`], which filters
//! fixes, fuses heading and drives the map camera through the
//! [`platform`] traits.

pub mod config;
pub mod error;
pub mod filters;
pub mod follow;
pub mod geo;
pub mod platform;
pub mod runtime;
pub mod sensor_session;
pub mod sensors;
pub mod session;
pub mod status;
pub mod track;
pub mod types;

pub use config::TrackingConfig;
pub use error::{LocationErrorKind, TrackResult, TrackerError};
pub use sensor_session::{SensorSessionManager, TrackingEvent};
pub use session::{TrackingSession, UnifiedState};
pub use types::{Fix, HeadingSample, HeadingSource, OrientationReading, SensorEvent};
