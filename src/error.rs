use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified platform location failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationErrorKind {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    Unknown,
}

impl LocationErrorKind {
    /// Map a W3C geolocation `PositionError.code` onto a kind.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => LocationErrorKind::PermissionDenied,
            2 => LocationErrorKind::PositionUnavailable,
            3 => LocationErrorKind::Timeout,
            _ => LocationErrorKind::Unknown,
        }
    }

    /// Text shown to the user through the notification sink.
    pub fn user_message(&self) -> &'static str {
        match self {
            LocationErrorKind::PermissionDenied => {
                "Location access was denied. Allow location access in your browser settings to track your position."
            }
            LocationErrorKind::PositionUnavailable => {
                "Your position is currently unavailable. Still trying..."
            }
            LocationErrorKind::Timeout => "Locating you is taking longer than expected. Still trying...",
            LocationErrorKind::Unknown => "An unknown error occurred while getting your location.",
        }
    }

    /// Whether the platform may recover on its own while the watch keeps running.
    pub fn is_transient(&self) -> bool {
        !matches!(self, LocationErrorKind::PermissionDenied)
    }
}

/// Tracking engine error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error("{0} is not supported on this device")]
    CapabilityAbsent(&'static str),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Location error: {0:?}")]
    Location(LocationErrorKind),

    #[error("Invalid track name: {0}")]
    InvalidTrackName(String),

    #[error("Track load failed: {0}")]
    TrackLoad(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TrackerError {
    fn from(err: std::io::Error) -> Self {
        TrackerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Config(err.to_string())
    }
}

/// Result type for engine operations
pub type TrackResult<T> = Result<T, TrackerError>;
