use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TrackResult, TrackerError};
use crate::platform::WatchOptions;

/// How the engine tells user pans from its own `set_view` calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureSource {
    /// The map surface emits a drag-start event only for user gestures.
    DragStart,
    /// Only generic view-change events exist; programmatic moves are
    /// recognised by matching them against the last issued command.
    ViewChangeInference,
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    // ── Position filter ──
    pub min_movement_m: f64,
    pub marker_accuracy_m: f64,
    pub follow_accuracy_m: f64,

    // ── Heading fuser ──
    pub min_heading_change_deg: f64,

    // ── Follow controller ──
    pub tracking_zoom: u8,
    pub relock_after_settle: bool,
    pub gesture_source: GestureSource,
    pub view_match_tolerance_m: f64,

    // ── Platform watch ──
    pub watch: WatchOptions,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_movement_m: 3.0,
            marker_accuracy_m: 100.0,
            follow_accuracy_m: 60.0,
            min_heading_change_deg: 5.0,
            tracking_zoom: 16,
            relock_after_settle: false,
            gesture_source: GestureSource::DragStart,
            view_match_tolerance_m: 1.0,
            watch: WatchOptions::default(),
        }
    }
}

impl TrackingConfig {
    /// Load overrides from a JSON file; missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> TrackResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: TrackingConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TrackResult<()> {
        let thresholds = [
            ("min_movement_m", self.min_movement_m),
            ("marker_accuracy_m", self.marker_accuracy_m),
            ("follow_accuracy_m", self.follow_accuracy_m),
            ("min_heading_change_deg", self.min_heading_change_deg),
            ("view_match_tolerance_m", self.view_match_tolerance_m),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(TrackerError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.min_heading_change_deg > 180.0 {
            return Err(TrackerError::Config(format!(
                "min_heading_change_deg must not exceed 180, got {}",
                self.min_heading_change_deg
            )));
        }
        if self.follow_accuracy_m > self.marker_accuracy_m {
            return Err(TrackerError::Config(format!(
                "follow_accuracy_m ({}) must not exceed marker_accuracy_m ({})",
                self.follow_accuracy_m, self.marker_accuracy_m
            )));
        }
        Ok(())
    }
}
