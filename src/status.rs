use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::TrackResult;
use crate::follow::FollowState;
use crate::platform::{LocationPlatform, MapSurface, Notifier, OrientationPlatform};
use crate::sensor_session::SensorSessionManager;
use crate::session::UnifiedState;
use crate::types::HeadingSource;

/// Point-in-time snapshot of a running session, written as JSON.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrackingStatus {
    pub timestamp: f64,
    pub session_id: String,
    pub uptime_seconds: u64,
    pub unified_state: UnifiedState,
    pub follow_state: FollowState,
    pub gps_active: bool,
    pub compass_active: bool,
    pub compass_permission_pending: bool,
    // Counters
    pub fixes_received: u64,
    pub fixes_accepted: u64,
    pub fixes_rejected: u64,
    pub heading_updates: u64,
    pub camera_commands: u64,
    pub location_errors: u64,
    pub lock_breaks: u64,
    // Last accepted fix
    pub last_lat: Option<f64>,
    pub last_lon: Option<f64>,
    pub last_accuracy_m: Option<f64>,
    // Heading
    pub heading_deg: Option<f64>,
    pub heading_source: Option<HeadingSource>,
}

impl TrackingStatus {
    pub fn capture<M, N, L, O>(manager: &SensorSessionManager<M, N, L, O>, uptime_seconds: u64) -> Self
    where
        M: MapSurface,
        N: Notifier,
        L: LocationPlatform,
        O: OrientationPlatform,
    {
        let session = manager.session();
        let counters = manager.counters();
        let fix = session.last_accepted_fix.as_ref();

        Self {
            timestamp: crate::sensors::current_timestamp(),
            session_id: session.session_id.clone(),
            uptime_seconds,
            unified_state: session.unified_state(),
            follow_state: manager.follow_state(),
            gps_active: session.is_gps_active,
            compass_active: session.is_compass_active,
            compass_permission_pending: manager.is_permission_pending(),
            fixes_received: counters.fixes_received,
            fixes_accepted: counters.fixes_accepted,
            fixes_rejected: counters.fixes_rejected,
            heading_updates: counters.heading_updates,
            camera_commands: counters.camera_commands,
            location_errors: counters.location_errors,
            lock_breaks: manager.lock_breaks(),
            last_lat: fix.map(|f| f.point.latitude),
            last_lon: fix.map(|f| f.point.longitude),
            last_accuracy_m: fix.map(|f| f.accuracy_m),
            heading_deg: session.last_heading.map(|h| h.degrees),
            heading_source: session.last_heading.map(|h| h.source),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> TrackResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
