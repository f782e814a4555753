//! In-memory collaborators that record what the engine asked of them.
//!
//! Used by the test suites and by the `replay` and demo binaries, where there
//! is no real map widget or sensor API behind the engine.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::{
    Bounds, LocationPlatform, MapSurface, Notifier, OrientationPlatform, PermissionOutcome,
    PermissionRequest, Severity, ViewOptions, WatchId, WatchOptions,
};
use crate::error::{TrackResult, TrackerError};
use crate::geo::GeoPoint;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum MapCommand {
    SetView {
        center: GeoPoint,
        zoom: u8,
        animate: bool,
    },
    AddMarker {
        point: GeoPoint,
        heading_deg: Option<f64>,
    },
    UpdateMarker {
        point: GeoPoint,
        heading_deg: Option<f64>,
    },
    RemoveMarker,
}

/// Map double whose visible region follows every `set_view`.
#[derive(Clone, Debug)]
pub struct RecordingMap {
    pub commands: Vec<MapCommand>,
    pub marker: Option<(GeoPoint, Option<f64>)>,
    zoom: u8,
    bounds: Bounds,
    half_lat: f64,
    half_lon: f64,
}

impl RecordingMap {
    /// A map showing `center` with a viewport of the given half-extents (degrees).
    pub fn new(center: GeoPoint, zoom: u8, half_lat: f64, half_lon: f64) -> Self {
        Self {
            commands: Vec::new(),
            marker: None,
            zoom,
            bounds: Bounds::around(center, half_lat, half_lon),
            half_lat,
            half_lon,
        }
    }

    pub fn set_view_commands(&self) -> Vec<&MapCommand> {
        self.commands
            .iter()
            .filter(|c| matches!(c, MapCommand::SetView { .. }))
            .collect()
    }

    pub fn last_set_view(&self) -> Option<&MapCommand> {
        self.set_view_commands().last().copied()
    }

    /// Simulate the user zooming with the mouse wheel.
    pub fn user_zoom(&mut self, zoom: u8) {
        self.zoom = zoom;
    }

    /// Simulate the user panning the viewport.
    pub fn user_pan(&mut self, center: GeoPoint) {
        self.bounds = Bounds::around(center, self.half_lat, self.half_lon);
    }
}

impl Default for RecordingMap {
    fn default() -> Self {
        Self::new(GeoPoint::new(0.0, 0.0), 3, 0.01, 0.01)
    }
}

impl MapSurface for RecordingMap {
    fn set_view(&mut self, center: GeoPoint, zoom: u8, options: ViewOptions) {
        self.zoom = zoom;
        self.bounds = Bounds::around(center, self.half_lat, self.half_lon);
        self.commands.push(MapCommand::SetView {
            center,
            zoom,
            animate: options.animate,
        });
    }

    fn zoom(&self) -> u8 {
        self.zoom
    }

    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn add_marker(&mut self, point: GeoPoint, heading_deg: Option<f64>) {
        self.marker = Some((point, heading_deg));
        self.commands.push(MapCommand::AddMarker { point, heading_deg });
    }

    fn update_marker(&mut self, point: GeoPoint, heading_deg: Option<f64>) {
        self.marker = Some((point, heading_deg));
        self.commands.push(MapCommand::UpdateMarker { point, heading_deg });
    }

    fn remove_marker(&mut self) {
        self.marker = None;
        self.commands.push(MapCommand::RemoveMarker);
    }
}

#[derive(Clone, Debug, Default)]
pub struct CollectingNotifier {
    pub messages: Vec<(String, Severity)>,
}

impl CollectingNotifier {
    pub fn errors(&self) -> usize {
        self.messages
            .iter()
            .filter(|(_, s)| *s == Severity::Error)
            .count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages.iter().any(|(m, _)| m.contains(needle))
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&mut self, message: &str, severity: Severity) {
        log::debug!("[notify] {:?}: {}", severity, message);
        self.messages.push((message.to_string(), severity));
    }
}

/// Location service double; fixes are injected as events by the caller.
#[derive(Clone, Debug)]
pub struct ScriptedLocation {
    pub supported: bool,
    pub active: Option<WatchId>,
    pub watch_calls: u32,
    pub clear_calls: u32,
    pub last_options: Option<WatchOptions>,
    next_id: u32,
}

impl ScriptedLocation {
    pub fn new(supported: bool) -> Self {
        Self {
            supported,
            active: None,
            watch_calls: 0,
            clear_calls: 0,
            last_options: None,
            next_id: 1,
        }
    }
}

impl Default for ScriptedLocation {
    fn default() -> Self {
        Self::new(true)
    }
}

impl LocationPlatform for ScriptedLocation {
    fn watch_position(&mut self, options: &WatchOptions) -> TrackResult<WatchId> {
        self.watch_calls += 1;
        if !self.supported {
            return Err(TrackerError::CapabilityAbsent("Geolocation"));
        }
        let id = WatchId(self.next_id);
        self.next_id += 1;
        self.active = Some(id);
        self.last_options = Some(options.clone());
        Ok(id)
    }

    fn clear_watch(&mut self, id: WatchId) {
        self.clear_calls += 1;
        if self.active == Some(id) {
            self.active = None;
        }
    }
}

/// Orientation double.
///
/// With `auto_answer` set, permission requests resolve immediately; otherwise
/// the sender is parked in `pending` so a test can answer it later.
#[derive(Debug, Default)]
pub struct ScriptedOrientation {
    pub available: bool,
    pub requires_permission: bool,
    pub auto_answer: Option<PermissionOutcome>,
    pub subscribed: bool,
    pub permission_requests: u32,
    pub pending: Vec<oneshot::Sender<PermissionOutcome>>,
}

impl ScriptedOrientation {
    /// Orientation available without a consent prompt.
    pub fn open() -> Self {
        Self {
            available: true,
            ..Default::default()
        }
    }

    /// Orientation behind a consent prompt that answers `outcome`.
    pub fn gated(outcome: Option<PermissionOutcome>) -> Self {
        Self {
            available: true,
            requires_permission: true,
            auto_answer: outcome,
            ..Default::default()
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }
}

impl OrientationPlatform for ScriptedOrientation {
    fn is_available(&self) -> bool {
        self.available
    }

    fn requires_permission(&self) -> bool {
        self.requires_permission
    }

    fn request_permission(&mut self) -> PermissionRequest {
        self.permission_requests += 1;
        match self.auto_answer {
            Some(outcome) => PermissionRequest::resolved(outcome),
            None => {
                let (tx, request) = PermissionRequest::channel();
                self.pending.push(tx);
                request
            }
        }
    }

    fn subscribe(&mut self) -> TrackResult<()> {
        if !self.available {
            return Err(TrackerError::CapabilityAbsent("Device orientation"));
        }
        self.subscribed = true;
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.subscribed = false;
    }
}
