//! Contracts for the collaborators the engine drives or is driven by.
//!
//! The engine never talks to a browser directly. An adapter implements these
//! traits on top of the real map widget and sensor APIs and converts every
//! callback into a [`SensorEvent`](crate::types::SensorEvent).

pub mod recording;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::TrackResult;
use crate::geo::GeoPoint;

/// Axis-aligned lat/lon rectangle of the visible map.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// Rectangle of the given half-extents centred on `center`.
    pub fn around(center: GeoPoint, half_lat: f64, half_lon: f64) -> Self {
        Self {
            south: center.latitude - half_lat,
            west: center.longitude - half_lon,
            north: center.latitude + half_lat,
            east: center.longitude + half_lon,
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        let lat_ok = point.latitude >= self.south && point.latitude <= self.north;
        let lon_ok = if self.west <= self.east {
            point.longitude >= self.west && point.longitude <= self.east
        } else {
            // view straddles the antimeridian
            point.longitude >= self.west || point.longitude <= self.east
        };
        lat_ok && lon_ok
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewOptions {
    pub animate: bool,
}

/// The map widget the engine moves and annotates.
pub trait MapSurface {
    fn set_view(&mut self, center: GeoPoint, zoom: u8, options: ViewOptions);
    fn zoom(&self) -> u8;
    fn bounds(&self) -> Bounds;
    fn add_marker(&mut self, point: GeoPoint, heading_deg: Option<f64>);
    fn update_marker(&mut self, point: GeoPoint, heading_deg: Option<f64>);
    fn remove_marker(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Error,
}

/// Auto-dismissing user notices.
pub trait Notifier {
    fn notify(&mut self, message: &str, severity: Severity);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchId(pub u32);

/// Options handed to the platform's continuous position watch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    pub timeout_ms: u64,
    pub max_cache_age_ms: u64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 10_000,
            max_cache_age_ms: 0,
        }
    }
}

/// Continuous position observation.
///
/// Fixes and errors produced by an active watch reach the engine as
/// `SensorEvent::Position` / `SensorEvent::LocationError`.
pub trait LocationPlatform {
    /// Fails with `TrackerError::CapabilityAbsent` when the device has no
    /// location service.
    fn watch_position(&mut self, options: &WatchOptions) -> TrackResult<WatchId>;
    fn clear_watch(&mut self, id: WatchId);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOutcome {
    Granted,
    Denied,
    Unavailable,
}

/// One-shot orientation permission prompt.
///
/// Resolves to the platform's answer. If the platform side is dropped without
/// answering, the request resolves to [`PermissionOutcome::Unavailable`].
#[derive(Debug)]
pub struct PermissionRequest {
    rx: oneshot::Receiver<PermissionOutcome>,
}

impl PermissionRequest {
    /// A request plus the sender the platform answers through.
    pub fn channel() -> (oneshot::Sender<PermissionOutcome>, PermissionRequest) {
        let (tx, rx) = oneshot::channel();
        (tx, PermissionRequest { rx })
    }

    /// A request that is already answered.
    pub fn resolved(outcome: PermissionOutcome) -> PermissionRequest {
        let (tx, request) = Self::channel();
        // receiver is alive, send cannot fail
        let _ = tx.send(outcome);
        request
    }

    /// Non-blocking check, for callers without an async runtime.
    pub fn try_outcome(&mut self) -> Option<PermissionOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(PermissionOutcome::Unavailable),
        }
    }
}

impl Future for PermissionRequest {
    type Output = PermissionOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(PermissionOutcome::Unavailable),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Device-orientation listener, optionally gated by a user-consent prompt.
pub trait OrientationPlatform {
    fn is_available(&self) -> bool;
    fn requires_permission(&self) -> bool;
    fn request_permission(&mut self) -> PermissionRequest;
    /// Readings from an active subscription arrive as `SensorEvent::Orientation`.
    fn subscribe(&mut self) -> TrackResult<()>;
    fn unsubscribe(&mut self);
}
