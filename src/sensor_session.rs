// sensor_session.rs - event dispatch for one tracking session
//
// Owns the TrackingSession and the platform collaborators. Every platform
// callback and user action arrives as a SensorEvent and is applied in full
// before `dispatch` returns, so handlers never observe half-updated state.
// The filter, fuser and controller are pure; only this layer calls fallible
// platform services.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::TrackingConfig;
use crate::error::{LocationErrorKind, TrackerError};
use crate::filters::{HeadingFuser, PositionFilter};
use crate::follow::{CameraCommand, FollowController, FollowState, ViewState};
use crate::geo::{distance_meters, GeoPoint};
use crate::platform::{
    LocationPlatform, MapSurface, Notifier, OrientationPlatform, PermissionOutcome,
    PermissionRequest, Severity, ViewOptions, WatchId,
};
use crate::session::{TrackingSession, UnifiedState};
use crate::types::{Fix, HeadingSample, OrientationReading, SensorEvent};

// ─── Events ──────────────────────────────────────────────────────────────────

/// What handling one [`SensorEvent`] did.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackingEvent {
    GpsStarted { watch_id: u32 },
    GpsStopped,
    CapabilityAbsent { feature: String },
    FixAccepted { accuracy_m: f64, shows_marker: bool, drives_camera: bool },
    FixRejected { moved_m: f64 },
    HeadingAdopted { sample: HeadingSample },
    MarkerHidden,
    CameraMoved { command: CameraCommand },
    LockEngaged,
    LockReleased,
    LockBroken,
    CompassEnabled,
    CompassDisabled,
    PermissionRequested,
    PermissionDenied,
    LocationError { error: LocationErrorKind },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCounters {
    pub fixes_received: u64,
    pub fixes_accepted: u64,
    pub fixes_rejected: u64,
    pub heading_updates: u64,
    pub camera_commands: u64,
    pub location_errors: u64,
}

// ─── The session manager ─────────────────────────────────────────────────────

pub struct SensorSessionManager<M, N, L, O> {
    config: TrackingConfig,
    session: TrackingSession,

    filter: PositionFilter,
    fuser: HeadingFuser,
    follow: FollowController,

    // Collaborators
    map: M,
    notifier: N,
    location: L,
    orientation: O,

    // Platform handles
    watch_id: Option<WatchId>,
    compass_pending: bool,
    pending_permission: Option<PermissionRequest>,

    // Capability notices are shown once per manager
    gps_absence_reported: bool,
    compass_absence_reported: bool,

    counters: SessionCounters,
}

impl<M, N, L, O> SensorSessionManager<M, N, L, O>
where
    M: MapSurface,
    N: Notifier,
    L: LocationPlatform,
    O: OrientationPlatform,
{
    pub fn new(config: TrackingConfig, map: M, notifier: N, location: L, orientation: O) -> Self {
        Self {
            filter: PositionFilter::new(&config),
            fuser: HeadingFuser::new(&config),
            follow: FollowController::new(&config),
            session: TrackingSession::new(),
            map,
            notifier,
            location,
            orientation,
            watch_id: None,
            compass_pending: false,
            pending_permission: None,
            gps_absence_reported: false,
            compass_absence_reported: false,
            counters: SessionCounters::default(),
            config,
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────────

    /// Apply one event completely.
    pub fn dispatch(&mut self, event: SensorEvent) -> Vec<TrackingEvent> {
        let mut events = Vec::new();
        self.follow.begin_tick();

        match event {
            SensorEvent::Position(fix) => self.handle_fix(fix, &mut events),
            SensorEvent::LocationError(kind) => self.handle_location_error(kind, &mut events),
            SensorEvent::Orientation(reading) => self.handle_orientation(&reading, &mut events),
            SensorEvent::PermissionResolved(outcome) => self.handle_permission(outcome, &mut events),
            SensorEvent::MapDragStart => {
                if self.follow.on_drag_start(&mut self.session) {
                    events.push(TrackingEvent::LockBroken);
                }
            }
            SensorEvent::MapViewChanged { center, zoom } => {
                if self.follow.on_view_changed(&mut self.session, center, zoom) {
                    events.push(TrackingEvent::LockBroken);
                }
            }
            SensorEvent::MapViewSettled => {
                let view = ViewState::of(&self.map);
                let was_locked = self.session.is_locked;
                let command = self.follow.on_view_settled(&mut self.session, &view);
                if !was_locked && self.session.is_locked {
                    events.push(TrackingEvent::LockEngaged);
                }
                if let Some(command) = command {
                    self.apply_camera(command, &mut events);
                }
            }
            SensorEvent::StartTracking => self.start_tracking_into(&mut events),
            SensorEvent::StopTracking => self.stop_tracking_into(&mut events),
            SensorEvent::SetGps(true) => self.start_gps_into(&mut events),
            SensorEvent::SetGps(false) => self.stop_gps_into(&mut events),
            SensorEvent::SetLock(on) => self.set_lock_into(on, &mut events),
            SensorEvent::SetCompass(true) => self.enable_compass_into(&mut events),
            SensorEvent::SetCompass(false) => self.disable_compass_into(&mut events),
        }

        debug_assert!(self.session.invariants_hold());
        events
    }

    // ── Public operations ────────────────────────────────────────────────

    pub fn start_gps(&mut self) -> Vec<TrackingEvent> {
        self.dispatch(SensorEvent::SetGps(true))
    }

    pub fn stop_gps(&mut self) -> Vec<TrackingEvent> {
        self.dispatch(SensorEvent::SetGps(false))
    }

    pub fn enable_compass(&mut self) -> Vec<TrackingEvent> {
        self.dispatch(SensorEvent::SetCompass(true))
    }

    pub fn disable_compass(&mut self) -> Vec<TrackingEvent> {
        self.dispatch(SensorEvent::SetCompass(false))
    }

    pub fn set_lock(&mut self, on: bool) -> Vec<TrackingEvent> {
        self.dispatch(SensorEvent::SetLock(on))
    }

    /// GPS, lock and compass together.
    pub fn start_tracking(&mut self) -> Vec<TrackingEvent> {
        self.dispatch(SensorEvent::StartTracking)
    }

    pub fn stop_tracking(&mut self) -> Vec<TrackingEvent> {
        self.dispatch(SensorEvent::StopTracking)
    }

    /// Hand an outstanding permission prompt to whoever drives the event loop.
    ///
    /// The answer must come back through `SensorEvent::PermissionResolved`.
    pub fn take_permission_request(&mut self) -> Option<PermissionRequest> {
        self.pending_permission.take()
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn session(&self) -> &TrackingSession {
        &self.session
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    pub fn follow_state(&self) -> FollowState {
        self.follow.state(&self.session)
    }

    pub fn lock_breaks(&self) -> u64 {
        self.follow.lock_breaks()
    }

    pub fn unified_state(&self) -> UnifiedState {
        self.session.unified_state()
    }

    pub fn is_permission_pending(&self) -> bool {
        self.compass_pending
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut M {
        &mut self.map
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn location(&self) -> &L {
        &self.location
    }

    pub fn orientation(&self) -> &O {
        &self.orientation
    }

    pub fn orientation_mut(&mut self) -> &mut O {
        &mut self.orientation
    }

    // ── GPS lifecycle ────────────────────────────────────────────────────

    fn start_gps_into(&mut self, events: &mut Vec<TrackingEvent>) {
        if self.session.is_gps_active {
            return;
        }
        match self.location.watch_position(&self.config.watch) {
            Ok(id) => {
                self.watch_id = Some(id);
                self.session.is_gps_active = true;
                info!("[gps] watch {} started", id.0);
                events.push(TrackingEvent::GpsStarted { watch_id: id.0 });
            }
            Err(TrackerError::CapabilityAbsent(feature)) => {
                warn!("[gps] {} unavailable, GPS stays off", feature);
                if !self.gps_absence_reported {
                    self.gps_absence_reported = true;
                    let message = TrackerError::CapabilityAbsent(feature).to_string();
                    self.notifier.notify(&message, Severity::Error);
                }
                events.push(TrackingEvent::CapabilityAbsent {
                    feature: feature.to_string(),
                });
            }
            Err(err) => {
                warn!("[gps] failed to start watch: {}", err);
                self.notifier.notify(&err.to_string(), Severity::Error);
            }
        }
    }

    fn stop_gps_into(&mut self, events: &mut Vec<TrackingEvent>) {
        if !self.session.is_gps_active {
            return;
        }
        if let Some(id) = self.watch_id.take() {
            self.location.clear_watch(id);
        }
        if self.session.marker_shown {
            self.map.remove_marker();
        }
        let was_locked = self.session.is_locked;
        self.follow.release(&mut self.session);
        self.session.reset_gps_state();
        if was_locked {
            events.push(TrackingEvent::LockReleased);
        }
        info!("[gps] watch stopped");
        events.push(TrackingEvent::GpsStopped);
    }

    fn handle_fix(&mut self, fix: Fix, events: &mut Vec<TrackingEvent>) {
        self.counters.fixes_received += 1;
        if !self.session.is_gps_active {
            debug!("[gps] fix after watch stopped, ignoring");
            return;
        }
        if !fix.point.is_valid() || !fix.accuracy_m.is_finite() {
            warn!("[gps] malformed fix {:?}, ignoring", fix.point);
            return;
        }

        let previous = self.session.last_accepted_fix.clone();
        if !self.filter.accept(&fix, previous.as_ref()) {
            let moved_m = previous
                .as_ref()
                .map(|p| distance_meters(p.point, fix.point))
                .unwrap_or(0.0);
            self.counters.fixes_rejected += 1;
            debug!("[gps] moved {:.1} m, below movement threshold", moved_m);
            events.push(TrackingEvent::FixRejected { moved_m });
            return;
        }

        self.counters.fixes_accepted += 1;
        let gate = self.filter.gate(&fix);
        events.push(TrackingEvent::FixAccepted {
            accuracy_m: fix.accuracy_m,
            shows_marker: gate.show_marker,
            drives_camera: gate.drive_camera,
        });

        if let Some(sample) = self.fuser.on_fix(&self.session, &fix, previous.as_ref()) {
            self.adopt_heading(sample, events);
        }
        self.session.last_accepted_fix = Some(fix.clone());

        if gate.show_marker {
            self.show_marker(fix.point);
        } else if self.session.marker_shown {
            debug!("[gps] accuracy {:.0} m, hiding marker", fix.accuracy_m);
            self.map.remove_marker();
            self.session.marker_shown = false;
            events.push(TrackingEvent::MarkerHidden);
        }

        let view = ViewState::of(&self.map);
        if let Some(command) = self.follow.on_fix(&mut self.session, &fix, &view) {
            self.apply_camera(command, events);
        }
    }

    fn handle_location_error(&mut self, kind: LocationErrorKind, events: &mut Vec<TrackingEvent>) {
        self.counters.location_errors += 1;
        if !self.session.is_gps_active {
            return;
        }
        let severity = match kind {
            LocationErrorKind::PositionUnavailable | LocationErrorKind::Timeout => Severity::Info,
            LocationErrorKind::PermissionDenied | LocationErrorKind::Unknown => Severity::Error,
        };
        warn!("[gps] {}", TrackerError::Location(kind));
        self.notifier.notify(kind.user_message(), severity);
        events.push(TrackingEvent::LocationError { error: kind });

        if !kind.is_transient() {
            // the platform will not recover without the user
            self.stop_gps_into(events);
        }
    }

    // ── Compass lifecycle ────────────────────────────────────────────────

    fn enable_compass_into(&mut self, events: &mut Vec<TrackingEvent>) {
        if self.session.is_compass_active || self.compass_pending {
            return;
        }
        if !self.orientation.is_available() {
            self.report_compass_absent(events);
            return;
        }
        if !self.orientation.requires_permission() {
            self.activate_compass(events);
            return;
        }

        let mut request = self.orientation.request_permission();
        self.compass_pending = true;
        info!("[compass] permission requested");
        events.push(TrackingEvent::PermissionRequested);
        match request.try_outcome() {
            Some(outcome) => self.handle_permission(outcome, events),
            None => self.pending_permission = Some(request),
        }
    }

    fn disable_compass_into(&mut self, events: &mut Vec<TrackingEvent>) {
        if self.compass_pending {
            debug!("[compass] pending permission request cancelled");
            self.compass_pending = false;
            self.pending_permission = None;
        }
        if !self.session.is_compass_active {
            return;
        }
        self.orientation.unsubscribe();
        self.session.reset_compass_state();
        self.refresh_marker_heading();
        info!("[compass] listener stopped");
        events.push(TrackingEvent::CompassDisabled);
    }

    fn handle_permission(&mut self, outcome: PermissionOutcome, events: &mut Vec<TrackingEvent>) {
        if !self.compass_pending {
            debug!("[compass] permission answer {:?} after cancel, ignoring", outcome);
            return;
        }
        self.compass_pending = false;
        self.pending_permission = None;
        info!("[compass] permission {:?}", outcome);

        match outcome {
            PermissionOutcome::Granted => self.activate_compass(events),
            PermissionOutcome::Denied => {
                warn!("[compass] {}", TrackerError::PermissionDenied("device orientation".into()));
                self.notifier.notify(
                    "Compass access was denied. Heading will follow your movement instead.",
                    Severity::Error,
                );
                events.push(TrackingEvent::PermissionDenied);
            }
            PermissionOutcome::Unavailable => self.report_compass_absent(events),
        }
    }

    fn activate_compass(&mut self, events: &mut Vec<TrackingEvent>) {
        match self.orientation.subscribe() {
            Ok(()) => {
                self.session.is_compass_active = true;
                info!("[compass] listener started");
                events.push(TrackingEvent::CompassEnabled);
            }
            Err(TrackerError::CapabilityAbsent(_)) => self.report_compass_absent(events),
            Err(err) => {
                warn!("[compass] subscribe failed: {}", err);
                self.notifier.notify(&err.to_string(), Severity::Error);
            }
        }
    }

    fn report_compass_absent(&mut self, events: &mut Vec<TrackingEvent>) {
        let feature = "Device orientation";
        warn!("[compass] {} unavailable, compass stays off", feature);
        if !self.compass_absence_reported {
            self.compass_absence_reported = true;
            let message = TrackerError::CapabilityAbsent(feature).to_string();
            self.notifier.notify(&message, Severity::Error);
        }
        events.push(TrackingEvent::CapabilityAbsent {
            feature: feature.to_string(),
        });
    }

    fn handle_orientation(&mut self, reading: &OrientationReading, events: &mut Vec<TrackingEvent>) {
        if let Some(sample) = self.fuser.on_orientation(&self.session, reading) {
            self.adopt_heading(sample, events);
            self.refresh_marker_heading();
        }
    }

    // ── Lock and unified control ─────────────────────────────────────────

    fn set_lock_into(&mut self, on: bool, events: &mut Vec<TrackingEvent>) {
        if !on {
            if self.session.is_locked {
                self.follow.release(&mut self.session);
                events.push(TrackingEvent::LockReleased);
            }
            return;
        }
        if self.session.is_locked {
            return;
        }
        if !self.session.is_gps_active {
            self.start_gps_into(events);
            if !self.session.is_gps_active {
                return;
            }
        }
        let view = ViewState::of(&self.map);
        let command = self.follow.engage(&mut self.session, &view);
        events.push(TrackingEvent::LockEngaged);
        if let Some(command) = command {
            self.apply_camera(command, events);
        }
    }

    fn start_tracking_into(&mut self, events: &mut Vec<TrackingEvent>) {
        info!("[session] start tracking");
        self.start_gps_into(events);
        self.set_lock_into(true, events);
        self.enable_compass_into(events);
        if self.session.unified_state() == UnifiedState::Tracking {
            self.notifier.notify("Live tracking started", Severity::Success);
        }
    }

    fn stop_tracking_into(&mut self, events: &mut Vec<TrackingEvent>) {
        info!("[session] stop tracking");
        self.disable_compass_into(events);
        self.stop_gps_into(events);
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn adopt_heading(&mut self, sample: HeadingSample, events: &mut Vec<TrackingEvent>) {
        debug!("[heading] {:.1}° from {:?}", sample.degrees, sample.source);
        self.session.last_heading = Some(sample);
        self.counters.heading_updates += 1;
        events.push(TrackingEvent::HeadingAdopted { sample });
    }

    fn show_marker(&mut self, point: GeoPoint) {
        let heading = self.session.last_heading.map(|h| h.degrees);
        if self.session.marker_shown {
            self.map.update_marker(point, heading);
        } else {
            self.map.add_marker(point, heading);
            self.session.marker_shown = true;
        }
    }

    fn refresh_marker_heading(&mut self) {
        if !self.session.marker_shown {
            return;
        }
        if let Some(point) = self.session.last_accepted_fix.as_ref().map(|f| f.point) {
            let heading = self.session.last_heading.map(|h| h.degrees);
            self.map.update_marker(point, heading);
        }
    }

    fn apply_camera(&mut self, command: CameraCommand, events: &mut Vec<TrackingEvent>) {
        debug!(
            "[follow] set_view ({:.6}, {:.6}) z{} animate={}",
            command.center.latitude, command.center.longitude, command.zoom, command.animate
        );
        self.map.set_view(
            command.center,
            command.zoom,
            ViewOptions {
                animate: command.animate,
            },
        );
        self.counters.camera_commands += 1;
        events.push(TrackingEvent::CameraMoved { command });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::recording::{
        CollectingNotifier, MapCommand, RecordingMap, ScriptedLocation, ScriptedOrientation,
    };

    type TestManager =
        SensorSessionManager<RecordingMap, CollectingNotifier, ScriptedLocation, ScriptedOrientation>;

    fn manager_with(orientation: ScriptedOrientation) -> TestManager {
        SensorSessionManager::new(
            TrackingConfig::default(),
            RecordingMap::new(GeoPoint::new(40.0, -100.0), 4, 0.01, 0.01),
            CollectingNotifier::default(),
            ScriptedLocation::default(),
            orientation,
        )
    }

    fn manager() -> TestManager {
        manager_with(ScriptedOrientation::open())
    }

    fn fix(point: GeoPoint, accuracy_m: f64) -> SensorEvent {
        SensorEvent::Position(Fix::new(point, accuracy_m, 0.0))
    }

    #[test]
    fn test_start_gps_opens_watch_with_configured_options() {
        let mut m = manager();
        let events = m.start_gps();
        assert!(matches!(events[0], TrackingEvent::GpsStarted { .. }));
        assert!(m.session().is_gps_active);
        assert_eq!(m.location().last_options, Some(m.config().watch.clone()));

        // idempotent
        assert!(m.start_gps().is_empty());
        assert_eq!(m.location().watch_calls, 1);
    }

    #[test]
    fn test_start_gps_without_capability_is_soft() {
        let mut m = SensorSessionManager::new(
            TrackingConfig::default(),
            RecordingMap::default(),
            CollectingNotifier::default(),
            ScriptedLocation::new(false),
            ScriptedOrientation::open(),
        );
        m.start_gps();
        m.start_gps();
        assert!(!m.session().is_gps_active);
        assert_eq!(m.notifier().errors(), 1);
    }

    #[test]
    fn test_stop_gps_resets_everything() {
        let mut m = manager();
        m.set_lock(true);
        let p = GeoPoint::new(1.0, 1.0);
        m.dispatch(fix(p, 10.0));
        assert!(m.session().has_performed_initial_zoom);
        assert!(m.map().marker.is_some());

        m.stop_gps();
        let s = m.session();
        assert!(!s.is_gps_active && !s.is_locked && !s.has_performed_initial_zoom);
        assert!(s.last_accepted_fix.is_none());
        assert!(m.map().marker.is_none());
        assert!(m.location().active.is_none());

        // idempotent
        assert!(m.stop_gps().is_empty());
        assert_eq!(m.location().clear_calls, 1);
    }

    #[test]
    fn test_fix_after_stop_is_ignored() {
        let mut m = manager();
        m.start_gps();
        m.stop_gps();
        m.dispatch(fix(GeoPoint::new(1.0, 1.0), 10.0));
        assert!(m.session().last_accepted_fix.is_none());
    }

    #[test]
    fn test_movement_rejection_leaves_state_untouched() {
        let mut m = manager();
        m.start_gps();
        let a = GeoPoint::new(1.0, 1.0);
        m.dispatch(fix(a, 10.0));
        let before = m.session().clone();
        let commands_before = m.map().commands.len();

        let events = m.dispatch(fix(a.offset(0.0, 1.0), 5.0));
        assert!(matches!(events[0], TrackingEvent::FixRejected { .. }));
        assert_eq!(m.session(), &before);
        assert_eq!(m.map().commands.len(), commands_before);
        assert_eq!(m.counters().fixes_rejected, 1);
    }

    #[test]
    fn test_set_lock_starts_gps() {
        let mut m = manager();
        let events = m.set_lock(true);
        assert!(m.session().is_gps_active);
        assert!(m.session().is_locked);
        assert!(events.contains(&TrackingEvent::LockEngaged));
    }

    #[test]
    fn test_set_lock_without_capability_stays_unlocked() {
        let mut m = SensorSessionManager::new(
            TrackingConfig::default(),
            RecordingMap::default(),
            CollectingNotifier::default(),
            ScriptedLocation::new(false),
            ScriptedOrientation::open(),
        );
        m.set_lock(true);
        assert!(!m.session().is_locked);
        assert!(m.session().invariants_hold());
    }

    #[test]
    fn test_lock_entry_recenters_on_current_fix() {
        let mut m = manager();
        m.start_gps();
        let p = GeoPoint::new(1.0, 1.0);
        m.dispatch(fix(p, 30.0));
        assert!(m.map().set_view_commands().is_empty());

        m.set_lock(true);
        assert_eq!(
            m.map().last_set_view(),
            Some(&MapCommand::SetView {
                center: p,
                zoom: 16,
                animate: false
            })
        );
    }

    #[test]
    fn test_drag_breaks_lock_in_same_event() {
        let mut m = manager();
        m.set_lock(true);
        let p = GeoPoint::new(1.0, 1.0);
        m.dispatch(fix(p, 10.0));
        let moves = m.counters().camera_commands;

        let events = m.dispatch(SensorEvent::MapDragStart);
        assert_eq!(events, vec![TrackingEvent::LockBroken]);
        assert_eq!(m.follow_state(), FollowState::Unlocked);

        m.dispatch(fix(p.offset(90.0, 50.0), 10.0));
        assert_eq!(m.counters().camera_commands, moves);

        m.set_lock(true);
        assert_eq!(m.counters().camera_commands, moves + 1);
    }

    #[test]
    fn test_poor_fix_hides_existing_marker() {
        let mut m = manager();
        m.start_gps();
        let a = GeoPoint::new(1.0, 1.0);
        m.dispatch(fix(a, 10.0));
        assert!(m.map().marker.is_some());

        let events = m.dispatch(fix(a.offset(0.0, 20.0), 300.0));
        assert!(events.contains(&TrackingEvent::MarkerHidden));
        assert!(m.map().marker.is_none());
        assert_eq!(m.session().last_accepted_fix.as_ref().unwrap().accuracy_m, 300.0);
    }

    #[test]
    fn test_gps_heading_reaches_marker() {
        let mut m = manager();
        m.start_gps();
        let a = GeoPoint::new(1.0, 1.0);
        m.dispatch(fix(a, 10.0));
        m.dispatch(fix(a.offset(90.0, 30.0), 10.0));

        let heading = m.map().marker.and_then(|(_, h)| h).unwrap();
        assert!((heading - 90.0).abs() < 0.01);
    }

    #[test]
    fn test_compass_without_prompt() {
        let mut m = manager();
        m.start_gps();
        m.dispatch(fix(GeoPoint::new(1.0, 1.0), 10.0));
        let events = m.enable_compass();
        assert_eq!(events, vec![TrackingEvent::CompassEnabled]);
        assert!(m.orientation().subscribed);

        m.dispatch(SensorEvent::Orientation(OrientationReading {
            compass_heading: Some(123.0),
            ..Default::default()
        }));
        assert_eq!(m.session().last_heading.map(|h| h.degrees), Some(123.0));
        assert_eq!(m.map().marker.and_then(|(_, h)| h), Some(123.0));
    }

    #[test]
    fn test_compass_permission_granted_later() {
        let mut m = manager_with(ScriptedOrientation::gated(None));
        let events = m.enable_compass();
        assert_eq!(events, vec![TrackingEvent::PermissionRequested]);
        assert!(m.is_permission_pending());
        assert!(!m.session().is_compass_active);
        assert!(m.take_permission_request().is_some());
        // a second toggle while waiting does not prompt again
        assert!(m.enable_compass().is_empty());
        assert_eq!(m.orientation().permission_requests, 1);

        let events = m.dispatch(SensorEvent::PermissionResolved(PermissionOutcome::Granted));
        assert_eq!(events, vec![TrackingEvent::CompassEnabled]);
        assert!(m.session().is_compass_active);
    }

    #[test]
    fn test_compass_permission_denied() {
        let mut m = manager_with(ScriptedOrientation::gated(Some(PermissionOutcome::Denied)));
        let events = m.enable_compass();
        assert!(events.contains(&TrackingEvent::PermissionDenied));
        assert!(!m.session().is_compass_active);
        assert!(m.notifier().contains("Compass access was denied"));
    }

    #[test]
    fn test_cancelled_permission_answer_ignored() {
        let mut m = manager_with(ScriptedOrientation::gated(None));
        m.enable_compass();
        m.disable_compass();
        assert!(!m.is_permission_pending());

        let events = m.dispatch(SensorEvent::PermissionResolved(PermissionOutcome::Granted));
        assert!(events.is_empty());
        assert!(!m.session().is_compass_active);
    }

    #[test]
    fn test_compass_unavailable_reported_once() {
        let mut m = manager_with(ScriptedOrientation::unavailable());
        m.enable_compass();
        m.enable_compass();
        assert!(!m.session().is_compass_active);
        assert_eq!(m.notifier().errors(), 1);
    }

    #[test]
    fn test_disable_compass_restores_gps_fallback() {
        let mut m = manager();
        m.start_gps();
        m.enable_compass();
        m.dispatch(SensorEvent::Orientation(OrientationReading {
            compass_heading: Some(10.0),
            ..Default::default()
        }));

        let a = GeoPoint::new(1.0, 1.0);
        m.dispatch(fix(a, 10.0));
        m.dispatch(fix(a.offset(180.0, 20.0), 10.0));
        // compass active: GPS bearing ignored
        assert_eq!(m.session().last_heading.map(|h| h.degrees), Some(10.0));

        m.disable_compass();
        assert!(m.session().last_heading.is_none());

        // no heading left to compare against
        m.dispatch(fix(a.offset(180.0, 40.0), 10.0));
        let heading = m.session().last_heading.unwrap();
        assert!((heading.degrees - 180.0).abs() < 0.01);
    }

    #[test]
    fn test_unified_start_and_stop() {
        let mut m = manager();
        m.start_tracking();
        let s = m.session();
        assert!(s.is_gps_active && s.is_locked && s.is_compass_active);
        assert_eq!(m.unified_state(), UnifiedState::Tracking);

        m.stop_tracking();
        let s = m.session();
        assert!(!s.is_gps_active && !s.is_locked && !s.is_compass_active);
        assert_eq!(m.unified_state(), UnifiedState::Stopped);
    }

    #[test]
    fn test_fine_grained_disable_reflects_stopped() {
        let mut m = manager();
        m.start_tracking();
        m.set_lock(false);
        assert_eq!(m.unified_state(), UnifiedState::Tracking);
        m.disable_compass();
        assert_eq!(m.unified_state(), UnifiedState::Tracking);
        m.stop_gps();
        assert_eq!(m.unified_state(), UnifiedState::Stopped);
    }

    #[test]
    fn test_transient_location_error_keeps_watch() {
        let mut m = manager();
        m.start_gps();
        let events = m.dispatch(SensorEvent::LocationError(LocationErrorKind::Timeout));
        assert_eq!(
            events,
            vec![TrackingEvent::LocationError {
                error: LocationErrorKind::Timeout
            }]
        );
        assert!(m.session().is_gps_active);
        assert!(m.location().active.is_some());
        assert!(m.notifier().contains(LocationErrorKind::Timeout.user_message()));
    }

    #[test]
    fn test_permission_denied_location_error_stops_gps() {
        let mut m = manager();
        m.set_lock(true);
        let events = m.dispatch(SensorEvent::LocationError(LocationErrorKind::PermissionDenied));
        assert!(events.contains(&TrackingEvent::GpsStopped));
        assert!(!m.session().is_gps_active);
        assert!(!m.session().is_locked);
    }
}
