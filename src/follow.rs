//! Camera-follow state machine.
//!
//! `Unlocked` ⇄ `Locked`. The lock flag itself lives on the
//! [`TrackingSession`]; the controller only decides transitions and which
//! camera command, if any, each event produces. It never touches the map.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::{GestureSource, TrackingConfig};
use crate::filters::PositionFilter;
use crate::geo::{distance_meters, GeoPoint};
use crate::platform::{Bounds, MapSurface};
use crate::session::TrackingSession;
use crate::types::Fix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FollowState {
    Unlocked,
    Locked,
}

/// Snapshot of the map viewport taken before an event is handled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub zoom: u8,
    pub bounds: Bounds,
}

impl ViewState {
    pub fn of(map: &impl MapSurface) -> Self {
        Self {
            zoom: map.zoom(),
            bounds: map.bounds(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraCommand {
    pub center: GeoPoint,
    pub zoom: u8,
    pub animate: bool,
}

/// Last programmatic command, for telling our own view changes from the user's.
#[derive(Debug, Clone, Copy)]
struct IssuedCommand {
    command: CameraCommand,
    tick: u64,
}

pub struct FollowController {
    tracking_zoom: u8,
    gesture_source: GestureSource,
    relock_after_settle: bool,
    view_match_tolerance_m: f64,
    filter: PositionFilter,

    broken_by_gesture: bool,
    last_issued: Option<IssuedCommand>,
    tick: u64,
    lock_breaks: u64,
}

impl FollowController {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            tracking_zoom: config.tracking_zoom,
            gesture_source: config.gesture_source,
            relock_after_settle: config.relock_after_settle,
            view_match_tolerance_m: config.view_match_tolerance_m,
            filter: PositionFilter::new(config),
            broken_by_gesture: false,
            last_issued: None,
            tick: 0,
            lock_breaks: 0,
        }
    }

    pub fn state(&self, session: &TrackingSession) -> FollowState {
        if session.is_locked {
            FollowState::Locked
        } else {
            FollowState::Unlocked
        }
    }

    /// Number of times a user gesture broke the lock.
    pub fn lock_breaks(&self) -> u64 {
        self.lock_breaks
    }

    /// Mark the start of a new event-handler invocation.
    pub fn begin_tick(&mut self) {
        self.tick += 1;
    }

    /// `Unlocked → Locked` on an explicit toggle.
    ///
    /// Refuses to lock without an active GPS watch. Returns the immediate
    /// recenter when the current fix is good enough to follow.
    pub fn engage(&mut self, session: &mut TrackingSession, view: &ViewState) -> Option<CameraCommand> {
        if !session.is_gps_active {
            debug!("[follow] lock requested without GPS, ignoring");
            return None;
        }
        if !session.is_locked {
            info!("[follow] lock engaged");
        }
        session.is_locked = true;
        self.broken_by_gesture = false;

        let target = session
            .last_accepted_fix
            .as_ref()
            .filter(|fix| self.filter.within_follow_threshold(fix))
            .map(|fix| fix.point)?;
        Some(self.recenter(session, target, view))
    }

    /// Explicit toggle off.
    pub fn release(&mut self, session: &mut TrackingSession) {
        if session.is_locked {
            info!("[follow] lock released");
        }
        session.is_locked = false;
        self.broken_by_gesture = false;
    }

    /// Steady-state tick for a fix that passed the position filter.
    pub fn on_fix(&mut self, session: &mut TrackingSession, fix: &Fix, view: &ViewState) -> Option<CameraCommand> {
        if !session.is_locked {
            return None;
        }
        if !self.filter.within_follow_threshold(fix) {
            debug!(
                "[follow] accuracy {:.0} m above follow threshold, camera stays",
                fix.accuracy_m
            );
            return None;
        }
        Some(self.recenter(session, fix.point, view))
    }

    /// User drag started: any manual pan breaks lock immediately.
    ///
    /// Returns true if a lock was broken.
    pub fn on_drag_start(&mut self, session: &mut TrackingSession) -> bool {
        self.break_lock(session, "drag gesture")
    }

    /// Generic view change.
    ///
    /// Only consulted when the surface cannot report gestures on their own.
    /// A change matching the last command is our own while it arrives within
    /// one tick of the command or of its previous echo. Surfaces report one
    /// camera move several times, so each echo keeps the marker alive.
    pub fn on_view_changed(&mut self, session: &mut TrackingSession, center: GeoPoint, zoom: u8) -> bool {
        if self.gesture_source != GestureSource::ViewChangeInference {
            return false;
        }
        if let Some(issued) = self.last_issued {
            let fresh = self.tick.saturating_sub(issued.tick) <= 1;
            let same_place =
                distance_meters(issued.command.center, center) <= self.view_match_tolerance_m;
            if fresh && same_place && issued.command.zoom == zoom {
                debug!("[follow] view change matches own command, lock kept");
                self.last_issued = Some(IssuedCommand {
                    tick: self.tick,
                    ..issued
                });
                return false;
            }
        }
        self.break_lock(session, "view change")
    }

    /// Camera came to rest after a pan; optionally re-engage.
    pub fn on_view_settled(&mut self, session: &mut TrackingSession, view: &ViewState) -> Option<CameraCommand> {
        if !self.relock_after_settle || !self.broken_by_gesture || session.is_locked {
            return None;
        }
        if !session.is_gps_active {
            self.broken_by_gesture = false;
            return None;
        }
        info!("[follow] view settled after pan, re-engaging lock");
        self.engage(session, view)
    }

    fn break_lock(&mut self, session: &mut TrackingSession, cause: &str) -> bool {
        if !session.is_locked {
            return false;
        }
        session.is_locked = false;
        self.broken_by_gesture = true;
        self.last_issued = None;
        self.lock_breaks += 1;
        info!("[follow] lock broken by {}", cause);
        true
    }

    fn recenter(&mut self, session: &mut TrackingSession, target: GeoPoint, view: &ViewState) -> CameraCommand {
        let zoom = view.zoom.max(self.tracking_zoom);
        // first recenter of a session cuts instead of panning across the map
        let animate = session.has_performed_initial_zoom || view.bounds.contains(target);
        session.has_performed_initial_zoom = true;

        let command = CameraCommand {
            center: target,
            zoom,
            animate,
        };
        self.last_issued = Some(IssuedCommand {
            command,
            tick: self.tick,
        });
        command
    }
}
