// runtime.rs - async driver for a SensorSessionManager
//
// Platform callbacks are producers on one mpsc channel; this loop is the only
// consumer, so every event is applied to completion before the next starts.
// Permission prompts are awaited on a spawned task that feeds the answer back
// through the same channel. That task is aborted as soon as the manager stops
// waiting for it.

use futures::future::{AbortHandle, Abortable};
use log::{debug, info};
use std::ops::ControlFlow;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::platform::{LocationPlatform, MapSurface, Notifier, OrientationPlatform, PermissionRequest};
use crate::sensor_session::{SensorSessionManager, TrackingEvent};
use crate::types::SensorEvent;

/// Runs until `hook` breaks or every producer has hung up. Returns the
/// number of events dispatched.
pub async fn run_event_loop<M, N, L, O, F>(
    manager: &mut SensorSessionManager<M, N, L, O>,
    mut rx: Receiver<SensorEvent>,
    tx: Sender<SensorEvent>,
    mut hook: F,
) -> u64
where
    M: MapSurface,
    N: Notifier,
    L: LocationPlatform,
    O: OrientationPlatform,
    F: FnMut(&mut SensorSessionManager<M, N, L, O>, &[TrackingEvent]) -> ControlFlow<()>,
{
    // Only the forwarding task needs a sender; holding a strong one here
    // would keep the channel open forever.
    let forward_tx = tx.downgrade();
    drop(tx);

    let mut forwarding: Option<AbortHandle> = None;
    let mut dispatched = 0u64;

    while let Some(event) = rx.recv().await {
        let events = manager.dispatch(event);
        dispatched += 1;

        let flow = hook(manager, &events);

        if let Some(request) = manager.take_permission_request() {
            if let Some(previous) = forwarding.take() {
                previous.abort();
            }
            forwarding = Some(spawn_permission_forwarder(request, forward_tx.clone()));
        }
        if !manager.is_permission_pending() {
            if let Some(handle) = forwarding.take() {
                debug!("[runtime] permission forwarder cancelled");
                handle.abort();
            }
        }

        if flow.is_break() {
            break;
        }
    }

    if let Some(handle) = forwarding.take() {
        handle.abort();
    }
    info!("[runtime] event loop finished after {} events", dispatched);
    dispatched
}

fn spawn_permission_forwarder(
    request: PermissionRequest,
    tx: tokio::sync::mpsc::WeakSender<SensorEvent>,
) -> AbortHandle {
    let (handle, registration) = AbortHandle::new_pair();
    let forward = async move {
        let outcome = request.await;
        if let Some(tx) = tx.upgrade() {
            // receiver gone means the loop already ended
            let _ = tx.send(SensorEvent::PermissionResolved(outcome)).await;
        }
    };
    tokio::spawn(Abortable::new(forward, registration));
    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackingConfig;
    use crate::platform::recording::{
        CollectingNotifier, RecordingMap, ScriptedLocation, ScriptedOrientation,
    };
    use crate::platform::PermissionOutcome;
    use tokio::sync::mpsc;
    use tokio::time::{timeout, Duration};

    type TestManager =
        SensorSessionManager<RecordingMap, CollectingNotifier, ScriptedLocation, ScriptedOrientation>;

    fn gated_manager() -> TestManager {
        SensorSessionManager::new(
            TrackingConfig::default(),
            RecordingMap::default(),
            CollectingNotifier::default(),
            ScriptedLocation::default(),
            ScriptedOrientation::gated(None),
        )
    }

    fn answer(manager: &mut TestManager, outcome: PermissionOutcome) {
        if let Some(sender) = manager.orientation_mut().pending.pop() {
            let _ = sender.send(outcome);
        }
    }

    #[tokio::test]
    async fn test_permission_answer_is_fed_back() {
        let mut manager = gated_manager();
        let (tx, rx) = mpsc::channel(16);
        tx.send(SensorEvent::StartTracking).await.unwrap();

        let run = run_event_loop(&mut manager, rx, tx.clone(), |m, events| {
            if events.contains(&TrackingEvent::PermissionRequested) {
                answer(m, PermissionOutcome::Granted);
            }
            if events.contains(&TrackingEvent::CompassEnabled) {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        let dispatched = timeout(Duration::from_secs(2), run).await.unwrap();

        assert_eq!(dispatched, 2);
        let s = manager.session();
        assert!(s.is_gps_active && s.is_locked && s.is_compass_active);
    }

    #[tokio::test]
    async fn test_cancelled_permission_never_activates_compass() {
        let mut manager = gated_manager();
        let (tx, rx) = mpsc::channel(16);
        tx.send(SensorEvent::SetCompass(true)).await.unwrap();
        tx.send(SensorEvent::SetCompass(false)).await.unwrap();
        tx.send(SensorEvent::SetGps(true)).await.unwrap();

        let run = run_event_loop(&mut manager, rx, tx.clone(), |m, events| {
            if events.iter().any(|e| matches!(e, TrackingEvent::GpsStarted { .. })) {
                answer(m, PermissionOutcome::Granted);
            }
            ControlFlow::Continue(())
        });
        // tx stays alive, so the loop only ends on timeout
        let _ = timeout(Duration::from_millis(100), run).await;

        assert!(!manager.session().is_compass_active);
        assert!(!manager.is_permission_pending());
        assert!(manager.session().is_gps_active);
        drop(tx);
    }

    #[tokio::test]
    async fn test_loop_ends_when_producers_hang_up() {
        let mut manager = gated_manager();
        let (tx, rx) = mpsc::channel(4);
        let producer = tx.clone();
        producer.send(SensorEvent::SetGps(true)).await.unwrap();
        drop(producer);

        let dispatched = timeout(
            Duration::from_secs(1),
            run_event_loop(&mut manager, rx, tx, |_, _| ControlFlow::Continue(())),
        )
        .await
        .unwrap();
        assert_eq!(dispatched, 1);
    }
}
