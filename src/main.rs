use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::Duration;

use track_follow::config::{GestureSource, TrackingConfig};
use track_follow::geo::GeoPoint;
use track_follow::platform::recording::{
    CollectingNotifier, RecordingMap, ScriptedLocation, ScriptedOrientation,
};
use track_follow::runtime::run_event_loop;
use track_follow::sensor_session::{SensorSessionManager, TrackingEvent};
use track_follow::sensors;
use track_follow::status::TrackingStatus;
use track_follow::SensorEvent;

#[derive(Parser, Debug)]
#[command(name = "track_follow")]
#[command(about = "Live follow session against a simulated map surface", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "30")]
    duration: u64,

    /// Tracking config JSON (defaults are used for missing fields)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the minimum zoom used while following
    #[arg(long)]
    tracking_zoom: Option<u8>,

    /// Re-engage lock once the map settles after a pan
    #[arg(long, default_value_t = false)]
    relock_after_settle: bool,

    /// Detect user pans from view changes instead of drag events
    #[arg(long, default_value_t = false)]
    infer_gestures: bool,

    /// Leave the compass off
    #[arg(long, default_value_t = false)]
    no_compass: bool,

    /// Milliseconds between GPS fixes
    #[arg(long, default_value = "1000")]
    gps_period_ms: u64,

    /// Milliseconds between orientation readings
    #[arg(long, default_value = "50")]
    orientation_period_ms: u64,

    /// Gzip the recorded session log
    #[arg(long, default_value_t = false)]
    compress: bool,

    /// Output directory
    #[arg(long, default_value = "track_follow_sessions")]
    output_dir: PathBuf,
}

type DemoManager =
    SensorSessionManager<RecordingMap, CollectingNotifier, ScriptedLocation, ScriptedOrientation>;

/// Recorded input of one session, readable by the `replay` binary.
#[derive(Serialize, Deserialize)]
struct SessionLog {
    session_id: String,
    config: TrackingConfig,
    events: Vec<SensorEvent>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = load_config(&args)?;
    info!(
        "[{}] track_follow starting: {} s, zoom {}, gestures {:?}",
        ts_now(),
        args.duration,
        config.tracking_zoom,
        config.gesture_source
    );
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    let orientation = if args.no_compass {
        ScriptedOrientation::unavailable()
    } else {
        ScriptedOrientation::open()
    };
    let mut manager: DemoManager = SensorSessionManager::new(
        config.clone(),
        RecordingMap::new(GeoPoint::new(37.77, -122.45), 12, 0.02, 0.02),
        CollectingNotifier::default(),
        ScriptedLocation::default(),
        orientation,
    );

    // Sensors feed a recorder, the recorder feeds the engine
    let (sensor_tx, sensor_rx) = mpsc::channel::<SensorEvent>(256);
    let (engine_tx, engine_rx) = mpsc::channel::<SensorEvent>(256);

    sensor_tx.send(SensorEvent::StartTracking).await?;
    let recorder = tokio::spawn(record_events(sensor_rx, engine_tx.clone()));
    let _gps_handle = tokio::spawn(sensors::gps_loop(
        sensor_tx.clone(),
        Duration::from_millis(args.gps_period_ms),
    ));
    let _orientation_handle = tokio::spawn(sensors::orientation_loop(
        sensor_tx.clone(),
        Duration::from_millis(args.orientation_period_ms),
    ));
    drop(sensor_tx);

    let start = Utc::now();
    let mut last_status = start;
    let status_path = args.output_dir.join("live_status.json");

    let hook = |m: &mut DemoManager, _: &[TrackingEvent]| {
        let now = Utc::now();
        if now.signed_duration_since(last_status).num_seconds() >= 2 {
            let uptime = now.signed_duration_since(start).num_seconds().max(0) as u64;
            if let Err(e) = TrackingStatus::capture(m, uptime).save(&status_path) {
                warn!("[status] save failed: {}", e);
            }
            last_status = now;
        }
        ControlFlow::Continue(())
    };

    let deadline = async {
        if args.duration > 0 {
            tokio::time::sleep(Duration::from_secs(args.duration)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        dispatched = run_event_loop(&mut manager, engine_rx, engine_tx, hook) => {
            info!("[{}] all producers stopped after {} events", ts_now(), dispatched);
        }
        _ = deadline => {
            info!("[{}] duration reached, stopping", ts_now());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("[{}] interrupted, stopping", ts_now());
        }
    }

    let events = tokio::time::timeout(Duration::from_secs(2), recorder)
        .await
        .context("recorder did not stop")??;

    manager.stop_tracking();
    let uptime = Utc::now().signed_duration_since(start).num_seconds().max(0) as u64;
    let final_status = TrackingStatus::capture(&manager, uptime);
    final_status.save(args.output_dir.join("live_status_final.json"))?;

    let log = SessionLog {
        session_id: manager.session().session_id.clone(),
        config,
        events,
    };
    let log_path = save_session_log(&log, &args.output_dir, args.compress)?;

    for (message, severity) in &manager.notifier().messages {
        info!("[notify] {:?}: {}", severity, message);
    }
    info!(
        "[{}] {} fixes ({} accepted), {} camera commands, {} lock breaks; log {}",
        ts_now(),
        final_status.fixes_received,
        final_status.fixes_accepted,
        final_status.camera_commands,
        final_status.lock_breaks,
        log_path.display()
    );
    Ok(())
}

fn load_config(args: &Args) -> Result<TrackingConfig> {
    let mut config = match &args.config {
        Some(path) => TrackingConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrackingConfig::default(),
    };
    if let Some(zoom) = args.tracking_zoom {
        config.tracking_zoom = zoom;
    }
    config.relock_after_settle |= args.relock_after_settle;
    if args.infer_gestures {
        config.gesture_source = GestureSource::ViewChangeInference;
    }
    config.validate()?;
    Ok(config)
}

/// Forward sensor events to the engine, keeping a copy of each.
///
/// Stops once the engine side of the channel is gone.
async fn record_events(mut rx: Receiver<SensorEvent>, engine: Sender<SensorEvent>) -> Vec<SensorEvent> {
    let mut recorded = Vec::new();
    loop {
        tokio::select! {
            _ = engine.closed() => break,
            next = rx.recv() => {
                let Some(event) = next else { break };
                recorded.push(event.clone());
                if engine.send(event).await.is_err() {
                    break;
                }
            }
        }
    }
    info!("[recorder] {} events recorded", recorded.len());
    recorded
}

fn save_session_log(log: &SessionLog, dir: &Path, compress: bool) -> Result<PathBuf> {
    let json = serde_json::to_vec_pretty(log)?;
    let stem = format!("session_{}", ts_now_clean());
    let path = if compress {
        let path = dir.join(format!("{}.json.gz", stem));
        let mut encoder = GzEncoder::new(File::create(&path)?, Compression::default());
        encoder.write_all(&json)?;
        encoder.finish()?;
        path
    } else {
        let path = dir.join(format!("{}.json", stem));
        std::fs::write(&path, json)?;
        path
    };
    Ok(path)
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
