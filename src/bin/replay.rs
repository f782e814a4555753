use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::Parser;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::{json, Value};

use track_follow::config::{GestureSource, TrackingConfig};
use track_follow::geo::GeoPoint;
use track_follow::platform::recording::{
    CollectingNotifier, RecordingMap, ScriptedLocation, ScriptedOrientation,
};
use track_follow::sensor_session::{SensorSessionManager, TrackingEvent};
use track_follow::status::TrackingStatus;
use track_follow::track::{load_track, DirectoryLoader};
use track_follow::SensorEvent;

#[derive(Parser, Debug)]
struct Args {
    /// Path to session_*.json[.gz] log
    #[arg(long, conflicts_with = "session_dir")]
    log: Option<PathBuf>,

    /// Directory of session logs to batch replay
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// Tracking config JSON, overrides the one stored in the log
    #[arg(long)]
    config: Option<PathBuf>,

    /// Track file to frame the map on before replaying
    #[arg(long)]
    track: Option<String>,

    /// Directory track files are loaded from
    #[arg(long, default_value = ".")]
    tracks_dir: PathBuf,

    /// Detect user pans from view changes instead of drag events (A/B testing)
    #[arg(long, default_value_t = false)]
    infer_gestures: bool,

    /// Re-engage lock once the map settles after a pan (A/B testing)
    #[arg(long, default_value_t = false)]
    relock_after_settle: bool,

    /// Print every engine event as it happens
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Deserialize)]
struct LogFile {
    #[serde(default)]
    config: Option<TrackingConfig>,
    events: Vec<SensorEvent>,
}

fn load_log(path: &Path) -> anyhow::Result<LogFile> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        let reader = BufReader::new(gz);
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

fn resolve_config(log: &LogFile, args: &Args) -> anyhow::Result<TrackingConfig> {
    let mut config = match &args.config {
        Some(path) => TrackingConfig::from_json_file(path)?,
        None => log.config.clone().unwrap_or_default(),
    };
    if args.infer_gestures {
        config.gesture_source = GestureSource::ViewChangeInference;
    }
    config.relock_after_settle |= args.relock_after_settle;
    config.validate()?;
    Ok(config)
}

fn run_once(path: &Path, args: &Args) -> anyhow::Result<Value> {
    let log = load_log(path)?;
    let config = resolve_config(&log, args)?;

    let (map, track_name) = match &args.track {
        Some(name) => {
            let mut loader = DirectoryLoader::new(&args.tracks_dir);
            let track = load_track(&mut loader, name)?;
            let b = track.bounds;
            let center = GeoPoint::new((b.south + b.north) / 2.0, (b.west + b.east) / 2.0);
            let half_lat = ((b.north - b.south) / 2.0).max(0.001);
            let half_lon = ((b.east - b.west) / 2.0).max(0.001);
            (RecordingMap::new(center, 12, half_lat, half_lon), Some(track.display_name))
        }
        None => (RecordingMap::default(), None),
    };

    // A log with recorded permission answers came from a prompting platform
    let prompts = log
        .events
        .iter()
        .any(|e| matches!(e, SensorEvent::PermissionResolved(_)));
    let orientation = if prompts {
        ScriptedOrientation::gated(None)
    } else {
        ScriptedOrientation::open()
    };

    let mut manager = SensorSessionManager::new(
        config,
        map,
        CollectingNotifier::default(),
        ScriptedLocation::default(),
        orientation,
    );

    let mut lock_engagements = 0u64;
    let mut markers_hidden = 0u64;
    for event in log.events {
        let produced = manager.dispatch(event);
        for e in &produced {
            match e {
                TrackingEvent::LockEngaged => lock_engagements += 1,
                TrackingEvent::MarkerHidden => markers_hidden += 1,
                _ => {}
            }
            if args.verbose {
                println!("{}", serde_json::to_string(e)?);
            }
        }
    }

    let status = TrackingStatus::capture(&manager, 0);
    let notifications: Vec<Value> = manager
        .notifier()
        .messages
        .iter()
        .map(|(message, severity)| json!({ "severity": severity, "message": message }))
        .collect();

    Ok(json!({
        "log": path.display().to_string(),
        "track": track_name,
        "status": status,
        "lock_engagements": lock_engagements,
        "markers_hidden": markers_hidden,
        "map_commands": manager.map().commands.len(),
        "final_view": manager.map().last_set_view(),
        "notifications": notifications,
    }))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let mut results = Vec::new();

    if let Some(dir) = args.session_dir.as_ref() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !(name.starts_with("session_") && (name.ends_with(".json") || name.ends_with(".json.gz"))) {
                continue;
            }
            match run_once(&path, &args) {
                Ok(res) => results.push(res),
                Err(e) => log::error!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &args)?);
    } else {
        anyhow::bail!("Provide --log or --session-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
