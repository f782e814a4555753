use log::{debug, info, warn};
use serde::Deserialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tokio::time::{interval, Duration};

use crate::geo::{normalize_degrees, GeoPoint};
use crate::types::{Fix, OrientationReading, SensorEvent};

/// Deterministic walker used when no real location source answers.
#[derive(Clone, Debug)]
pub struct SimulatedWalk {
    pub position: GeoPoint,
    pub heading_deg: f64,
    pub speed_mps: f64,
    pub accuracy_m: f64,
    /// Degrees of turn per step.
    pub turn_rate_deg: f64,
    steps: u64,
}

impl SimulatedWalk {
    pub fn new(start: GeoPoint, heading_deg: f64, speed_mps: f64) -> Self {
        Self {
            position: start,
            heading_deg: normalize_degrees(heading_deg),
            speed_mps,
            accuracy_m: 8.0,
            turn_rate_deg: 2.0,
            steps: 0,
        }
    }

    /// Advance by `dt_secs` and return the fix a receiver would report.
    pub fn step(&mut self, dt_secs: f64) -> Fix {
        self.steps += 1;
        self.heading_deg = normalize_degrees(self.heading_deg + self.turn_rate_deg);
        self.position = self.position.offset(self.heading_deg, self.speed_mps * dt_secs);

        // accuracy wanders between roughly 3 and 13 m
        let accuracy = self.accuracy_m + (self.steps as f64 * 0.3).sin() * 5.0;
        Fix::new(self.position, accuracy, current_timestamp()).with_heading(self.heading_deg)
    }
}

impl Default for SimulatedWalk {
    fn default() -> Self {
        // Golden Gate Park, heading east at walking pace
        Self::new(GeoPoint::new(37.7694, -122.4862), 90.0, 1.4)
    }
}

/// One JSON object as printed by `termux-location`.
#[derive(Debug, Deserialize)]
struct TermuxLocation {
    latitude: f64,
    longitude: f64,
    accuracy: f64,
    #[serde(default)]
    bearing: Option<f64>,
}

pub async fn gps_loop(tx: Sender<SensorEvent>, period: Duration) {
    let mut interval = interval(period);
    let mut walk = SimulatedWalk::default();
    let mut fix_count = 0u64;
    let mut use_device = true;

    loop {
        interval.tick().await;

        let device_fix = if use_device { read_gps().await } else { None };
        let fix = match device_fix {
            Some(fix) => fix,
            None => {
                if use_device {
                    info!("[gps] termux-location unavailable, using simulated walk");
                    use_device = false;
                }
                walk.step(period.as_secs_f64())
            }
        };

        match tx.try_send(SensorEvent::Position(fix)) {
            Ok(_) => {
                fix_count += 1;
                if fix_count % 10 == 0 {
                    debug!("[gps] {} fixes", fix_count);
                }
            }
            Err(TrySendError::Closed(_)) => {
                info!("[gps] channel closed after {} fixes", fix_count);
                break;
            }
            Err(TrySendError::Full(_)) => {
                // drop this fix, the next one supersedes it
            }
        }
    }
}

pub async fn orientation_loop(tx: Sender<SensorEvent>, period: Duration) {
    let mut interval = interval(period);
    let mut reading_count = 0u64;

    loop {
        interval.tick().await;

        let reading = mock_orientation(reading_count);
        match tx.try_send(SensorEvent::Orientation(reading)) {
            Ok(_) => {
                reading_count += 1;
                if reading_count % 100 == 0 {
                    debug!("[compass] {} readings", reading_count);
                }
            }
            Err(TrySendError::Closed(_)) => {
                info!("[compass] channel closed after {} readings", reading_count);
                break;
            }
            Err(TrySendError::Full(_)) => {}
        }
    }
}

async fn read_gps() -> Option<Fix> {
    let output = tokio::process::Command::new("termux-location")
        .args(["-p", "gps", "-r", "once"])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_location_output(&String::from_utf8_lossy(&output.stdout))
}

fn parse_location_output(output: &str) -> Option<Fix> {
    let raw: TermuxLocation = match serde_json::from_str(output) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("[gps] unparseable termux-location output: {}", e);
            return None;
        }
    };
    let point = GeoPoint::new(raw.latitude, raw.longitude);
    if !point.is_valid() {
        return None;
    }
    let fix = Fix::new(point, raw.accuracy, current_timestamp());
    Some(match raw.bearing {
        Some(bearing) => fix.with_heading(bearing),
        None => fix,
    })
}

fn mock_orientation(seq: u64) -> OrientationReading {
    // slow sweep with a little jitter so hysteresis has something to reject
    let t = seq as f64 * 0.05;
    OrientationReading {
        compass_heading: Some(normalize_degrees(90.0 + t * 4.0 + (t * 7.0).sin() * 2.0)),
        alpha: None,
        absolute: true,
        timestamp: current_timestamp(),
    }
}

pub fn current_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
