//! Track selection boundary.
//!
//! Track files are addressed by bare name only. Names are validated before
//! any loader sees them, so a loader never has to reason about paths.

use gpx::errors::GpxError;
use gpx::Gpx;
use log::{debug, info};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use crate::error::{TrackResult, TrackerError};
use crate::geo::GeoPoint;
use crate::platform::Bounds;

const TRACK_SUFFIX: &str = ".gpx";
const MAX_NAME_LEN: usize = 255;

/// Check that `name` is a bare `.gpx` filename made of ASCII letters,
/// digits, `-` and `_`.
pub fn validate_track_filename(name: &str) -> TrackResult<&str> {
    let invalid = |why: &str| TrackerError::InvalidTrackName(format!("{:?}: {}", name, why));

    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name too long"));
    }
    let stem = name
        .strip_suffix(TRACK_SUFFIX)
        .ok_or_else(|| invalid("must end in .gpx"))?;
    if stem.is_empty() {
        return Err(invalid("empty name"));
    }
    if let Some(bad) = stem
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(invalid(&format!("character {:?} not allowed", bad)));
    }
    Ok(name)
}

/// Human-readable title for a validated filename.
pub fn display_name(filename: &str) -> String {
    filename
        .strip_suffix(TRACK_SUFFIX)
        .unwrap_or(filename)
        .replace(['-', '_'], " ")
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoadedTrack {
    pub filename: String,
    pub display_name: String,
    pub bounds: Bounds,
}

/// Resolves a validated filename to a displayable track.
pub trait TrackLoader {
    fn load(&mut self, filename: &str) -> TrackResult<LoadedTrack>;
}

/// Validate `name`, then hand it to `loader`.
pub fn load_track(loader: &mut impl TrackLoader, name: &str) -> TrackResult<LoadedTrack> {
    let filename = validate_track_filename(name)?;
    let track = loader.load(filename)?;
    info!("[track] loaded {:?} ({})", track.display_name, track.filename);
    Ok(track)
}

/// Loads `.gpx` files from one directory. The bounding region covers every
/// point of every track segment and route, plus standalone waypoints.
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TrackLoader for DirectoryLoader {
    fn load(&mut self, filename: &str) -> TrackResult<LoadedTrack> {
        let path = self.root.join(filename);
        let file = File::open(&path)
            .map_err(|e| TrackerError::TrackLoad(format!("{}: {}", path.display(), e)))?;
        let gpx = gpx::read(BufReader::new(file))
            .map_err(|e: GpxError| TrackerError::TrackLoad(format!("{}: {}", filename, e)))?;

        let points = gpx_points(&gpx);
        debug!("[track] {} points in {}", points.len(), filename);
        let bounds = bounds_of(&points)
            .ok_or_else(|| TrackerError::TrackLoad(format!("{}: no track points", filename)))?;

        Ok(LoadedTrack {
            filename: filename.to_string(),
            display_name: display_name(filename),
            bounds,
        })
    }
}

fn gpx_points(gpx: &Gpx) -> Vec<GeoPoint> {
    let segments = gpx.tracks.iter().flat_map(|t| t.segments.iter()).flat_map(|s| s.points.iter());
    let routes = gpx.routes.iter().flat_map(|r| r.points.iter());
    segments
        .chain(routes)
        .chain(gpx.waypoints.iter())
        .map(|wpt| {
            let p = wpt.point();
            GeoPoint::new(p.y(), p.x())
        })
        .filter(|p| p.is_valid())
        .collect()
}

fn bounds_of(points: &[GeoPoint]) -> Option<Bounds> {
    let first = points.first()?;
    let init = Bounds::new(first.latitude, first.longitude, first.latitude, first.longitude);
    Some(points.iter().fold(init, |b, p| {
        Bounds::new(
            b.south.min(p.latitude),
            b.west.min(p.longitude),
            b.north.max(p.latitude),
            b.east.max(p.longitude),
        )
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    struct MemoryLoader(HashMap<String, Bounds>);

    impl TrackLoader for MemoryLoader {
        fn load(&mut self, filename: &str) -> TrackResult<LoadedTrack> {
            let bounds = *self
                .0
                .get(filename)
                .ok_or_else(|| TrackerError::TrackLoad(filename.to_string()))?;
            Ok(LoadedTrack {
                filename: filename.to_string(),
                display_name: display_name(filename),
                bounds,
            })
        }
    }

    #[test]
    fn test_valid_names() {
        for name in ["morning-ride.gpx", "Loop_2024.gpx", "a.gpx"] {
            assert_eq!(validate_track_filename(name), Ok(name));
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in [
            "",
            ".gpx",
            "ride",
            "ride.GPX",
            "ride.kml",
            "../etc/passwd.gpx",
            "dir/ride.gpx",
            "dir\\ride.gpx",
            "ride..gpx",
            "my ride.gpx",
            "ride.gpx.gpx",
        ] {
            assert!(
                matches!(validate_track_filename(name), Err(TrackerError::InvalidTrackName(_))),
                "{:?} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("morning-ride_2.gpx"), "morning ride 2");
    }

    #[test]
    fn test_loader_not_called_for_invalid_name() {
        let mut loader = MemoryLoader(HashMap::new());
        let err = load_track(&mut loader, "../secret.gpx").unwrap_err();
        assert!(matches!(err, TrackerError::InvalidTrackName(_)));
    }

    #[test]
    fn test_memory_loader() {
        let bounds = Bounds::new(1.0, 2.0, 3.0, 4.0);
        let mut loader = MemoryLoader(HashMap::from([("loop.gpx".to_string(), bounds)]));
        let track = load_track(&mut loader, "loop.gpx").unwrap();
        assert_eq!(track.bounds, bounds);
        assert!(matches!(
            load_track(&mut loader, "other.gpx"),
            Err(TrackerError::TrackLoad(_))
        ));
    }

    #[test]
    fn test_directory_loader_bounds() {
        let dir = tempdir().unwrap();
        let gpx = r#"<?xml version="1.0"?>
<gpx version="1.1" creator="test"><trk><trkseg>
  <trkpt lat="47.10" lon="8.50"><ele>400</ele></trkpt>
  <trkpt lat="47.30" lon="8.20"></trkpt>
  <trkpt lat="47.20" lon="8.90"></trkpt>
</trkseg></trk></gpx>"#;
        std::fs::write(dir.path().join("alps.gpx"), gpx).unwrap();

        let mut loader = DirectoryLoader::new(dir.path());
        let track = load_track(&mut loader, "alps.gpx").unwrap();
        assert_eq!(track.display_name, "alps");
        assert_eq!(track.bounds, Bounds::new(47.10, 8.20, 47.30, 8.90));

        assert!(matches!(
            load_track(&mut loader, "missing.gpx"),
            Err(TrackerError::TrackLoad(_))
        ));
    }

    #[test]
    fn test_directory_loader_single_quoted_points() {
        let dir = tempdir().unwrap();
        let gpx = r#"<?xml version="1.0"?>
<gpx version="1.1" creator="test"><trk><trkseg>
  <trkpt lat="47.1" lon="8.5"><ele>400</ele></trkpt>
  <trkpt lat='47.3' lon='8.2'/>
</trkseg></trk></gpx>"#;
        std::fs::write(dir.path().join("quotes.gpx"), gpx).unwrap();

        let mut loader = DirectoryLoader::new(dir.path());
        let track = load_track(&mut loader, "quotes.gpx").unwrap();
        assert_eq!(track.bounds, Bounds::new(47.1, 8.2, 47.3, 8.5));
    }

    #[test]
    fn test_directory_loader_rejects_malformed_gpx() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("broken.gpx"), "<gpx version=\"1.1\"><trk>").unwrap();
        std::fs::write(
            dir.path().join("empty.gpx"),
            r#"<?xml version="1.0"?><gpx version="1.1" creator="test"></gpx>"#,
        )
        .unwrap();

        let mut loader = DirectoryLoader::new(dir.path());
        assert!(matches!(
            load_track(&mut loader, "broken.gpx"),
            Err(TrackerError::TrackLoad(_))
        ));
        assert!(matches!(
            load_track(&mut loader, "empty.gpx"),
            Err(TrackerError::TrackLoad(_))
        ));
    }
}
