//! Landmark readings and the static landmark map used by the localizer's
//! sensor model and by the simulated landmark sensor.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::pose::Pose;

/// Spacing (mm) of the boundary line markers in [`LandmarkMap::standard`].
pub const BOUNDARY_MARKER_SPACING: f64 = 300.0;

/// Discrete classification reported by the downward-facing landmark sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LandmarkReading {
    /// The sensor produced no usable classification.
    None,
    /// Plain field surface.
    White,
    /// Boundary line.
    Black,
    Blue,
    Red,
    Green,
    Yellow,
}

impl LandmarkReading {
    pub fn is_colour(self) -> bool {
        matches!(self, Self::Blue | Self::Red | Self::Green | Self::Yellow)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::White => "white",
            Self::Black => "black",
            Self::Blue => "blue",
            Self::Red => "red",
            Self::Green => "green",
            Self::Yellow => "yellow",
        }
    }
}

impl std::fmt::Display for LandmarkReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point feature kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LandmarkKind {
    /// Boundary line marker; only a `black` reading can match it.
    Line,
    /// Coloured zone; a candidate for every reading.
    Zone,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub kind: LandmarkKind,
    /// What the sensor reads when it is over this landmark.
    pub reading: LandmarkReading,
}

impl Landmark {
    pub fn line(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            kind: LandmarkKind::Line,
            reading: LandmarkReading::Black,
        }
    }

    pub fn zone(x: f64, y: f64, reading: LandmarkReading) -> Self {
        Self {
            x,
            y,
            kind: LandmarkKind::Zone,
            reading,
        }
    }
}

/// Robot-frame mounting offset of the landmark sensor (mm; +x forward,
/// +y left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SensorOffset {
    pub x: f64,
    pub y: f64,
}

impl Default for SensorOffset {
    fn default() -> Self {
        Self { x: 0.0, y: 50.0 }
    }
}

impl SensorOffset {
    /// Field position of the sensor for a robot at `pose`.
    pub fn sensor_point(&self, pose: &Pose) -> (f64, f64) {
        let (sin, cos) = pose.heading.to_radians().sin_cos();
        (
            pose.x + self.x * cos - self.y * sin,
            pose.y + self.x * sin + self.y * cos,
        )
    }
}

/// The set of landmarks known on the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LandmarkMap {
    landmarks: Vec<Landmark>,
}

impl LandmarkMap {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    /// Boundary line markers every 300 mm along the field edge plus four
    /// coloured zones at the quarter points (blue, red, green, yellow).
    ///
    /// ```rust
    /// use fllnav_types::landmark::{LandmarkMap, LandmarkReading};
    ///
    /// let map = LandmarkMap::standard(1200.0, 1200.0);
    /// let (nearest, d) = map.nearest_candidate(905.0, 300.0, LandmarkReading::Red).unwrap();
    /// assert_eq!(nearest.reading, LandmarkReading::Red);
    /// assert!(d < 10.0);
    /// ```
    pub fn standard(width: f64, height: f64) -> Self {
        let mut landmarks = Vec::new();

        let mut x = 0.0;
        while x <= width {
            landmarks.push(Landmark::line(x, 0.0));
            landmarks.push(Landmark::line(x, height));
            x += BOUNDARY_MARKER_SPACING;
        }
        let mut y = BOUNDARY_MARKER_SPACING;
        while y < height {
            landmarks.push(Landmark::line(0.0, y));
            landmarks.push(Landmark::line(width, y));
            y += BOUNDARY_MARKER_SPACING;
        }

        landmarks.push(Landmark::zone(width * 0.25, height * 0.25, LandmarkReading::Blue));
        landmarks.push(Landmark::zone(width * 0.75, height * 0.25, LandmarkReading::Red));
        landmarks.push(Landmark::zone(width * 0.25, height * 0.75, LandmarkReading::Green));
        landmarks.push(Landmark::zone(width * 0.75, height * 0.75, LandmarkReading::Yellow));

        Self { landmarks }
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// Nearest landmark that could explain `reading`, with its distance.
    ///
    /// Zones are always candidates; line markers only for a `black` reading.
    pub fn nearest_candidate(&self, x: f64, y: f64, reading: LandmarkReading) -> Option<(&Landmark, f64)> {
        self.landmarks
            .iter()
            .filter(|l| l.kind == LandmarkKind::Zone || reading == LandmarkReading::Black)
            .map(|l| (l, (l.x - x).hypot(l.y - y)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// What an ideal sensor at `(x, y)` reads: the expected reading of the
    /// nearest landmark within `radius`, else `white`.
    pub fn reading_at(&self, x: f64, y: f64, radius: f64) -> LandmarkReading {
        self.landmarks
            .iter()
            .map(|l| (l, (l.x - x).hypot(l.y - y)))
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(l, _)| l.reading)
            .unwrap_or(LandmarkReading::White)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_map_layout() {
        let map = LandmarkMap::standard(1200.0, 1200.0);
        let lines = map.landmarks().iter().filter(|l| l.kind == LandmarkKind::Line).count();
        // 5 markers on each horizontal edge, 3 on each vertical edge.
        assert_eq!(lines, 16);
        let zones: Vec<_> = map.landmarks().iter().filter(|l| l.kind == LandmarkKind::Zone).collect();
        assert_eq!(zones.len(), 4);
        assert!(zones.iter().any(|z| z.x == 300.0 && z.y == 900.0 && z.reading == LandmarkReading::Green));
    }

    #[test]
    fn lines_only_match_black() {
        let map = LandmarkMap::standard(1200.0, 1200.0);
        let (l, d) = map.nearest_candidate(600.0, 5.0, LandmarkReading::Black).unwrap();
        assert_eq!(l.kind, LandmarkKind::Line);
        assert!(d < 10.0);

        let (l, _) = map.nearest_candidate(600.0, 5.0, LandmarkReading::White).unwrap();
        assert_eq!(l.kind, LandmarkKind::Zone);
    }

    #[test]
    fn reading_at_defaults_to_white() {
        let map = LandmarkMap::standard(1200.0, 1200.0);
        assert_eq!(map.reading_at(600.0, 600.0, 50.0), LandmarkReading::White);
        assert_eq!(map.reading_at(310.0, 290.0, 50.0), LandmarkReading::Blue);
        assert_eq!(map.reading_at(1195.0, 600.0, 50.0), LandmarkReading::Black);
    }

    #[test]
    fn sensor_offset_rotates_with_heading() {
        let offset = SensorOffset { x: 0.0, y: 50.0 };
        let (x, y) = offset.sensor_point(&Pose::new(100.0, 100.0, 90.0));
        assert!((x - 50.0).abs() < 1e-9);
        assert!((y - 100.0).abs() < 1e-9);
    }

    #[test]
    fn reading_serializes_lowercase() {
        let json = serde_json::to_string(&LandmarkReading::Yellow).unwrap();
        assert_eq!(json, "\"yellow\"");
    }
}
