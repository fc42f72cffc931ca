//! Field poses, waypoints and the planar forward kinematics shared by
//! odometry, the particle motion model, the simulator and the recorded-path
//! converter.
//!
//! Units: millimetres for positions, degrees for headings.  Headings grow
//! counter-clockwise from the field +X axis and are kept in `[0, 360)`.
//!
//! # Example
//!
//! ```rust
//! use fllnav_types::pose::Pose;
//!
//! let mut pose = Pose::new(0.0, 0.0, 0.0);
//! pose.advance(100.0, 0.0);
//! assert!((pose.x - 100.0).abs() < 1e-9);
//!
//! // A quarter circle of radius 100 mm ends at (100, 100) facing +Y.
//! let mut pose = Pose::new(0.0, 0.0, 0.0);
//! pose.advance(std::f64::consts::FRAC_PI_2 * 100.0, 90.0);
//! assert!((pose.x - 100.0).abs() < 1e-6);
//! assert!((pose.y - 100.0).abs() < 1e-6);
//! assert!((pose.heading - 90.0).abs() < 1e-9);
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Turns smaller than this (degrees) are integrated as a straight segment.
pub const STRAIGHT_LINE_THRESHOLD_DEG: f64 = 0.01;

// ────────────────────────────────────────────────────────────────────────────
// Angle helpers
// ────────────────────────────────────────────────────────────────────────────

/// Normalize an angle in degrees to `[0, 360)`.
pub fn normalize_heading(deg: f64) -> f64 {
    let h = deg.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360.0.
    if h >= 360.0 { 0.0 } else { h }
}

/// Signed shortest rotation (degrees) that turns `from` onto `to`.
///
/// The result lies in `(-180, 180]`.
pub fn angle_difference(from: f64, to: f64) -> f64 {
    let diff = (to - from).rem_euclid(360.0);
    if diff > 180.0 { diff - 360.0 } else { diff }
}

// ────────────────────────────────────────────────────────────────────────────
// Kinematics
// ────────────────────────────────────────────────────────────────────────────

/// Displacement of a straight move of `distance` along `heading_deg`.
pub fn linear_displacement(heading_deg: f64, distance: f64) -> (f64, f64) {
    let h = heading_deg.to_radians();
    (distance * h.cos(), distance * h.sin())
}

/// Displacement of a differential-drive increment that travelled `distance`
/// while turning by `delta_angle_deg`, ending at `end_heading_deg`.
///
/// The robot is assumed to follow a circular arc of radius
/// `distance / delta_angle` (radians); the returned vector is the arc's
/// chord.  Below [`STRAIGHT_LINE_THRESHOLD_DEG`] the motion is projected
/// along the end heading instead.
pub fn arc_displacement(end_heading_deg: f64, distance: f64, delta_angle_deg: f64) -> (f64, f64) {
    if delta_angle_deg.abs() < STRAIGHT_LINE_THRESHOLD_DEG {
        return linear_displacement(end_heading_deg, distance);
    }
    let radius = distance / delta_angle_deg.to_radians();
    let end = end_heading_deg.to_radians();
    let start = (end_heading_deg - delta_angle_deg).to_radians();
    (
        radius * (end.sin() - start.sin()),
        radius * (start.cos() - end.cos()),
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Pose
// ────────────────────────────────────────────────────────────────────────────

/// Robot pose on the field.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Pose {
    /// Field X position (mm).
    pub x: f64,
    /// Field Y position (mm).
    pub y: f64,
    /// Heading in degrees, `[0, 360)`.
    pub heading: f64,
}

impl Pose {
    /// Create a pose; the heading is normalized.
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self {
            x,
            y,
            heading: normalize_heading(heading),
        }
    }

    /// Euclidean distance (mm) to `(x, y)`.
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        (x - self.x).hypot(y - self.y)
    }

    /// Absolute bearing (degrees, `[0, 360)`) from this pose to `(x, y)`.
    pub fn bearing_to(&self, x: f64, y: f64) -> f64 {
        normalize_heading((y - self.y).atan2(x - self.x).to_degrees())
    }

    /// Signed shortest rotation from the current heading to `target_heading`.
    pub fn heading_error(&self, target_heading: f64) -> f64 {
        angle_difference(self.heading, target_heading)
    }

    /// Integrate one motion increment in place.
    pub fn advance(&mut self, distance: f64, delta_angle_deg: f64) {
        self.heading = normalize_heading(self.heading + delta_angle_deg);
        let (dx, dy) = arc_displacement(self.heading, distance, delta_angle_deg);
        self.x += dx;
        self.y += dy;
    }

    /// Copy of this pose after one motion increment.
    pub fn advanced(mut self, distance: f64, delta_angle_deg: f64) -> Self {
        self.advance(distance, delta_angle_deg);
        self
    }
}

/// A point on the field (mm).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Waypoint
// ────────────────────────────────────────────────────────────────────────────

/// A navigation target.
///
/// `tolerance` / `angle_tolerance` override the navigator defaults for this
/// waypoint only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle_tolerance: Option<f64>,
}

impl Waypoint {
    /// A position-only waypoint.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            heading: None,
            tolerance: None,
            angle_tolerance: None,
        }
    }

    /// Require a final heading at this waypoint.
    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(normalize_heading(heading));
        self
    }

    /// Override the positional (mm) and angular (degrees) tolerances.
    pub fn with_tolerance(mut self, distance: f64, angle: f64) -> Self {
        self.tolerance = Some(distance);
        self.angle_tolerance = Some(angle);
        self
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

impl From<Point> for Waypoint {
    fn from(p: Point) -> Self {
        Waypoint::new(p.x, p.y)
    }
}

impl From<Pose> for Waypoint {
    fn from(p: Pose) -> Self {
        Waypoint::new(p.x, p.y).with_heading(p.heading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_wraps_both_directions() {
        assert!((normalize_heading(370.0) - 10.0).abs() < 1e-9);
        assert!((normalize_heading(-90.0) - 270.0).abs() < 1e-9);
        assert_eq!(normalize_heading(360.0), 0.0);
        assert_eq!(normalize_heading(-1e-17), 0.0);
    }

    #[test]
    fn angle_difference_takes_shortest_way() {
        assert!((angle_difference(350.0, 10.0) - 20.0).abs() < 1e-9);
        assert!((angle_difference(10.0, 350.0) + 20.0).abs() < 1e-9);
        assert!((angle_difference(0.0, 180.0) - 180.0).abs() < 1e-9);
        assert!(angle_difference(90.0, 90.0).abs() < 1e-9);
    }

    #[test]
    fn zero_turn_arc_equals_straight_projection() {
        for heading in [0.0, 33.0, 90.0, 181.5, 359.0] {
            for distance in [-50.0, 0.0, 12.5, 400.0] {
                let arc = arc_displacement(heading, distance, 0.0);
                let line = linear_displacement(heading, distance);
                assert_eq!(arc, line);
            }
        }
    }

    #[test]
    fn arc_converges_to_line_for_tiny_turns() {
        // Just above the straight-line threshold the chord is still almost
        // the straight projection.
        let arc = arc_displacement(45.0, 100.0, 0.011);
        let line = linear_displacement(45.0, 100.0);
        assert!((arc.0 - line.0).abs() < 0.05);
        assert!((arc.1 - line.1).abs() < 0.05);
    }

    #[test]
    fn half_circle_ends_opposite() {
        // Half circle of radius 50 mm starting at the origin facing +X.
        let pose = Pose::new(0.0, 0.0, 0.0).advanced(std::f64::consts::PI * 50.0, 180.0);
        assert!(pose.x.abs() < 1e-6);
        assert!((pose.y - 100.0).abs() < 1e-6);
        assert!((pose.heading - 180.0).abs() < 1e-9);
    }

    #[test]
    fn turn_in_place_keeps_position() {
        let pose = Pose::new(10.0, 20.0, 0.0).advanced(0.0, -90.0);
        assert!((pose.x - 10.0).abs() < 1e-9);
        assert!((pose.y - 20.0).abs() < 1e-9);
        assert!((pose.heading - 270.0).abs() < 1e-9);
    }

    #[test]
    fn bearing_and_distance() {
        let pose = Pose::new(100.0, 100.0, 0.0);
        assert!((pose.distance_to(400.0, 500.0) - 500.0).abs() < 1e-9);
        assert!((pose.bearing_to(100.0, 0.0) - 270.0).abs() < 1e-9);
        assert!((pose.bearing_to(200.0, 200.0) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn waypoint_json_omits_unset_fields() {
        let wp = Waypoint::new(1.0, 2.0);
        let json = serde_json::to_string(&wp).unwrap();
        assert_eq!(json, r#"{"x":1.0,"y":2.0}"#);

        let back: Waypoint = serde_json::from_str(r#"{"x":1,"y":2,"heading":90,"angleTolerance":3}"#).unwrap();
        assert_eq!(back.heading, Some(90.0));
        assert_eq!(back.angle_tolerance, Some(3.0));
        assert_eq!(back.tolerance, None);
    }
}
