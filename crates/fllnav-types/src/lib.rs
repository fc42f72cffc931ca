//! Shared data model for the fllnav workspace: poses and kinematics,
//! landmarks, command and status messages, and the workspace error type.

pub mod landmark;
pub mod pose;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use landmark::{Landmark, LandmarkKind, LandmarkMap, LandmarkReading, SensorOffset};
pub use pose::{Point, Pose, Waypoint, angle_difference, normalize_heading};

/// Extent of the rectangular field; the origin is the lower-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldBounds {
    /// Field size along X (mm).
    pub width: f64,
    /// Field size along Y (mm).
    pub height: f64,
}

impl Default for FieldBounds {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 1200.0,
        }
    }
}

impl FieldBounds {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn validate(&self) -> Result<(), NavError> {
        if !(self.width.is_finite() && self.height.is_finite()) || self.width <= 0.0 || self.height <= 0.0 {
            return Err(NavError::Configuration(format!(
                "field dimensions must be positive (got {} x {})",
                self.width, self.height
            )));
        }
        Ok(())
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        (0.0..=self.width).contains(&x) && (0.0..=self.height).contains(&y)
    }

    /// Clamp a position onto the field.
    pub fn clamp(&self, x: f64, y: f64) -> (f64, f64) {
        (x.clamp(0.0, self.width), y.clamp(0.0, self.height))
    }

    /// Distance (mm) from `(x, y)` along `heading` to the field edge.
    /// `None` when the point lies off the field.
    ///
    /// ```rust
    /// use fllnav_types::FieldBounds;
    ///
    /// let field = FieldBounds::new(1200.0, 1000.0);
    /// let ahead = field.wall_distance(200.0, 500.0, 0.0).unwrap();
    /// assert!((ahead - 1000.0).abs() < 1e-9);
    /// let below = field.wall_distance(200.0, 500.0, 270.0).unwrap();
    /// assert!((below - 500.0).abs() < 1e-9);
    /// ```
    pub fn wall_distance(&self, x: f64, y: f64, heading: f64) -> Option<f64> {
        if !self.contains(x, y) {
            return None;
        }
        let (sin, cos) = heading.to_radians().sin_cos();
        let reach = |pos: f64, dir: f64, limit: f64| {
            if dir > 1e-12 {
                (limit - pos) / dir
            } else if dir < -1e-12 {
                -pos / dir
            } else {
                f64::INFINITY
            }
        };
        Some(reach(x, cos, self.width).min(reach(y, sin, self.height)))
    }
}

/// Longest accepted duration (s) of one recorded drive step.
pub const MAX_STEP_DURATION: f64 = 600.0;

/// One recorded timed velocity command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DriveStep {
    /// Forward speed (mm/s).
    pub speed: f64,
    /// Turn rate (deg/s, counter-clockwise positive).
    pub turn_rate: f64,
    /// Duration (s).
    pub duration: f64,
}

impl DriveStep {
    /// Finite speeds and a duration in `0..=MAX_STEP_DURATION`.
    pub fn validate(&self) -> Result<(), NavError> {
        if !(self.speed.is_finite() && self.turn_rate.is_finite()) {
            return Err(NavError::InvalidCommand("drive step speeds must be finite".into()));
        }
        if !(0.0..=MAX_STEP_DURATION).contains(&self.duration) {
            return Err(NavError::InvalidCommand(format!(
                "drive step duration must be within 0..={MAX_STEP_DURATION} s (got {})",
                self.duration
            )));
        }
        Ok(())
    }
}

/// Axis-aligned rectangular obstacle; `(x, y)` is the minimum corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Obstacle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Obstacle {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Reject non-finite geometry and empty rectangles.
    pub fn validate(&self) -> Result<(), NavError> {
        let finite = [self.x, self.y, self.width, self.height].iter().all(|v| v.is_finite());
        if !finite {
            return Err(NavError::Configuration(format!("obstacle has non-finite geometry: {self:?}")));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(NavError::Configuration(format!(
                "obstacle width and height must be positive (got {} x {})",
                self.width, self.height
            )));
        }
        Ok(())
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

/// One sample of the drive base encoders plus the optional absolute heading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionReading {
    /// Cumulative distance driven (mm).
    pub distance: f64,
    /// Cumulative angle turned (degrees, counter-clockwise positive).
    pub angle: f64,
    /// Absolute heading from a heading sensor, when one is attached.
    pub heading: Option<f64>,
}

/// Motion integrated by one odometry update.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OdometryDelta {
    pub distance: f64,
    pub angle: f64,
}

impl OdometryDelta {
    /// Whether the delta is large enough to move the particles.
    pub fn is_significant(&self) -> bool {
        self.distance.abs() > 0.1 || self.angle.abs() > 0.01
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Command / status messages
// ────────────────────────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_expected_landmark() -> LandmarkReading {
    LandmarkReading::Black
}

/// Operator command messages, one JSON object per message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    Navigate {
        x: f64,
        y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        heading: Option<f64>,
        #[serde(rename = "usePathPlanning", default = "default_true")]
        use_path_planning: bool,
    },
    FollowPath {
        commands: Vec<DriveStep>,
        #[serde(rename = "useWaypoints", default = "default_true")]
        use_waypoints: bool,
    },
    Calibrate {
        #[serde(rename = "expectedLandmark", default = "default_expected_landmark")]
        expected_landmark: LandmarkReading,
    },
    ResetPosition {
        x: f64,
        y: f64,
        #[serde(default)]
        heading: f64,
    },
    AddObstacle {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    RemoveObstacle {
        index: usize,
    },
    ClearObstacles,
    Stop,
}

impl Command {
    /// Parse one JSON command message.
    ///
    /// ```rust
    /// use fllnav_types::Command;
    ///
    /// let cmd = Command::from_json(r#"{"action":"navigate","x":600,"y":300,"usePathPlanning":false}"#).unwrap();
    /// assert_eq!(cmd.name(), "navigate");
    /// ```
    pub fn from_json(line: &str) -> Result<Self, NavError> {
        let cmd: Command = serde_json::from_str(line).map_err(|e| NavError::InvalidCommand(e.to_string()))?;
        cmd.validate()?;
        Ok(cmd)
    }

    /// Reject numerically malformed payloads.
    pub fn validate(&self) -> Result<(), NavError> {
        let finite = |vals: &[f64]| vals.iter().all(|v| v.is_finite());
        let ok = match self {
            Command::Navigate { x, y, heading, .. } => finite(&[*x, *y, heading.unwrap_or(0.0)]),
            Command::FollowPath { commands, .. } => {
                return commands.iter().try_for_each(DriveStep::validate);
            }
            Command::ResetPosition { x, y, heading } => finite(&[*x, *y, *heading]),
            Command::AddObstacle { x, y, width, height } => {
                return Obstacle::new(*x, *y, *width, *height).validate();
            }
            Command::Calibrate { .. } | Command::RemoveObstacle { .. } | Command::ClearObstacles | Command::Stop => true,
        };
        if ok {
            Ok(())
        } else {
            Err(NavError::InvalidCommand(format!("{} has a non-finite or negative field", self.name())))
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Navigate { .. } => "navigate",
            Command::FollowPath { .. } => "followPath",
            Command::Calibrate { .. } => "calibrate",
            Command::ResetPosition { .. } => "resetPosition",
            Command::AddObstacle { .. } => "addObstacle",
            Command::RemoveObstacle { .. } => "removeObstacle",
            Command::ClearObstacles => "clearObstacles",
            Command::Stop => "stop",
        }
    }
}

/// Orchestrator mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RunnerMode {
    #[default]
    Idle,
    Navigating,
    Following,
    Calibrating,
    Completed,
    Aborted,
}

/// Status record pushed to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StatusReport {
    pub position: Pose,
    pub confidence: f64,
    #[serde(default)]
    pub mode: RunnerMode,
}

/// Result of a navigation or path-following operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum NavOutcome {
    Completed,
    Aborted,
    Failed { reason: String },
}

impl NavOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        NavOutcome::Failed { reason: reason.into() }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, NavOutcome::Completed)
    }
}

/// Reply to one dispatched [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "reply", rename_all = "camelCase")]
pub enum CommandReply {
    Navigation {
        outcome: NavOutcome,
    },
    Calibrated {
        matched: bool,
    },
    PositionReset {
        position: Pose,
    },
    ObstacleAdded {
        index: usize,
    },
    ObstacleRemoved {
        remaining: usize,
    },
    ObstaclesCleared,
    Stopped,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Workspace error type spanning setup, sensing, planning and hardware faults.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NavError {
    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("Sensor Unavailable: {sensor}")]
    SensorUnavailable { sensor: String },

    #[error("Path Not Found: {0}")]
    PathNotFound(String),

    #[error("Navigation Aborted")]
    NavigationAborted,

    #[error("Hardware Fault on {component}: {details}")]
    Hardware { component: String, details: String },

    #[error("Invalid Command: {0}")]
    InvalidCommand(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigate_defaults_to_path_planning() {
        let cmd = Command::from_json(r#"{"action":"navigate","x":600,"y":300}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Navigate {
                x: 600.0,
                y: 300.0,
                heading: None,
                use_path_planning: true
            }
        );
    }

    #[test]
    fn follow_path_uses_camel_case_fields() {
        let cmd = Command::from_json(
            r#"{"action":"followPath","useWaypoints":false,"commands":[{"speed":200,"turnRate":0,"duration":1.5}]}"#,
        )
        .unwrap();
        match cmd {
            Command::FollowPath { commands, use_waypoints } => {
                assert!(!use_waypoints);
                assert_eq!(commands[0].turn_rate, 0.0);
                assert_eq!(commands[0].duration, 1.5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unit_commands_parse() {
        assert_eq!(Command::from_json(r#"{"action":"stop"}"#).unwrap(), Command::Stop);
        assert_eq!(
            Command::from_json(r#"{"action":"clearObstacles"}"#).unwrap(),
            Command::ClearObstacles
        );
        assert_eq!(
            Command::from_json(r#"{"action":"calibrate","expectedLandmark":"red"}"#).unwrap(),
            Command::Calibrate {
                expected_landmark: LandmarkReading::Red
            }
        );
    }

    #[test]
    fn unknown_action_is_invalid_command() {
        let err = Command::from_json(r#"{"action":"dance"}"#).unwrap_err();
        assert!(matches!(err, NavError::InvalidCommand(_)));
    }

    #[test]
    fn malformed_obstacle_is_configuration_error() {
        let err = Command::from_json(r#"{"action":"addObstacle","x":0,"y":0,"width":0,"height":10}"#).unwrap_err();
        assert!(matches!(err, NavError::Configuration(_)));
    }

    #[test]
    fn negative_duration_rejected() {
        let err = Command::from_json(r#"{"action":"followPath","commands":[{"speed":1,"turnRate":0,"duration":-1}]}"#)
            .unwrap_err();
        assert!(matches!(err, NavError::InvalidCommand(_)));
    }

    #[test]
    fn oversized_duration_rejected() {
        let err = Command::from_json(
            r#"{"action":"followPath","commands":[{"speed":0,"turnRate":0,"duration":1e30}],"useWaypoints":false}"#,
        )
        .unwrap_err();
        assert!(matches!(err, NavError::InvalidCommand(_)));

        let step = DriveStep {
            speed: 100.0,
            turn_rate: 0.0,
            duration: MAX_STEP_DURATION,
        };
        assert!(step.validate().is_ok());
        assert!(DriveStep { duration: f64::NAN, ..step }.validate().is_err());
    }

    #[test]
    fn wall_distance_along_heading() {
        let field = FieldBounds::new(1200.0, 1200.0);
        let d = field.wall_distance(600.0, 600.0, 90.0).unwrap();
        assert!((d - 600.0).abs() < 1e-9);
        let d = field.wall_distance(300.0, 600.0, 180.0).unwrap();
        assert!((d - 300.0).abs() < 1e-9);
        // 45 degrees from the centre hits the corner.
        let d = field.wall_distance(600.0, 600.0, 45.0).unwrap();
        assert!((d - 600.0 * 2f64.sqrt()).abs() < 1e-6);
        assert_eq!(field.wall_distance(-1.0, 600.0, 0.0), None);
    }

    #[test]
    fn status_shape() {
        let status = StatusReport {
            position: Pose::new(1.0, 2.0, 3.0),
            confidence: 0.5,
            mode: RunnerMode::Navigating,
        };
        let v: serde_json::Value = serde_json::to_value(status).unwrap();
        assert_eq!(v["position"]["heading"], 3.0);
        assert_eq!(v["confidence"], 0.5);
        assert_eq!(v["mode"], "navigating");
    }

    #[test]
    fn failed_outcome_reply_shape() {
        let reply = CommandReply::Navigation {
            outcome: NavOutcome::failed("goal blocked"),
        };
        let v: serde_json::Value = serde_json::to_value(&reply).unwrap();
        assert_eq!(v["reply"], "navigation");
        assert_eq!(v["outcome"]["status"], "failed");
        assert_eq!(v["outcome"]["reason"], "goal blocked");
    }

    #[test]
    fn obstacle_contains_is_inclusive() {
        let o = Obstacle::new(10.0, 10.0, 5.0, 5.0);
        assert!(o.contains(15.0, 15.0));
        assert!(!o.contains(15.1, 12.0));
        assert!(Obstacle::new(0.0, 0.0, f64::NAN, 1.0).validate().is_err());
    }

    #[test]
    fn error_display() {
        let err = NavError::SensorUnavailable {
            sensor: "landmark".into(),
        };
        assert_eq!(err.to_string(), "Sensor Unavailable: landmark");
    }
}
