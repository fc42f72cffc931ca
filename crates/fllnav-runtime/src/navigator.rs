//! Waypoint following.
//!
//! Two drive styles are offered:
//!
//! - **Blocking** ([`Navigator::go_to_waypoint`]): turn toward the target,
//!   drive straight to it, then optionally turn to the requested heading,
//!   using the drive base's blocking `turn` / `straight` primitives.
//! - **Closed loop** ([`Navigator::step`]): a single-tick controller that
//!   maps the current pose and the active waypoint to a velocity command.
//!   The orchestrator calls it once per loop iteration.
//!
//! Recorded drive sessions are turned into waypoints by
//! [`Navigator::convert_path_to_waypoints`].

use std::time::Duration;

use fllnav_hal::RobotHardware;
use fllnav_perception::odometry::Odometry;
use fllnav_types::{DriveStep, MAX_STEP_DURATION, NavError, Pose, Waypoint, angle_difference};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Simulation step used when converting recorded drive steps.
pub const CONVERSION_STEP: Duration = Duration::from_millis(50);

/// Direction change (degrees) above which an intermediate waypoint is kept
/// regardless of spacing.
pub const DIRECTION_CHANGE_KEEP: f64 = 10.0;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct NavigatorConfig {
    /// Default positional tolerance (mm).
    pub position_tolerance: f64,
    /// Default angular tolerance (degrees).
    pub angle_tolerance: f64,
    /// Positional tolerance for pass-through waypoints of a planned path.
    pub intermediate_tolerance: f64,
    /// Cruise speed (mm/s).
    pub drive_speed: f64,
    /// Speed floor while approaching a target (mm/s).
    pub min_speed: f64,
    /// Approach speed per mm of remaining distance (1/s).
    pub speed_gain: f64,
    /// Largest turn rate (deg/s).
    pub turn_speed: f64,
    /// Smallest non-zero turn rate (deg/s).
    pub min_turn_rate: f64,
    /// Turn rate per degree of heading error (1/s).
    pub heading_gain: f64,
    /// Heading error (degrees) above which the robot stops and turns in place.
    pub realign_angle: f64,
    /// Waypoint spacing (ms) when converting recorded paths.
    pub sample_interval_ms: u64,
    /// Spacing (mm) below which recorded waypoints are merged.
    pub min_waypoint_distance: f64,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            position_tolerance: 10.0,
            angle_tolerance: 2.0,
            intermediate_tolerance: 30.0,
            drive_speed: 200.0,
            min_speed: 30.0,
            speed_gain: 2.0,
            turn_speed: 100.0,
            min_turn_rate: 10.0,
            heading_gain: 3.0,
            realign_angle: 30.0,
            sample_interval_ms: 500,
            min_waypoint_distance: 50.0,
        }
    }
}

impl NavigatorConfig {
    pub fn validate(&self) -> Result<(), NavError> {
        let positive = [
            ("position_tolerance", self.position_tolerance),
            ("angle_tolerance", self.angle_tolerance),
            ("intermediate_tolerance", self.intermediate_tolerance),
            ("drive_speed", self.drive_speed),
            ("min_speed", self.min_speed),
            ("speed_gain", self.speed_gain),
            ("turn_speed", self.turn_speed),
            ("min_turn_rate", self.min_turn_rate),
            ("heading_gain", self.heading_gain),
            ("realign_angle", self.realign_angle),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(NavError::Configuration(format!("navigator.{name} must be positive (got {value})")));
            }
        }
        if self.min_speed > self.drive_speed || self.min_turn_rate > self.turn_speed {
            return Err(NavError::Configuration(
                "navigator minimum speeds must not exceed the maximums".into(),
            ));
        }
        if self.sample_interval_ms == 0 {
            return Err(NavError::Configuration("navigator.sample_interval_ms must be > 0".into()));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Step output
// ────────────────────────────────────────────────────────────────────────────

/// Velocity command for one control tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveCommand {
    /// Forward speed (mm/s).
    pub speed: f64,
    /// Turn rate (deg/s, counter-clockwise positive).
    pub turn_rate: f64,
}

/// Result of one closed-loop navigator tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NavStep {
    Arrived,
    Drive(DriveCommand),
}

// ────────────────────────────────────────────────────────────────────────────
// Navigator
// ────────────────────────────────────────────────────────────────────────────

pub struct Navigator {
    config: NavigatorConfig,
}

impl Navigator {
    pub fn new(config: NavigatorConfig) -> Result<Self, NavError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    fn tolerances(&self, waypoint: &Waypoint) -> (f64, f64) {
        (
            waypoint.tolerance.unwrap_or(self.config.position_tolerance),
            waypoint.angle_tolerance.unwrap_or(self.config.angle_tolerance),
        )
    }

    /// Turn rate for a heading error, with the sign of the error and a
    /// magnitude clamped to `[min_turn_rate, turn_speed]`.
    fn turn_rate_for(&self, error: f64) -> f64 {
        let magnitude = (self.config.heading_gain * error.abs()).clamp(self.config.min_turn_rate, self.config.turn_speed);
        magnitude.copysign(error)
    }

    /// One closed-loop control tick from `pose` toward `waypoint`.
    ///
    /// Within positional tolerance the robot turns in place to the requested
    /// heading (if any) and then reports [`NavStep::Arrived`].  Otherwise a
    /// bearing error above `realign_angle` turns in place; below it the
    /// robot drives with proportional heading correction at a speed that
    /// tapers with the remaining distance.
    ///
    /// ```
    /// use fllnav_runtime::navigator::{Navigator, NavigatorConfig, NavStep};
    /// use fllnav_types::{Pose, Waypoint};
    ///
    /// let nav = Navigator::new(NavigatorConfig::default()).unwrap();
    /// let here = Pose::new(0.0, 0.0, 0.0);
    ///
    /// match nav.step(&here, &Waypoint::new(500.0, 0.0)) {
    ///     NavStep::Drive(cmd) => assert_eq!(cmd.speed, 200.0),
    ///     NavStep::Arrived => unreachable!(),
    /// }
    /// assert_eq!(nav.step(&here, &Waypoint::new(5.0, 0.0)), NavStep::Arrived);
    /// ```
    pub fn step(&self, pose: &Pose, waypoint: &Waypoint) -> NavStep {
        let (tolerance, angle_tolerance) = self.tolerances(waypoint);
        let distance = pose.distance_to(waypoint.x, waypoint.y);

        if distance <= tolerance {
            if let Some(heading) = waypoint.heading {
                let error = pose.heading_error(heading);
                if error.abs() > angle_tolerance {
                    return NavStep::Drive(DriveCommand {
                        speed: 0.0,
                        turn_rate: self.turn_rate_for(error),
                    });
                }
            }
            return NavStep::Arrived;
        }

        let error = pose.heading_error(pose.bearing_to(waypoint.x, waypoint.y));
        if error.abs() > self.config.realign_angle {
            return NavStep::Drive(DriveCommand {
                speed: 0.0,
                turn_rate: self.turn_rate_for(error),
            });
        }

        let speed = (self.config.speed_gain * distance).clamp(self.config.min_speed, self.config.drive_speed);
        let turn_rate = (self.config.heading_gain * error).clamp(-self.config.turn_speed, self.config.turn_speed);
        NavStep::Drive(DriveCommand { speed, turn_rate })
    }

    /// Turn-then-drive to `waypoint` with blocking moves, then turn to its
    /// heading if one is set.  Returns whether the final position is within
    /// tolerance.
    pub fn go_to_waypoint(
        &self,
        hardware: &mut RobotHardware,
        odometry: &mut Odometry,
        waypoint: &Waypoint,
    ) -> Result<bool, NavError> {
        let (tolerance, angle_tolerance) = self.tolerances(waypoint);
        odometry.update(hardware.motion_reading());

        let pose = odometry.pose();
        let distance = pose.distance_to(waypoint.x, waypoint.y);
        if distance > tolerance {
            let turn = pose.heading_error(pose.bearing_to(waypoint.x, waypoint.y));
            if turn.abs() > angle_tolerance {
                hardware.drive().turn(turn)?;
                odometry.update(hardware.motion_reading());
            }
            let distance = odometry.get_distance_to(waypoint.x, waypoint.y);
            hardware.drive().straight(distance)?;
            odometry.update(hardware.motion_reading());
        }

        if let Some(heading) = waypoint.heading {
            let turn = odometry.get_angle_difference(heading);
            if turn.abs() > angle_tolerance {
                hardware.drive().turn(turn)?;
                odometry.update(hardware.motion_reading());
            }
        }

        let remaining = odometry.get_distance_to(waypoint.x, waypoint.y);
        let reached = remaining <= tolerance;
        if reached {
            debug!(x = waypoint.x, y = waypoint.y, remaining, "waypoint reached");
        } else {
            warn!(x = waypoint.x, y = waypoint.y, remaining, tolerance, "waypoint missed");
        }
        Ok(reached)
    }

    /// Visit `waypoints` in order with [`go_to_waypoint`][Self::go_to_waypoint].
    /// Returns how many were reached; with `abort_on_failure` the first miss
    /// ends the run.
    pub fn follow_waypoints(
        &self,
        hardware: &mut RobotHardware,
        odometry: &mut Odometry,
        waypoints: &[Waypoint],
        abort_on_failure: bool,
    ) -> Result<usize, NavError> {
        let mut reached = 0;
        for (i, waypoint) in waypoints.iter().enumerate() {
            if self.go_to_waypoint(hardware, odometry, waypoint)? {
                reached += 1;
            } else if abort_on_failure {
                warn!(index = i, "aborting waypoint run after a miss");
                break;
            }
        }
        info!(reached, total = waypoints.len(), "waypoint run finished");
        Ok(reached)
    }

    /// Replay recorded drive steps from the origin in fixed simulation steps
    /// and emit a waypoint (with heading) every `sample_interval`, plus the
    /// end pose when the last sample is not already there.  Step durations
    /// are clamped to `0..=MAX_STEP_DURATION`.
    pub fn convert_path_to_waypoints(&self, commands: &[DriveStep], sample_interval: Duration) -> Vec<Waypoint> {
        let step = CONVERSION_STEP.as_secs_f64();
        let sample = sample_interval.as_secs_f64();
        let mut pose = Pose::default();
        let mut waypoints: Vec<Waypoint> = Vec::new();
        let mut elapsed = 0.0;
        let mut last_sample = 0.0;

        for command in commands {
            let mut remaining = command.duration.clamp(0.0, MAX_STEP_DURATION);
            while remaining > 1e-9 {
                let dt = remaining.min(step);
                pose.advance(command.speed * dt, command.turn_rate * dt);
                elapsed += dt;
                remaining -= dt;
                if elapsed - last_sample >= sample - 1e-9 {
                    waypoints.push(Waypoint::from(pose));
                    last_sample = elapsed;
                }
            }
        }

        let at_end = waypoints
            .last()
            .is_some_and(|w| pose.distance_to(w.x, w.y) < 1e-6 && w.heading.is_some_and(|h| angle_difference(h, pose.heading).abs() < 1e-6));
        if !commands.is_empty() && !at_end {
            waypoints.push(Waypoint::from(pose));
        }
        debug!(steps = commands.len(), waypoints = waypoints.len(), "recorded path converted");
        waypoints
    }

    /// Drop intermediate waypoints closer than `min_distance` to the last
    /// kept one, unless the path turns by more than 10° there.  The first and
    /// last waypoints are always kept.
    pub fn optimize_waypoints(&self, waypoints: &[Waypoint], min_distance: f64) -> Vec<Waypoint> {
        if waypoints.len() <= 2 {
            return waypoints.to_vec();
        }
        let mut kept = vec![waypoints[0]];
        for i in 1..waypoints.len() - 1 {
            let last = kept[kept.len() - 1];
            let here = waypoints[i];
            let next = waypoints[i + 1];
            let spacing = last.point().distance_to(here.point());

            let incoming = Pose::new(last.x, last.y, 0.0).bearing_to(here.x, here.y);
            let outgoing = Pose::new(here.x, here.y, 0.0).bearing_to(next.x, next.y);
            let turning = spacing > 1e-9 && angle_difference(incoming, outgoing).abs() > DIRECTION_CHANGE_KEEP;

            if spacing >= min_distance || turning {
                kept.push(here);
            }
        }
        kept.push(waypoints[waypoints.len() - 1]);
        kept
    }
}
