//! [`Runner`] – the autonomous navigation orchestrator.
//!
//! The runner owns the robot hardware and every estimator.  Operations
//! (navigate, follow a recorded path, calibrate) block the caller and run a
//! cooperative loop; each iteration
//!
//! 1. ticks the estimators ([`Runner::tick`]): odometry and particle
//!    prediction on the fast cadence, landmark and wall-distance correction
//!    and conditional resampling on the slow cadence, and a status push when
//!    one is due;
//! 2. polls the cancel flag, stopping the drive base immediately when it is
//!    raised;
//! 3. asks the [`Navigator`] for one velocity command toward the active
//!    waypoint and sends it to the drive base.
//!
//! Mode transitions: `idle → navigating | following | calibrating →
//! completed | aborted`; the next operation (or [`Runner::stop`]) returns the
//! runner to `idle`.
//!
//! # Example
//!
//! ```rust
//! use fllnav_hal::sim::SimRobot;
//! use fllnav_runtime::{NavConfig, Runner};
//! use fllnav_types::{NavOutcome, Pose};
//!
//! let start = Pose::new(200.0, 200.0, 0.0);
//! let (hw, sim) = SimRobot::builder().at(start).with_heading_sensor().build();
//! let mut config = NavConfig::default();
//! config.localization.seed = Some(1);
//!
//! let mut runner = Runner::new(config, hw, start).unwrap();
//! let outcome = runner.navigate_to(600.0, 200.0, None, false);
//! assert_eq!(outcome, NavOutcome::Completed);
//! assert!(sim.true_pose().distance_to(600.0, 200.0) < 40.0);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fllnav_hal::RobotHardware;
use fllnav_perception::localization::Localizer;
use fllnav_perception::odometry::Odometry;
use fllnav_perception::planner::PathPlanner;
use fllnav_types::{
    Command, CommandReply, DriveStep, FieldBounds, LandmarkReading, NavError, NavOutcome, Obstacle, OdometryDelta, Point,
    Pose, RunnerMode, StatusReport, Waypoint, normalize_heading,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::cadence::{self, Cadence};
use crate::config::NavConfig;
use crate::navigator::{NavStep, Navigator};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RunnerConfig {
    /// Odometry integration and particle prediction period.
    pub odometry_interval_ms: u64,
    /// Landmark correction and resampling period.
    pub localization_interval_ms: u64,
    /// Sleep between control loop iterations.
    pub loop_period_ms: u64,
    /// Status push period.
    pub status_interval_ms: u64,
    /// Corrections applied by one successful calibration.
    pub calibration_cycles: usize,
    /// Loop iterations allowed per waypoint before navigation fails.
    pub max_steps_per_waypoint: usize,
    /// Particle spread (mm) around a reset position.
    pub reset_spread: f64,
    /// Merge closely spaced waypoints of converted recordings.
    pub optimize_waypoints: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            odometry_interval_ms: 20,
            localization_interval_ms: 200,
            loop_period_ms: 10,
            status_interval_ms: 500,
            calibration_cycles: 5,
            max_steps_per_waypoint: 3000,
            reset_spread: 50.0,
            optimize_waypoints: true,
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<(), NavError> {
        let periods = [
            ("odometry_interval_ms", self.odometry_interval_ms),
            ("localization_interval_ms", self.localization_interval_ms),
            ("loop_period_ms", self.loop_period_ms),
            ("status_interval_ms", self.status_interval_ms),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(NavError::Configuration(format!("runner.{name} must be > 0")));
            }
        }
        if self.calibration_cycles == 0 || self.max_steps_per_waypoint == 0 {
            return Err(NavError::Configuration(
                "runner.calibration_cycles and runner.max_steps_per_waypoint must be > 0".into(),
            ));
        }
        if !(self.reset_spread.is_finite() && self.reset_spread >= 0.0) {
            return Err(NavError::Configuration("runner.reset_spread must be >= 0".into()));
        }
        Ok(())
    }

    fn loop_period(&self) -> Duration {
        Duration::from_millis(self.loop_period_ms)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// State
// ────────────────────────────────────────────────────────────────────────────

/// Snapshot of the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerState {
    pub best_pose: Pose,
    pub confidence: f64,
    pub running: bool,
    pub mode: RunnerMode,
    pub last_outcome: Option<NavOutcome>,
    /// Clock reading at the last tick.
    pub elapsed: Duration,
    /// Estimator ticks since start-up.
    pub ticks: u64,
}

/// Receives periodic status pushes.
pub type StatusSink = Box<dyn FnMut(&StatusReport) + Send>;

/// Blend odometry and the localizer estimate by the localizer confidence.
///
/// Position weight on the localizer: 0.8 above 0.8 confidence, 0.5 above
/// 0.5, else 0.2.  Heading comes from the localizer above 0.6 confidence,
/// else from odometry.
pub fn blend_pose(odometry: Pose, localized: Pose, confidence: f64) -> Pose {
    let weight = if confidence > 0.8 {
        0.8
    } else if confidence > 0.5 {
        0.5
    } else {
        0.2
    };
    let heading = if confidence > 0.6 {
        localized.heading
    } else {
        odometry.heading
    };
    Pose::new(
        weight * localized.x + (1.0 - weight) * odometry.x,
        weight * localized.y + (1.0 - weight) * odometry.y,
        heading,
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Runner
// ────────────────────────────────────────────────────────────────────────────

pub struct Runner {
    config: NavConfig,
    field: FieldBounds,
    hardware: RobotHardware,
    odometry: Odometry,
    localizer: Localizer,
    planner: PathPlanner,
    navigator: Navigator,
    cadence: Cadence,
    /// Odometry motion not yet applied to the particles.
    pending: OdometryDelta,
    state: RunnerState,
    cancel: Arc<AtomicBool>,
    status_sink: Option<StatusSink>,
}

impl Runner {
    /// Validate `config`, build every estimator and seed them at `start`.
    pub fn new(config: NavConfig, mut hardware: RobotHardware, start: Pose) -> Result<Self, NavError> {
        config.validate()?;
        let field = config.field.bounds();

        let mut localizer = Localizer::new(config.localization.clone(), field, config.field.landmark_map())?;
        localizer.initialize(
            Some(start.x),
            Some(start.y),
            Some(start.heading),
            config.runner.reset_spread,
        );
        let planner = PathPlanner::new(field, config.planner.clone())?;
        let navigator = Navigator::new(config.navigator.clone())?;
        let odometry = Odometry::new(start, hardware.motion_reading());
        let elapsed = hardware.clock().now();

        let mut cadence = Cadence::new();
        cadence.register(cadence::ODOMETRY, Duration::from_millis(config.runner.odometry_interval_ms));
        cadence.register(
            cadence::LOCALIZATION,
            Duration::from_millis(config.runner.localization_interval_ms),
        );
        cadence.register(cadence::STATUS, Duration::from_millis(config.runner.status_interval_ms));

        info!(
            x = start.x,
            y = start.y,
            heading = start.heading,
            heading_sensor = hardware.has_heading_sensor(),
            landmark_sensor = hardware.has_landmark_sensor(),
            distance_sensor = hardware.has_distance_sensor(),
            particles = config.localization.particle_count,
            "runner ready"
        );

        let mut runner = Self {
            config,
            field,
            hardware,
            odometry,
            localizer,
            planner,
            navigator,
            cadence,
            pending: OdometryDelta::default(),
            state: RunnerState {
                best_pose: start,
                confidence: 0.0,
                running: false,
                mode: RunnerMode::Idle,
                last_outcome: None,
                elapsed,
                ticks: 0,
            },
            cancel: Arc::new(AtomicBool::new(false)),
            status_sink: None,
        };
        runner.refresh_estimate();
        Ok(runner)
    }

    /// Shared flag that aborts the active operation when raised.  A flag
    /// raised before an operation starts aborts it at its first step; every
    /// operation clears the flag when it finishes.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn set_status_sink(&mut self, sink: impl FnMut(&StatusReport) + Send + 'static) {
        self.status_sink = Some(Box::new(sink));
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn state(&self) -> &RunnerState {
        &self.state
    }

    pub fn planner(&self) -> &PathPlanner {
        &self.planner
    }

    pub fn localizer(&self) -> &Localizer {
        &self.localizer
    }

    pub fn odometry(&self) -> &Odometry {
        &self.odometry
    }

    pub fn hardware(&mut self) -> &mut RobotHardware {
        &mut self.hardware
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            position: self.state.best_pose,
            confidence: self.state.confidence,
            mode: self.state.mode,
        }
    }

    // ── Estimation ──────────────────────────────────────────────────────────

    /// Run whichever estimator tasks are due at the current clock reading.
    pub fn tick(&mut self) {
        let now = self.hardware.clock().now();

        if self.cadence.run_if_due(cadence::ODOMETRY, now) {
            let delta = self.odometry.update(self.hardware.motion_reading());
            self.pending.distance += delta.distance;
            self.pending.angle += delta.angle;
            if self.pending.is_significant() {
                self.localizer.predict(self.pending.distance, self.pending.angle);
                self.pending = OdometryDelta::default();
            }
        }

        if self.cadence.run_if_due(cadence::LOCALIZATION, now) {
            match self.hardware.read_landmark() {
                Ok(Some(reading)) => {
                    self.localizer.correct(reading);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "landmark read failed, skipping correction"),
            }
            match self.hardware.read_distance() {
                Ok(Some(distance)) => {
                    self.localizer.correct_distance(distance);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "distance read failed, skipping correction"),
            }
            if self.localizer.needs_resample() {
                self.localizer.resample();
            }
        }

        self.refresh_estimate();
        self.state.elapsed = now;
        self.state.ticks += 1;

        if self.cadence.run_if_due(cadence::STATUS, now) {
            self.push_status();
        }
    }

    fn refresh_estimate(&mut self) {
        self.state.confidence = self.localizer.get_confidence();
        self.state.best_pose = self.get_best_pose();
    }

    fn push_status(&mut self) {
        let report = self.status();
        debug!(
            x = report.position.x,
            y = report.position.y,
            heading = report.position.heading,
            confidence = report.confidence,
            "status"
        );
        if let Some(sink) = self.status_sink.as_mut() {
            sink(&report);
        }
    }

    /// Odometry blended with the localizer estimate; see [`blend_pose`].
    pub fn get_best_pose(&self) -> Pose {
        blend_pose(
            self.odometry.pose(),
            self.localizer.get_localized_pose(),
            self.localizer.get_confidence(),
        )
    }

    // ── Operation lifecycle ─────────────────────────────────────────────────

    fn begin(&mut self, mode: RunnerMode) {
        self.state.mode = mode;
        self.state.running = true;
        self.state.last_outcome = None;
    }

    fn finish(&mut self, outcome: NavOutcome) -> NavOutcome {
        self.halt();
        self.cancel.store(false, Ordering::SeqCst);
        self.refresh_estimate();
        self.state.running = false;
        self.state.mode = if outcome.is_completed() {
            RunnerMode::Completed
        } else {
            RunnerMode::Aborted
        };
        self.state.last_outcome = Some(outcome.clone());
        let pose = self.state.best_pose;
        info!(?outcome, x = pose.x, y = pose.y, heading = pose.heading, "operation finished");
        outcome
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn halt(&mut self) {
        if let Err(e) = self.hardware.drive().stop() {
            warn!(error = %e, "drive base stop failed");
        }
    }

    fn wait(&mut self, duration: Duration) {
        self.hardware.clock().wait(duration);
    }

    /// Drive through `waypoints` with the closed-loop controller.
    fn drive_waypoints(&mut self, waypoints: &[Waypoint]) -> NavOutcome {
        let period = self.config.runner.loop_period();
        let max_steps = self.config.runner.max_steps_per_waypoint;

        for (index, waypoint) in waypoints.iter().enumerate() {
            let mut steps = 0;
            loop {
                self.tick();
                if self.cancelled() {
                    self.halt();
                    warn!(index, "navigation cancelled");
                    return NavOutcome::Aborted;
                }
                let command = match self.navigator.step(&self.state.best_pose, waypoint) {
                    NavStep::Arrived => break,
                    NavStep::Drive(command) => command,
                };
                if let Err(e) = self.hardware.drive().drive(command.speed, command.turn_rate) {
                    return NavOutcome::failed(e.to_string());
                }
                steps += 1;
                if steps >= max_steps {
                    warn!(index, steps, x = waypoint.x, y = waypoint.y, "waypoint not reached");
                    return NavOutcome::failed(format!("waypoint {index} not reached after {steps} steps"));
                }
                self.wait(period);
            }
            debug!(index, total = waypoints.len(), steps, "waypoint reached");
        }
        NavOutcome::Completed
    }

    /// Pass-through waypoints get the loose intermediate tolerance and no
    /// heading; the last one keeps `final_heading`.
    fn route_waypoints(&self, points: &[Point], final_heading: Option<f64>) -> Vec<Waypoint> {
        let nav = self.navigator.config();
        let last = points.len().saturating_sub(1);
        points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                if i == last {
                    let wp = Waypoint::from(*p);
                    match final_heading {
                        Some(h) => wp.with_heading(h),
                        None => wp,
                    }
                } else {
                    Waypoint::from(*p).with_tolerance(nav.intermediate_tolerance, nav.angle_tolerance)
                }
            })
            .collect()
    }

    // ── Operations ──────────────────────────────────────────────────────────

    /// Navigate to `(x, y)`, optionally finishing at `heading`.
    ///
    /// With path planning, a route is planned from the current best pose
    /// first; when none exists the robot does not move and the outcome is
    /// `Failed`.  Obstacle edits during the drive do not re-plan it.
    #[instrument(skip(self))]
    pub fn navigate_to(&mut self, x: f64, y: f64, heading: Option<f64>, use_path_planning: bool) -> NavOutcome {
        self.begin(RunnerMode::Navigating);
        self.tick();

        let goal = Point::new(x, y);
        let points = if use_path_planning {
            let pose = self.state.best_pose;
            let (sx, sy) = self.field.clamp(pose.x, pose.y);
            match self.planner.plan_path(Point::new(sx, sy), goal) {
                Ok(path) => path.into_iter().skip(1).collect(),
                Err(e) => {
                    warn!(error = %e, "no route, staying put");
                    return self.finish(NavOutcome::failed(e.to_string()));
                }
            }
        } else {
            vec![goal]
        };

        let waypoints = self.route_waypoints(&points, heading);
        info!(waypoints = waypoints.len(), "navigating");
        let outcome = self.drive_waypoints(&waypoints);
        self.finish(outcome)
    }

    /// Follow a recorded drive session.
    ///
    /// With `use_waypoints` the recording is converted to waypoints
    /// (optionally thinned), placed relative to the current odometry pose
    /// and followed with the closed-loop controller.  Otherwise every step
    /// is replayed as a timed velocity command.
    #[instrument(skip(self, commands), fields(steps = commands.len()))]
    pub fn follow_recorded_path(&mut self, commands: &[DriveStep], use_waypoints: bool) -> NavOutcome {
        self.begin(RunnerMode::Following);
        if let Err(e) = commands.iter().try_for_each(DriveStep::validate) {
            warn!(error = %e, "recorded path rejected");
            return self.finish(NavOutcome::failed(e.to_string()));
        }
        self.tick();

        let outcome = if use_waypoints {
            let nav = self.navigator.config().clone();
            let mut waypoints = self
                .navigator
                .convert_path_to_waypoints(commands, Duration::from_millis(nav.sample_interval_ms));
            if self.config.runner.optimize_waypoints {
                waypoints = self.navigator.optimize_waypoints(&waypoints, nav.min_waypoint_distance);
            }
            let origin = self.odometry.pose();
            let points: Vec<Point> = waypoints.iter().map(|w| relative_to(origin, w.point())).collect();
            let final_heading = waypoints
                .last()
                .and_then(|w| w.heading)
                .map(|h| normalize_heading(h + origin.heading));
            let route = self.route_waypoints(&points, final_heading);
            info!(waypoints = route.len(), "following recorded path");
            self.drive_waypoints(&route)
        } else {
            self.replay(commands)
        };
        self.finish(outcome)
    }

    fn replay(&mut self, commands: &[DriveStep]) -> NavOutcome {
        let period = self.config.runner.loop_period();
        for (index, step) in commands.iter().enumerate() {
            if let Err(e) = self.hardware.drive().drive(step.speed, step.turn_rate) {
                return NavOutcome::failed(e.to_string());
            }
            let length = match Duration::try_from_secs_f64(step.duration) {
                Ok(length) => length,
                Err(e) => return NavOutcome::failed(format!("step {index}: {e}")),
            };
            let end = self.hardware.clock().now() + length;
            loop {
                self.tick();
                if self.cancelled() {
                    self.halt();
                    warn!(index, "replay cancelled");
                    return NavOutcome::Aborted;
                }
                let now = self.hardware.clock().now();
                if now >= end {
                    break;
                }
                self.wait(period.min(end - now));
            }
        }
        self.tick();
        NavOutcome::Completed
    }

    /// When the landmark sensor currently reads `expected`, apply repeated
    /// corrections with it and resample.  Returns whether it matched.
    #[instrument(skip(self))]
    pub fn calibrate_on_landmark(&mut self, expected: LandmarkReading) -> bool {
        self.begin(RunnerMode::Calibrating);
        if !self.hardware.has_landmark_sensor() {
            warn!("no landmark sensor attached");
            self.finish(NavOutcome::failed("no landmark sensor"));
            return false;
        }

        let reading = match self.hardware.read_landmark() {
            Ok(reading) => reading,
            Err(e) => {
                self.finish(NavOutcome::failed(e.to_string()));
                return false;
            }
        };
        if reading != Some(expected) {
            info!(?reading, %expected, "not on the expected landmark");
            self.finish(NavOutcome::failed(format!("landmark {expected} not under the sensor")));
            return false;
        }

        for _ in 0..self.config.runner.calibration_cycles {
            self.localizer.correct(expected);
        }
        self.localizer.resample();
        info!(%expected, confidence = self.localizer.get_confidence(), "calibrated");
        self.finish(NavOutcome::Completed);
        true
    }

    /// Put the robot at a known pose: odometry restarts there and the
    /// particles are re-seeded around it.
    pub fn reset_position(&mut self, x: f64, y: f64, heading: f64) -> Pose {
        let baseline = self.hardware.motion_reading();
        self.odometry.reset(x, y, heading, baseline);
        self.localizer
            .initialize(Some(x), Some(y), Some(heading), self.config.runner.reset_spread);
        self.pending = OdometryDelta::default();
        self.cadence.reset();
        self.state.mode = RunnerMode::Idle;
        self.refresh_estimate();
        info!(x, y, heading, "position reset");
        self.state.best_pose
    }

    pub fn add_obstacle(&mut self, obstacle: Obstacle) -> Result<usize, NavError> {
        self.planner.add_obstacle(obstacle)
    }

    pub fn remove_obstacle(&mut self, index: usize) -> Result<Obstacle, NavError> {
        self.planner.remove_obstacle(index)
    }

    pub fn clear_obstacles(&mut self) {
        self.planner.clear_obstacles();
    }

    /// Stop the drive base and return to idle.
    pub fn stop(&mut self) {
        self.halt();
        self.state.running = false;
        self.state.mode = RunnerMode::Idle;
        info!("stopped");
    }

    /// Dispatch one command message.
    pub fn handle(&mut self, command: Command) -> Result<CommandReply, NavError> {
        command.validate()?;
        debug!(action = command.name(), "dispatching command");
        let reply = match command {
            Command::Navigate {
                x,
                y,
                heading,
                use_path_planning,
            } => CommandReply::Navigation {
                outcome: self.navigate_to(x, y, heading, use_path_planning),
            },
            Command::FollowPath {
                commands,
                use_waypoints,
            } => CommandReply::Navigation {
                outcome: self.follow_recorded_path(&commands, use_waypoints),
            },
            Command::Calibrate { expected_landmark } => CommandReply::Calibrated {
                matched: self.calibrate_on_landmark(expected_landmark),
            },
            Command::ResetPosition { x, y, heading } => CommandReply::PositionReset {
                position: self.reset_position(x, y, heading),
            },
            Command::AddObstacle { x, y, width, height } => CommandReply::ObstacleAdded {
                index: self.planner.set_obstacle(x, y, width, height)?,
            },
            Command::RemoveObstacle { index } => {
                self.remove_obstacle(index)?;
                CommandReply::ObstacleRemoved {
                    remaining: self.planner.obstacles().len(),
                }
            }
            Command::ClearObstacles => {
                self.clear_obstacles();
                CommandReply::ObstaclesCleared
            }
            Command::Stop => {
                self.stop();
                CommandReply::Stopped
            }
        };
        Ok(reply)
    }
}

/// Map a point expressed in the frame of `origin` onto the field.
fn relative_to(origin: Pose, p: Point) -> Point {
    let (sin, cos) = origin.heading.to_radians().sin_cos();
    Point::new(origin.x + p.x * cos - p.y * sin, origin.y + p.x * sin + p.y * cos)
}
