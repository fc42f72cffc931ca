//! Kinematic simulation of a differential-drive robot for headless testing.
//!
//! [`SimRobot`] builds a [`RobotHardware`] whose drive base, clock and
//! sensors all share one [`SimState`].  The drive base is friction-free:
//! blocking moves complete instantly (advancing the simulated clock by the
//! time they would take), and velocity commands integrate whenever the
//! clock is waited on.  The returned [`SimHandle`] exposes the ground-truth
//! pose so tests can compare estimates against reality.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use fllnav_hal::sim::SimRobot;
//! use fllnav_types::Pose;
//!
//! let (mut hw, sim) = SimRobot::builder()
//!     .at(Pose::new(100.0, 100.0, 0.0))
//!     .with_heading_sensor()
//!     .build();
//!
//! hw.drive().drive(200.0, 0.0).unwrap();
//! hw.clock().wait(Duration::from_millis(500));
//! let pose = sim.true_pose();
//! assert!((pose.x - 200.0).abs() < 1e-6);
//! assert!(hw.has_heading_sensor());
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use fllnav_types::{FieldBounds, LandmarkMap, LandmarkReading, NavError, Pose, SensorOffset, normalize_heading};
use tracing::debug;

use crate::clock::Clock;
use crate::drive::DriveBase;
use crate::registry::RobotHardware;
use crate::sensors::{DistanceSensor, HeadingSensor, LandmarkSensor};

/// Largest integration step used when the clock advances.
const MAX_SUBSTEP: Duration = Duration::from_millis(5);

// ────────────────────────────────────────────────────────────────────────────
// Shared state
// ────────────────────────────────────────────────────────────────────────────

/// Ground truth shared by every simulated device of one robot.
#[derive(Debug, Clone)]
pub struct SimState {
    pub pose: Pose,
    /// Cumulative encoder distance (mm).
    pub distance: f64,
    /// Cumulative encoder angle (degrees).
    pub angle: f64,
    pub speed: f64,
    pub turn_rate: f64,
    pub elapsed: Duration,
    /// Speed used to time blocking straight moves (mm/s).
    pub straight_speed: f64,
    /// Rate used to time blocking turns (deg/s).
    pub turn_speed: f64,
    /// Heading at power-on; the simulated gyro reads relative to it.
    pub gyro_zero: f64,
    pub map: LandmarkMap,
    pub sensor_offset: SensorOffset,
    /// Distance (mm) from a landmark at which the sensor sees it.
    pub sensor_radius: f64,
    /// Walls seen by the distance sensor.
    pub field: FieldBounds,
    /// Drive commands that can move the robot (non-zero drive, straight, turn).
    pub motion_commands: usize,
}

impl SimState {
    fn integrate(&mut self, duration: Duration) {
        let mut remaining = duration;
        while !remaining.is_zero() {
            let step = remaining.min(MAX_SUBSTEP);
            let dt = step.as_secs_f64();
            let d = self.speed * dt;
            let a = self.turn_rate * dt;
            if d != 0.0 || a != 0.0 {
                self.pose.advance(d, a);
                self.distance += d;
                self.angle += a;
            }
            self.elapsed += step;
            remaining -= step;
        }
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Read-only view of the simulation for tests and status displays.
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    pub fn true_pose(&self) -> Pose {
        lock(&self.state).pose
    }

    pub fn elapsed(&self) -> Duration {
        lock(&self.state).elapsed
    }

    pub fn velocity(&self) -> (f64, f64) {
        let s = lock(&self.state);
        (s.speed, s.turn_rate)
    }

    pub fn motion_commands(&self) -> usize {
        lock(&self.state).motion_commands
    }

    /// Teleport the robot without touching the encoders (a "kidnap").
    pub fn set_true_pose(&self, pose: Pose) {
        lock(&self.state).pose = pose;
    }

    pub fn snapshot(&self) -> SimState {
        lock(&self.state).clone()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Devices
// ────────────────────────────────────────────────────────────────────────────

/// Simulated drive base.  Always succeeds.
pub struct SimDriveBase {
    state: Arc<Mutex<SimState>>,
}

impl DriveBase for SimDriveBase {
    fn id(&self) -> &str {
        "sim_drive"
    }

    fn drive(&mut self, speed: f64, turn_rate: f64) -> Result<(), NavError> {
        let mut s = lock(&self.state);
        s.speed = speed;
        s.turn_rate = turn_rate;
        if speed != 0.0 || turn_rate != 0.0 {
            s.motion_commands += 1;
        }
        Ok(())
    }

    fn straight(&mut self, distance: f64) -> Result<(), NavError> {
        let mut s = lock(&self.state);
        s.speed = 0.0;
        s.turn_rate = 0.0;
        s.motion_commands += 1;
        s.pose.advance(distance, 0.0);
        s.distance += distance;
        let secs = distance.abs() / s.straight_speed.max(f64::EPSILON);
        s.elapsed += Duration::from_secs_f64(secs);
        debug!(distance, "sim straight");
        Ok(())
    }

    fn turn(&mut self, angle: f64) -> Result<(), NavError> {
        let mut s = lock(&self.state);
        s.speed = 0.0;
        s.turn_rate = 0.0;
        s.motion_commands += 1;
        s.pose.advance(0.0, angle);
        s.angle += angle;
        let secs = angle.abs() / s.turn_speed.max(f64::EPSILON);
        s.elapsed += Duration::from_secs_f64(secs);
        debug!(angle, "sim turn");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), NavError> {
        let mut s = lock(&self.state);
        s.speed = 0.0;
        s.turn_rate = 0.0;
        Ok(())
    }

    fn distance(&self) -> f64 {
        lock(&self.state).distance
    }

    fn angle(&self) -> f64 {
        lock(&self.state).angle
    }
}

/// Simulated clock; waiting integrates the drive base velocities.
pub struct SimClock {
    state: Arc<Mutex<SimState>>,
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        lock(&self.state).elapsed
    }

    fn wait(&mut self, duration: Duration) {
        lock(&self.state).integrate(duration);
    }
}

/// Simulated gyro reading the true heading relative to its power-on heading.
pub struct SimHeadingSensor {
    state: Arc<Mutex<SimState>>,
    online: bool,
}

impl HeadingSensor for SimHeadingSensor {
    fn id(&self) -> &str {
        "sim_gyro"
    }

    fn probe(&mut self) -> Result<(), NavError> {
        if self.online {
            Ok(())
        } else {
            Err(NavError::Hardware {
                component: "sim_gyro".into(),
                details: "device offline".into(),
            })
        }
    }

    fn heading(&mut self) -> Result<f64, NavError> {
        let s = lock(&self.state);
        Ok(normalize_heading(s.pose.heading - s.gyro_zero))
    }
}

/// Simulated colour sensor reading the landmark map under its mount point.
pub struct SimLandmarkSensor {
    state: Arc<Mutex<SimState>>,
    online: bool,
}

impl LandmarkSensor for SimLandmarkSensor {
    fn id(&self) -> &str {
        "sim_colour"
    }

    fn probe(&mut self) -> Result<(), NavError> {
        if self.online {
            Ok(())
        } else {
            Err(NavError::Hardware {
                component: "sim_colour".into(),
                details: "device offline".into(),
            })
        }
    }

    fn read(&mut self) -> Result<LandmarkReading, NavError> {
        let s = lock(&self.state);
        let (x, y) = s.sensor_offset.sensor_point(&s.pose);
        Ok(s.map.reading_at(x, y, s.sensor_radius))
    }
}

/// Simulated ultrasonic sensor: exact distance along the true heading to
/// the field edge.  Off the field it reports no echo (`f64::INFINITY`).
pub struct SimDistanceSensor {
    state: Arc<Mutex<SimState>>,
    online: bool,
}

impl DistanceSensor for SimDistanceSensor {
    fn id(&self) -> &str {
        "sim_sonar"
    }

    fn probe(&mut self) -> Result<(), NavError> {
        if self.online {
            Ok(())
        } else {
            Err(NavError::Hardware {
                component: "sim_sonar".into(),
                details: "device offline".into(),
            })
        }
    }

    fn distance(&mut self) -> Result<f64, NavError> {
        let s = lock(&self.state);
        Ok(s.field
            .wall_distance(s.pose.x, s.pose.y, s.pose.heading)
            .unwrap_or(f64::INFINITY))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRobot builder
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SensorSlot {
    Absent,
    Online,
    Offline,
}

/// Builder for a simulated [`RobotHardware`].
pub struct SimRobot {
    start: Pose,
    map: LandmarkMap,
    sensor_offset: SensorOffset,
    sensor_radius: f64,
    straight_speed: f64,
    turn_speed: f64,
    field: FieldBounds,
    heading_sensor: SensorSlot,
    landmark_sensor: SensorSlot,
    distance_sensor: SensorSlot,
}

impl Default for SimRobot {
    fn default() -> Self {
        Self {
            start: Pose::default(),
            map: LandmarkMap::standard(1200.0, 1200.0),
            sensor_offset: SensorOffset::default(),
            sensor_radius: 25.0,
            straight_speed: 200.0,
            turn_speed: 100.0,
            field: FieldBounds::default(),
            heading_sensor: SensorSlot::Absent,
            landmark_sensor: SensorSlot::Absent,
            distance_sensor: SensorSlot::Absent,
        }
    }
}

impl SimRobot {
    /// A robot at the origin with no sensors.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Place the robot at `pose` (ground truth).
    pub fn at(mut self, pose: Pose) -> Self {
        self.start = pose;
        self
    }

    pub fn with_heading_sensor(mut self) -> Self {
        self.heading_sensor = SensorSlot::Online;
        self
    }

    /// A heading sensor whose probe fails.
    pub fn with_offline_heading_sensor(mut self) -> Self {
        self.heading_sensor = SensorSlot::Offline;
        self
    }

    /// A landmark sensor reading `map`.
    pub fn with_landmark_sensor(mut self, map: LandmarkMap) -> Self {
        self.map = map;
        self.landmark_sensor = SensorSlot::Online;
        self
    }

    /// A landmark sensor whose probe fails.
    pub fn with_offline_landmark_sensor(mut self) -> Self {
        self.landmark_sensor = SensorSlot::Offline;
        self
    }

    /// A forward distance sensor ranging to the edges of `field`.
    pub fn with_distance_sensor(mut self, field: FieldBounds) -> Self {
        self.field = field;
        self.distance_sensor = SensorSlot::Online;
        self
    }

    /// A distance sensor whose probe fails.
    pub fn with_offline_distance_sensor(mut self) -> Self {
        self.distance_sensor = SensorSlot::Offline;
        self
    }

    pub fn with_sensor_offset(mut self, offset: SensorOffset) -> Self {
        self.sensor_offset = offset;
        self
    }

    pub fn with_sensor_radius(mut self, radius: f64) -> Self {
        self.sensor_radius = radius;
        self
    }

    /// Speeds used to time blocking moves.
    pub fn with_blocking_speeds(mut self, straight_speed: f64, turn_speed: f64) -> Self {
        self.straight_speed = straight_speed;
        self.turn_speed = turn_speed;
        self
    }

    /// Consume the builder; sensors are attached (and probed) here.
    /// Offline sensors are rejected by the probe and left unattached.
    pub fn build(self) -> (RobotHardware, SimHandle) {
        let state = Arc::new(Mutex::new(SimState {
            pose: self.start,
            distance: 0.0,
            angle: 0.0,
            speed: 0.0,
            turn_rate: 0.0,
            elapsed: Duration::ZERO,
            straight_speed: self.straight_speed,
            turn_speed: self.turn_speed,
            gyro_zero: self.start.heading,
            map: self.map,
            sensor_offset: self.sensor_offset,
            sensor_radius: self.sensor_radius,
            field: self.field,
            motion_commands: 0,
        }));

        let mut hw = RobotHardware::new(
            Box::new(SimDriveBase { state: state.clone() }),
            Box::new(SimClock { state: state.clone() }),
        );

        if self.heading_sensor != SensorSlot::Absent {
            // A failed probe is already logged by the registry.
            let _ = hw.attach_heading_sensor(Box::new(SimHeadingSensor {
                state: state.clone(),
                online: self.heading_sensor == SensorSlot::Online,
            }));
        }
        if self.landmark_sensor != SensorSlot::Absent {
            let _ = hw.attach_landmark_sensor(Box::new(SimLandmarkSensor {
                state: state.clone(),
                online: self.landmark_sensor == SensorSlot::Online,
            }));
        }
        if self.distance_sensor != SensorSlot::Absent {
            let _ = hw.attach_distance_sensor(Box::new(SimDistanceSensor {
                state: state.clone(),
                online: self.distance_sensor == SensorSlot::Online,
            }));
        }

        (hw, SimHandle { state })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_sensors_are_not_attached() {
        let (hw, _) = SimRobot::builder()
            .with_offline_heading_sensor()
            .with_offline_landmark_sensor()
            .with_offline_distance_sensor()
            .build();
        assert!(!hw.has_heading_sensor());
        assert!(!hw.has_landmark_sensor());
        assert!(!hw.has_distance_sensor());
    }

    #[test]
    fn distance_sensor_ranges_to_wall_ahead() {
        let (mut hw, sim) = SimRobot::builder()
            .at(Pose::new(300.0, 200.0, 0.0))
            .with_distance_sensor(FieldBounds::new(1200.0, 1000.0))
            .build();
        let ahead = hw.read_distance().unwrap().unwrap();
        assert!((ahead - 900.0).abs() < 1e-9);

        sim.set_true_pose(Pose::new(300.0, 200.0, 90.0));
        let ahead = hw.read_distance().unwrap().unwrap();
        assert!((ahead - 800.0).abs() < 1e-9);
    }

    #[test]
    fn velocity_integrates_on_wait() {
        let (mut hw, sim) = SimRobot::builder().build();
        hw.drive().drive(0.0, 90.0).unwrap();
        hw.clock().wait(Duration::from_secs(1));
        let pose = sim.true_pose();
        assert!((pose.heading - 90.0).abs() < 1e-6);
        assert!((hw.drive().angle() - 90.0).abs() < 1e-6);
        assert_eq!(sim.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn blocking_moves_advance_clock() {
        let (mut hw, sim) = SimRobot::builder().with_blocking_speeds(100.0, 90.0).build();
        hw.drive().straight(200.0).unwrap();
        hw.drive().turn(-90.0).unwrap();
        let pose = sim.true_pose();
        assert!((pose.x - 200.0).abs() < 1e-9);
        assert!((pose.heading - 270.0).abs() < 1e-9);
        assert_eq!(sim.elapsed(), Duration::from_secs(3));
        assert_eq!(sim.motion_commands(), 2);
    }

    #[test]
    fn gyro_reads_relative_to_power_on() {
        let (mut hw, _) = SimRobot::builder()
            .at(Pose::new(0.0, 0.0, 90.0))
            .with_heading_sensor()
            .build();
        assert_eq!(hw.motion_reading().heading, Some(0.0));
        hw.drive().turn(30.0).unwrap();
        let h = hw.motion_reading().heading.unwrap();
        assert!((h - 30.0).abs() < 1e-9);
    }

    #[test]
    fn landmark_sensor_sees_zone_under_mount_point() {
        // Sensor mounted 50 mm to the left; facing +X at y = 250 puts it on
        // the blue zone at (300, 300).
        let (mut hw, sim) = SimRobot::builder()
            .at(Pose::new(300.0, 250.0, 0.0))
            .with_landmark_sensor(LandmarkMap::standard(1200.0, 1200.0))
            .build();
        assert_eq!(hw.read_landmark().unwrap(), Some(LandmarkReading::Blue));

        sim.set_true_pose(Pose::new(600.0, 550.0, 0.0));
        assert_eq!(hw.read_landmark().unwrap(), Some(LandmarkReading::White));
    }

    #[test]
    fn stop_zeroes_velocity() {
        let (mut hw, sim) = SimRobot::builder().build();
        hw.drive().drive(150.0, 5.0).unwrap();
        hw.drive().stop().unwrap();
        assert_eq!(sim.velocity(), (0.0, 0.0));
        assert_eq!(sim.motion_commands(), 1);
    }
}
