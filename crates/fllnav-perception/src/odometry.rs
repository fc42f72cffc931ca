//! Dead-reckoning pose integrator.
//!
//! Converts cumulative encoder distance/angle samples (and, when present, an
//! absolute heading sensor) into a field pose.  Each update integrates the
//! increment since the previous sample as a circular arc, falling back to a
//! straight projection for negligible turns.
//!
//! # Example
//!
//! ```rust
//! use fllnav_perception::odometry::Odometry;
//! use fllnav_types::{MotionReading, Pose};
//!
//! let mut odom = Odometry::new(Pose::new(100.0, 100.0, 90.0), MotionReading::default());
//! let delta = odom.update(MotionReading { distance: 50.0, angle: 0.0, heading: None });
//!
//! assert_eq!(delta.distance, 50.0);
//! assert!((odom.pose().y - 150.0).abs() < 1e-9);
//! ```

use fllnav_types::pose::arc_displacement;
use fllnav_types::{MotionReading, OdometryDelta, Pose, angle_difference, normalize_heading};
use tracing::debug;

/// Integrated odometry state.
#[derive(Debug, Clone)]
pub struct Odometry {
    pose: Pose,
    last_distance: f64,
    last_angle: f64,
    /// Added to the heading sensor reading to obtain the field heading.
    heading_offset: Option<f64>,
    travelled: f64,
}

impl Odometry {
    /// Start integrating at `start`, with `baseline` as the current sample.
    pub fn new(start: Pose, baseline: MotionReading) -> Self {
        let mut odom = Self {
            pose: start,
            last_distance: 0.0,
            last_angle: 0.0,
            heading_offset: None,
            travelled: 0.0,
        };
        odom.reset(start.x, start.y, start.heading, baseline);
        odom
    }

    /// Set the pose and take `baseline` as the new zero for the encoder
    /// deltas.  A heading sensor reading in `baseline` is captured as an
    /// offset so that the reset heading is honoured.
    pub fn reset(&mut self, x: f64, y: f64, heading: f64, baseline: MotionReading) {
        self.pose = Pose::new(x, y, heading);
        self.last_distance = baseline.distance;
        self.last_angle = baseline.angle;
        self.heading_offset = baseline.heading.map(|h| normalize_heading(self.pose.heading - h));
        self.travelled = 0.0;
        debug!(x, y, heading = self.pose.heading, "odometry reset");
    }

    /// Integrate one sample; returns the increment applied.
    pub fn update(&mut self, reading: MotionReading) -> OdometryDelta {
        let delta_distance = reading.distance - self.last_distance;
        let encoder_angle = reading.angle - self.last_angle;
        self.last_distance = reading.distance;
        self.last_angle = reading.angle;

        let delta_angle = match reading.heading {
            Some(sensor) => {
                let offset = *self
                    .heading_offset
                    .get_or_insert_with(|| normalize_heading(self.pose.heading + encoder_angle - sensor));
                angle_difference(self.pose.heading, normalize_heading(sensor + offset))
            }
            None => encoder_angle,
        };

        self.pose.heading = normalize_heading(self.pose.heading + delta_angle);
        let (dx, dy) = arc_displacement(self.pose.heading, delta_distance, delta_angle);
        self.pose.x += dx;
        self.pose.y += dy;
        self.travelled += delta_distance.abs();

        OdometryDelta {
            distance: delta_distance,
            angle: delta_angle,
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Total absolute distance integrated since the last reset.
    pub fn travelled(&self) -> f64 {
        self.travelled
    }

    pub fn get_distance_to(&self, x: f64, y: f64) -> f64 {
        self.pose.distance_to(x, y)
    }

    /// Absolute bearing to `(x, y)` in `[0, 360)`.
    pub fn get_angle_to(&self, x: f64, y: f64) -> f64 {
        self.pose.bearing_to(x, y)
    }

    /// Signed shortest rotation from the current heading to `target`.
    pub fn get_angle_difference(&self, target: f64) -> f64 {
        self.pose.heading_error(target)
    }
}
