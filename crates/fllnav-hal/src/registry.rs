//! [`RobotHardware`] – the set of drivers one robot exposes to navigation.
//!
//! A robot always has a [`DriveBase`] and a [`Clock`].  Heading, landmark
//! and distance sensors are optional: each is probed once when attached, and a sensor
//! whose probe fails is never stored, so the feature depending on it stays
//! disabled for the rest of the session.

use fllnav_types::{LandmarkReading, MotionReading, NavError};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::drive::DriveBase;
use crate::sensors::{DistanceSensor, HeadingSensor, LandmarkSensor};

/// Drivers for one robot.
pub struct RobotHardware {
    drive: Box<dyn DriveBase>,
    clock: Box<dyn Clock>,
    heading_sensor: Option<Box<dyn HeadingSensor>>,
    landmark_sensor: Option<Box<dyn LandmarkSensor>>,
    distance_sensor: Option<Box<dyn DistanceSensor>>,
}

impl RobotHardware {
    /// Hardware with only a drive base and a clock.
    pub fn new(drive: Box<dyn DriveBase>, clock: Box<dyn Clock>) -> Self {
        Self {
            drive,
            clock,
            heading_sensor: None,
            landmark_sensor: None,
            distance_sensor: None,
        }
    }

    /// Probe and attach a heading sensor.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::SensorUnavailable`] when the probe fails; the
    /// sensor is dropped and odometry keeps integrating encoder angles.
    pub fn attach_heading_sensor(&mut self, mut sensor: Box<dyn HeadingSensor>) -> Result<(), NavError> {
        let id = sensor.id().to_string();
        if let Err(e) = sensor.probe() {
            warn!(sensor = %id, error = %e, "heading sensor probe failed, using encoder heading");
            return Err(NavError::SensorUnavailable { sensor: id });
        }
        info!(sensor = %id, "heading sensor attached");
        self.heading_sensor = Some(sensor);
        Ok(())
    }

    /// Probe and attach a landmark sensor.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::SensorUnavailable`] when the probe fails; the
    /// sensor is dropped and landmark correction is skipped.
    pub fn attach_landmark_sensor(&mut self, mut sensor: Box<dyn LandmarkSensor>) -> Result<(), NavError> {
        let id = sensor.id().to_string();
        if let Err(e) = sensor.probe() {
            warn!(sensor = %id, error = %e, "landmark sensor probe failed, correction disabled");
            return Err(NavError::SensorUnavailable { sensor: id });
        }
        info!(sensor = %id, "landmark sensor attached");
        self.landmark_sensor = Some(sensor);
        Ok(())
    }

    /// Probe and attach a forward distance sensor.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::SensorUnavailable`] when the probe fails; the
    /// sensor is dropped and wall-distance correction is skipped.
    pub fn attach_distance_sensor(&mut self, mut sensor: Box<dyn DistanceSensor>) -> Result<(), NavError> {
        let id = sensor.id().to_string();
        if let Err(e) = sensor.probe() {
            warn!(sensor = %id, error = %e, "distance sensor probe failed, correction disabled");
            return Err(NavError::SensorUnavailable { sensor: id });
        }
        info!(sensor = %id, "distance sensor attached");
        self.distance_sensor = Some(sensor);
        Ok(())
    }

    pub fn has_heading_sensor(&self) -> bool {
        self.heading_sensor.is_some()
    }

    pub fn has_landmark_sensor(&self) -> bool {
        self.landmark_sensor.is_some()
    }

    pub fn has_distance_sensor(&self) -> bool {
        self.distance_sensor.is_some()
    }

    pub fn drive(&mut self) -> &mut dyn DriveBase {
        self.drive.as_mut()
    }

    pub fn clock(&mut self) -> &mut dyn Clock {
        self.clock.as_mut()
    }

    /// Sample encoders and, when present, the heading sensor.
    ///
    /// A failing heading read is logged and reported as `heading: None` so
    /// the caller falls back to the encoder angle for this sample.
    pub fn motion_reading(&mut self) -> MotionReading {
        let heading = match self.heading_sensor.as_mut() {
            Some(sensor) => match sensor.heading() {
                Ok(h) => Some(h),
                Err(e) => {
                    warn!(sensor = %sensor.id(), error = %e, "heading read failed");
                    None
                }
            },
            None => None,
        };
        MotionReading {
            distance: self.drive.distance(),
            angle: self.drive.angle(),
            heading,
        }
    }

    /// Read the landmark sensor; `Ok(None)` when none is attached.
    pub fn read_landmark(&mut self) -> Result<Option<LandmarkReading>, NavError> {
        match self.landmark_sensor.as_mut() {
            Some(sensor) => {
                let reading = sensor.read()?;
                debug!(sensor = %sensor.id(), %reading, "landmark reading");
                Ok(Some(reading))
            }
            None => Ok(None),
        }
    }

    /// Read the distance sensor; `Ok(None)` when none is attached.
    pub fn read_distance(&mut self) -> Result<Option<f64>, NavError> {
        match self.distance_sensor.as_mut() {
            Some(sensor) => {
                let distance = sensor.distance()?;
                debug!(sensor = %sensor.id(), distance, "distance reading");
                Ok(Some(distance))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // ------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct MockDrive {
        distance: f64,
    }
    impl DriveBase for MockDrive {
        fn id(&self) -> &str {
            "mock_drive"
        }
        fn drive(&mut self, _speed: f64, _turn_rate: f64) -> Result<(), NavError> {
            Ok(())
        }
        fn straight(&mut self, distance: f64) -> Result<(), NavError> {
            self.distance += distance;
            Ok(())
        }
        fn turn(&mut self, _angle: f64) -> Result<(), NavError> {
            Ok(())
        }
        fn stop(&mut self) -> Result<(), NavError> {
            Ok(())
        }
        fn distance(&self) -> f64 {
            self.distance
        }
        fn angle(&self) -> f64 {
            0.0
        }
    }

    #[derive(Default)]
    struct MockClock(Duration);
    impl Clock for MockClock {
        fn now(&self) -> Duration {
            self.0
        }
        fn wait(&mut self, duration: Duration) {
            self.0 += duration;
        }
    }

    struct MockHeading {
        online: bool,
        fail_reads: bool,
    }
    impl HeadingSensor for MockHeading {
        fn id(&self) -> &str {
            "gyro"
        }
        fn probe(&mut self) -> Result<(), NavError> {
            if self.online {
                Ok(())
            } else {
                Err(NavError::Hardware {
                    component: "gyro".into(),
                    details: "no response".into(),
                })
            }
        }
        fn heading(&mut self) -> Result<f64, NavError> {
            if self.fail_reads {
                Err(NavError::Hardware {
                    component: "gyro".into(),
                    details: "i2c timeout".into(),
                })
            } else {
                Ok(42.0)
            }
        }
    }

    fn hardware() -> RobotHardware {
        RobotHardware::new(Box::new(MockDrive::default()), Box::new(MockClock::default()))
    }

    #[test]
    fn offline_sensor_is_not_attached() {
        let mut hw = hardware();
        let err = hw
            .attach_heading_sensor(Box::new(MockHeading {
                online: false,
                fail_reads: false,
            }))
            .unwrap_err();
        assert_eq!(err, NavError::SensorUnavailable { sensor: "gyro".into() });
        assert!(!hw.has_heading_sensor());
        assert_eq!(hw.motion_reading().heading, None);
    }

    #[test]
    fn attached_sensor_feeds_motion_reading() {
        let mut hw = hardware();
        hw.attach_heading_sensor(Box::new(MockHeading {
            online: true,
            fail_reads: false,
        }))
        .unwrap();
        hw.drive().straight(25.0).unwrap();
        let reading = hw.motion_reading();
        assert_eq!(reading.heading, Some(42.0));
        assert!((reading.distance - 25.0).abs() < 1e-9);
    }

    #[test]
    fn failed_heading_read_falls_back() {
        let mut hw = hardware();
        hw.attach_heading_sensor(Box::new(MockHeading {
            online: true,
            fail_reads: true,
        }))
        .unwrap();
        assert_eq!(hw.motion_reading().heading, None);
    }

    struct MockSonar {
        online: bool,
    }
    impl DistanceSensor for MockSonar {
        fn id(&self) -> &str {
            "sonar"
        }
        fn probe(&mut self) -> Result<(), NavError> {
            if self.online {
                Ok(())
            } else {
                Err(NavError::Hardware {
                    component: "sonar".into(),
                    details: "no echo".into(),
                })
            }
        }
        fn distance(&mut self) -> Result<f64, NavError> {
            Ok(640.0)
        }
    }

    #[test]
    fn distance_sensor_attach_and_read() {
        let mut hw = hardware();
        assert_eq!(hw.read_distance().unwrap(), None);
        assert!(hw.attach_distance_sensor(Box::new(MockSonar { online: false })).is_err());
        assert!(!hw.has_distance_sensor());

        hw.attach_distance_sensor(Box::new(MockSonar { online: true })).unwrap();
        assert!(hw.has_distance_sensor());
        assert_eq!(hw.read_distance().unwrap(), Some(640.0));
    }

    #[test]
    fn no_landmark_sensor_reads_none() {
        let mut hw = hardware();
        assert_eq!(hw.read_landmark().unwrap(), None);
        hw.clock().wait(Duration::from_millis(20));
        assert_eq!(hw.clock().now(), Duration::from_millis(20));
    }
}
