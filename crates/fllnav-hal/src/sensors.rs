//! Optional sensor traits.  A robot may carry any subset of them; each is
//! probed once when attached to a [`RobotHardware`][crate::registry::RobotHardware].

use fllnav_types::{LandmarkReading, NavError};

/// An absolute heading source (gyro / IMU yaw).
pub trait HeadingSensor: Send + Sync {
    fn id(&self) -> &str;

    /// Check that the device is present and answering.
    fn probe(&mut self) -> Result<(), NavError>;

    /// Current heading in degrees.  The zero reference is the device's own;
    /// odometry captures an offset on reset.
    fn heading(&mut self) -> Result<f64, NavError>;
}

/// A downward-facing colour sensor classifying the surface under it.
pub trait LandmarkSensor: Send + Sync {
    fn id(&self) -> &str;

    /// Check that the device is present and answering.
    fn probe(&mut self) -> Result<(), NavError>;

    /// Classify the surface currently under the sensor.
    fn read(&mut self) -> Result<LandmarkReading, NavError>;
}

/// A forward-facing ultrasonic range finder at the robot centre.
pub trait DistanceSensor: Send + Sync {
    fn id(&self) -> &str;

    /// Check that the device is present and answering.
    fn probe(&mut self) -> Result<(), NavError>;

    /// Distance (mm) to the nearest echo straight ahead.
    fn distance(&mut self) -> Result<f64, NavError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedColour(LandmarkReading);

    impl LandmarkSensor for FixedColour {
        fn id(&self) -> &str {
            "fixed"
        }
        fn probe(&mut self) -> Result<(), NavError> {
            Ok(())
        }
        fn read(&mut self) -> Result<LandmarkReading, NavError> {
            Ok(self.0)
        }
    }

    #[test]
    fn trait_object_reads() {
        let mut sensor: Box<dyn LandmarkSensor> = Box::new(FixedColour(LandmarkReading::Blue));
        sensor.probe().unwrap();
        assert_eq!(sensor.read().unwrap(), LandmarkReading::Blue);
    }
}
