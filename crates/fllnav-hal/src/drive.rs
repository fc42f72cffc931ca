//! Generic `DriveBase` trait for differential-drive motor pairs.
//!
//! Navigation code only ever talks to this trait, so a simulated base and a
//! real motor controller are interchangeable.

use fllnav_types::NavError;

/// A differential-drive base with encoder-derived cumulative odometry.
///
/// Distances are millimetres, angles degrees (counter-clockwise positive),
/// speeds mm/s and turn rates deg/s.
pub trait DriveBase: Send + Sync {
    /// Stable identifier for this drive base, e.g. `"drive_base"`.
    fn id(&self) -> &str;

    /// Start driving with the given forward speed and turn rate.  Returns
    /// immediately; motion continues until the next command.
    fn drive(&mut self, speed: f64, turn_rate: f64) -> Result<(), NavError>;

    /// Drive `distance` straight ahead (negative reverses).  Blocks until the
    /// move has finished.
    fn straight(&mut self, distance: f64) -> Result<(), NavError>;

    /// Turn in place by `angle`.  Blocks until the turn has finished.
    fn turn(&mut self, angle: f64) -> Result<(), NavError>;

    /// Stop both motors.
    fn stop(&mut self) -> Result<(), NavError>;

    /// Cumulative distance driven since power-on.
    fn distance(&self) -> f64;

    /// Cumulative angle turned since power-on.
    fn angle(&self) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records the last command; integrates blocking moves only.
    #[derive(Default)]
    struct MockDrive {
        distance: f64,
        angle: f64,
        velocity: (f64, f64),
    }

    impl DriveBase for MockDrive {
        fn id(&self) -> &str {
            "mock_drive"
        }
        fn drive(&mut self, speed: f64, turn_rate: f64) -> Result<(), NavError> {
            self.velocity = (speed, turn_rate);
            Ok(())
        }
        fn straight(&mut self, distance: f64) -> Result<(), NavError> {
            self.distance += distance;
            Ok(())
        }
        fn turn(&mut self, angle: f64) -> Result<(), NavError> {
            self.angle += angle;
            Ok(())
        }
        fn stop(&mut self) -> Result<(), NavError> {
            self.velocity = (0.0, 0.0);
            Ok(())
        }
        fn distance(&self) -> f64 {
            self.distance
        }
        fn angle(&self) -> f64 {
            self.angle
        }
    }

    #[test]
    fn mock_drive_accumulates_blocking_moves() {
        let mut drive = MockDrive::default();
        drive.straight(120.0).unwrap();
        drive.straight(-20.0).unwrap();
        drive.turn(-45.0).unwrap();
        assert!((drive.distance() - 100.0).abs() < 1e-9);
        assert!((drive.angle() + 45.0).abs() < 1e-9);

        drive.drive(200.0, 10.0).unwrap();
        drive.stop().unwrap();
        assert_eq!(drive.velocity, (0.0, 0.0));
    }
}
