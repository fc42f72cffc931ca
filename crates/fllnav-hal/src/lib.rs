//! Hardware abstraction for a differential-drive robot: motor and sensor
//! traits, the per-robot driver set, and a kinematic simulator.

pub mod clock;
pub mod drive;
pub mod registry;
pub mod sensors;
pub mod sim;

pub use clock::{Clock, SystemClock};
pub use drive::DriveBase;
pub use registry::RobotHardware;
pub use sensors::{DistanceSensor, HeadingSensor, LandmarkSensor};
pub use sim::{SimHandle, SimRobot};
