//! `fllnav-perception` – pose estimation and path planning.
//!
//! # Modules
//!
//! - [`odometry`] – [`Odometry`][odometry::Odometry]: dead-reckoning
//!   integrator turning encoder (and optional gyro) samples into a field
//!   pose, arc by arc.
//! - [`localization`] – [`Localizer`][localization::Localizer]: Monte Carlo
//!   particle filter correcting the pose from landmark colour readings.
//! - [`grid`] – [`OccupancyGrid`][grid::OccupancyGrid]: free/blocked cells
//!   with obstacle rasterization and line-of-sight checks.
//! - [`planner`] – [`PathPlanner`][planner::PathPlanner]: 4-connected A*
//!   with in-place decrease-key and path smoothing.

pub mod grid;
pub mod localization;
pub mod odometry;
pub mod planner;
