//! Robot model types shared by stages and services
//!
//! Joint-space states, timed trajectories and the allowed collision matrix.
//! Kinematic and collision algorithms live behind the traits in
//! [`crate::services`]; this module only carries data.

pub mod collision;
pub mod state;
pub mod trajectory;

pub use collision::AllowedCollisionMatrix;
pub use state::RobotState;
pub use trajectory::{RobotTrajectory, TrajectoryPoint};
