//! Timed joint trajectories.

use crate::robot::RobotState;
use serde::{Deserialize, Serialize};

/// One timed waypoint; vectors are indexed like [`RobotTrajectory::joint_names`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub positions: Vec<f64>,
    #[serde(default)]
    pub velocities: Vec<f64>,
    #[serde(default)]
    pub accelerations: Vec<f64>,
    /// Seconds from the start of the segment
    pub time_from_start: f64,
}

/// A trajectory segment for one planning group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotTrajectory {
    pub group_name: String,
    pub joint_names: Vec<String>,
    pub points: Vec<TrajectoryPoint>,
}

impl RobotTrajectory {
    pub fn new(group_name: impl Into<String>, joint_names: Vec<String>) -> Self {
        Self {
            group_name: group_name.into(),
            joint_names,
            points: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Total duration in seconds
    pub fn duration(&self) -> f64 {
        self.points.last().map(|p| p.time_from_start).unwrap_or(0.0)
    }

    /// True when time stamps never decrease
    pub fn is_time_monotonic(&self) -> bool {
        self.points
            .windows(2)
            .all(|pair| pair[1].time_from_start >= pair[0].time_from_start)
    }

    /// Waypoint `index` as a robot state
    pub fn state_at(&self, index: usize) -> Option<RobotState> {
        let point = self.points.get(index)?;
        Some(RobotState::from_positions(
            self.joint_names
                .iter()
                .cloned()
                .zip(point.positions.iter().copied()),
        ))
    }

    pub fn first_state(&self) -> Option<RobotState> {
        self.state_at(0)
    }

    pub fn last_state(&self) -> Option<RobotState> {
        self.points
            .len()
            .checked_sub(1)
            .and_then(|index| self.state_at(index))
    }
}
