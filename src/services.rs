//! External service contracts
//!
//! Stages reach inverse kinematics, collision checking, motion planning and
//! time parameterization only through these traits. Every call is synchronous
//! from the calling worker thread; implementations must be shareable across
//! workers.

use crate::error::ErrorCode;
use crate::robot::{AllowedCollisionMatrix, RobotState, RobotTrajectory};
use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Planning-scene snapshot able to judge robot states
pub trait PlanningScene: Send + Sync {
    fn name(&self) -> &str;

    /// Joints making up `group` in the scene's robot model; `None` if unknown
    fn group_joints(&self, group: &str) -> Option<Vec<String>>;

    /// True when `state` collides with the scene, ignoring pairs `acm` allows
    fn is_state_colliding(
        &self,
        state: &RobotState,
        group: &str,
        acm: &AllowedCollisionMatrix,
    ) -> bool;
}

/// Inverse kinematics for a planning group
pub trait KinematicsSolver: Send + Sync {
    /// Configuration placing the group's tip at `pose`, searched near `seed`.
    /// `None` when no solution exists.
    fn solve(&self, group: &str, pose: &Isometry3<f64>, seed: &RobotState) -> Option<RobotState>;
}

/// Converts geometric waypoints into a timed trajectory
pub trait TimeParameterization: Send + Sync {
    /// `None` when the waypoints cannot be timed (e.g. inconsistent joints)
    fn compute(&self, group: &str, waypoints: &[RobotState]) -> Option<RobotTrajectory>;
}

/// Full motion planning, treated as an opaque service with a deadline
pub trait MotionPlanner: Send + Sync {
    fn generate_plan(
        &self,
        scene: &dyn PlanningScene,
        request: &MotionPlanRequest,
    ) -> MotionPlanResponse;

    /// Interrupt any in-flight `generate_plan` call as soon as possible
    fn terminate(&self);

    /// Accept requests again after `terminate`
    fn reset_termination(&self) {}
}

/// Target position for a single joint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointConstraint {
    pub joint_name: String,
    pub position: f64,
    pub tolerance_above: f64,
    pub tolerance_below: f64,
}

impl JointConstraint {
    pub fn is_satisfied(&self, value: f64) -> bool {
        value <= self.position + self.tolerance_above
            && value >= self.position - self.tolerance_below
    }
}

/// Pin each of `joints` to its position in `state` within `tolerance`.
///
/// Joints of `state` outside `joints` are left free. `None` if `state` lacks
/// one of `joints`.
pub fn goal_constraints_from_state(
    state: &RobotState,
    joints: &[String],
    tolerance: f64,
) -> Option<Vec<JointConstraint>> {
    joints
        .iter()
        .map(|joint_name| {
            state.position(joint_name).map(|position| JointConstraint {
                joint_name: joint_name.clone(),
                position,
                tolerance_above: tolerance,
                tolerance_below: tolerance,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionPlanRequest {
    pub group_name: String,
    pub goal_constraints: Vec<JointConstraint>,
    pub allowed_planning_time: Duration,
    pub num_planning_attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionPlanResponse {
    pub error_code: ErrorCode,
    pub trajectory: Option<RobotTrajectory>,
    pub trajectory_start: Option<RobotState>,
}

impl MotionPlanResponse {
    pub fn failure(error_code: ErrorCode) -> Self {
        Self {
            error_code,
            trajectory: None,
            trajectory_start: None,
        }
    }
}
