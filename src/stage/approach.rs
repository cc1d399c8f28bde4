//! Approach-and-translate stage
//!
//! Synthesizes the short straight-line Cartesian motions around a grasp: the
//! approach into the grasp pose (validated against the pre-grasp scene) and an
//! optional retreat out of it (validated against the post-grasp scene). Each
//! motion is discretized into increments of at most `max_step`; every
//! increment is solved with inverse kinematics and collision-checked before
//! the accepted waypoints are time-parameterized.

use crate::error::{ErrorCode, PipelineError};
use crate::plan::{GripperTranslation, ManipulationPlan};
use crate::robot::{AllowedCollisionMatrix, RobotState};
use crate::services::{KinematicsSolver, PlanningScene, TimeParameterization};
use crate::stage::{ManipulationStage, StopSignal};
use nalgebra::{Translation3, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

/// When a translation counts as complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproachTermination {
    /// The whole requested distance must be covered
    #[default]
    PathLength,
    /// Stop once `max_goal_count` waypoints have been accepted
    GoalCount,
}

/// Tunables bounding the interpolation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproachSettings {
    /// Accepted waypoints after which a `GoalCount` translation stops
    #[serde(default = "default_max_goal_count")]
    pub max_goal_count: u32,

    /// Consecutive IK/collision failures tolerated before rejecting
    #[serde(default = "default_max_fail")]
    pub max_fail: u32,

    /// Largest Cartesian distance per increment (meters)
    #[serde(default = "default_max_step")]
    pub max_step: f64,

    #[serde(default)]
    pub termination: ApproachTermination,
}

fn default_max_goal_count() -> u32 {
    5
}

fn default_max_fail() -> u32 {
    3
}

fn default_max_step() -> f64 {
    0.02
}

impl Default for ApproachSettings {
    fn default() -> Self {
        Self {
            max_goal_count: default_max_goal_count(),
            max_fail: default_max_fail(),
            max_step: default_max_step(),
            termination: ApproachTermination::default(),
        }
    }
}

impl ApproachSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_goal_count == 0 {
            return Err("max_goal_count must be at least 1".to_string());
        }
        if self.max_fail == 0 {
            return Err("max_fail must be at least 1".to_string());
        }
        if !(self.max_step.is_finite() && self.max_step > 0.0) {
            return Err(format!("max_step must be positive, got {}", self.max_step));
        }
        Ok(())
    }
}

pub struct ApproachAndTranslateStage {
    name: String,
    pre_grasp_scene: Arc<dyn PlanningScene>,
    post_grasp_scene: Arc<dyn PlanningScene>,
    collision_matrix: Arc<AllowedCollisionMatrix>,
    kinematics: Arc<dyn KinematicsSolver>,
    time_param: Arc<dyn TimeParameterization>,
    settings: ApproachSettings,
    stop: StopSignal,
}

impl ApproachAndTranslateStage {
    pub const DEFAULT_NAME: &'static str = "approach";

    /// Tolerance used when comparing covered distance to the requested one
    const DISTANCE_EPSILON: f64 = 1e-9;

    /// Build the stage; settings that could stall or overshoot the
    /// interpolation are refused.
    pub fn new(
        pre_grasp_scene: Arc<dyn PlanningScene>,
        post_grasp_scene: Arc<dyn PlanningScene>,
        collision_matrix: Arc<AllowedCollisionMatrix>,
        kinematics: Arc<dyn KinematicsSolver>,
        time_param: Arc<dyn TimeParameterization>,
        settings: ApproachSettings,
    ) -> Result<Self, PipelineError> {
        settings
            .validate()
            .map_err(|reason| PipelineError::InvalidStageSettings {
                stage: Self::DEFAULT_NAME.to_string(),
                reason,
            })?;
        Ok(Self {
            name: Self::DEFAULT_NAME.to_string(),
            pre_grasp_scene,
            post_grasp_scene,
            collision_matrix,
            kinematics,
            time_param,
            settings,
            stop: StopSignal::new(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn settings(&self) -> &ApproachSettings {
        &self.settings
    }

    fn retreat_name(&self) -> String {
        format!("{}-retreat", self.name)
    }

    /// Walk from the grasp configuration along `direction` for `distance`.
    ///
    /// Returns the accepted waypoints in stepping order, starting with the
    /// grasp configuration itself.
    fn translate(
        &self,
        plan: &ManipulationPlan,
        scene: &dyn PlanningScene,
        direction: Vector3<f64>,
        distance: f64,
    ) -> Result<Vec<RobotState>, ErrorCode> {
        let group = plan.planning_group();
        if !(distance.is_finite() && distance > 0.0) {
            return Err(ErrorCode::Failure);
        }

        let start = plan.approach_state.clone();
        if scene.is_state_colliding(&start, group, &self.collision_matrix) {
            return Err(ErrorCode::StartStateInCollision);
        }

        let steps = ((distance / self.settings.max_step) - Self::DISTANCE_EPSILON)
            .ceil()
            .max(1.0);
        let nominal_step = distance / steps;

        let mut waypoints = vec![start.clone()];
        let mut seed = start;
        let mut progress = 0.0;
        let mut increment = nominal_step;
        let mut consecutive_failures = 0u32;
        let mut accepted = 0u32;

        while progress < distance - Self::DISTANCE_EPSILON {
            if self.is_stopped() {
                return Err(ErrorCode::Preempted);
            }
            if plan.remaining_time().is_zero() {
                return Err(ErrorCode::TimedOut);
            }

            let target = (progress + increment).min(distance);
            let pose = Translation3::from(direction * target) * plan.goal_pose;
            let outcome = match self.kinematics.solve(group, &pose, &seed) {
                None => Err(ErrorCode::NoIkSolution),
                Some(state) if scene.is_state_colliding(&state, group, &self.collision_matrix) => {
                    Err(ErrorCode::GoalInCollision)
                }
                Some(state) => Ok(state),
            };

            match outcome {
                Ok(state) => {
                    trace!(plan_id = %plan.id(), progress = target, "Interpolation step accepted");
                    waypoints.push(state.clone());
                    seed = state;
                    progress = target;
                    increment = nominal_step;
                    consecutive_failures = 0;
                    accepted += 1;
                    if self.settings.termination == ApproachTermination::GoalCount
                        && accepted >= self.settings.max_goal_count
                    {
                        break;
                    }
                }
                Err(code) => {
                    consecutive_failures += 1;
                    trace!(
                        plan_id = %plan.id(),
                        progress = target,
                        consecutive_failures,
                        error_code = %code,
                        "Interpolation step failed"
                    );
                    if consecutive_failures >= self.settings.max_fail {
                        return Err(code);
                    }
                    increment *= 0.5;
                }
            }
        }

        Ok(waypoints)
    }

    fn approach_waypoints(
        &self,
        plan: &ManipulationPlan,
        approach: &GripperTranslation,
    ) -> Result<Vec<RobotState>, ErrorCode> {
        // Step backward out of the grasp, then flip into execution order
        let mut waypoints = self.translate(
            plan,
            self.pre_grasp_scene.as_ref(),
            -approach.direction.into_inner(),
            approach.distance,
        )?;
        waypoints.reverse();
        Ok(waypoints)
    }
}

impl ManipulationStage for ApproachAndTranslateStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    fn evaluate(&self, plan: &mut ManipulationPlan) -> bool {
        if self.is_stopped() {
            plan.error_code = ErrorCode::Preempted;
            return false;
        }
        let Some(approach) = plan.approach.clone() else {
            debug!(plan_id = %plan.id(), stage = %self.name, "Plan carries no approach motion");
            plan.error_code = ErrorCode::Failure;
            return false;
        };

        let approach_waypoints = match self.approach_waypoints(plan, &approach) {
            Ok(waypoints) => waypoints,
            Err(code) => {
                debug!(plan_id = %plan.id(), stage = %self.name, error_code = %code, "Approach rejected");
                plan.error_code = code;
                return false;
            }
        };

        let retreat_waypoints = match plan.retreat.clone() {
            Some(retreat) => match self.translate(
                plan,
                self.post_grasp_scene.as_ref(),
                retreat.direction.into_inner(),
                retreat.distance,
            ) {
                Ok(waypoints) => Some(waypoints),
                Err(code) => {
                    debug!(plan_id = %plan.id(), stage = %self.name, error_code = %code, "Retreat rejected");
                    plan.error_code = code;
                    return false;
                }
            },
            None => None,
        };

        let group = plan.planning_group().to_string();
        let Some(approach_trajectory) = self.time_param.compute(&group, &approach_waypoints) else {
            plan.error_code = ErrorCode::InvalidMotionPlan;
            return false;
        };
        let retreat_trajectory = match retreat_waypoints {
            Some(waypoints) => match self.time_param.compute(&group, &waypoints) {
                Some(trajectory) => Some(trajectory),
                None => {
                    plan.error_code = ErrorCode::InvalidMotionPlan;
                    return false;
                }
            },
            None => None,
        };

        debug!(
            plan_id = %plan.id(),
            stage = %self.name,
            approach_waypoints = approach_trajectory.len(),
            retreat = retreat_trajectory.is_some(),
            "Cartesian segments accepted"
        );

        if let Some(retreat_trajectory) = retreat_trajectory {
            plan.prepend_trajectory(retreat_trajectory, self.retreat_name());
        }
        let pre_grasp = approach_waypoints[0].clone();
        plan.prepend_trajectory(approach_trajectory, self.name.clone());
        plan.approach_state = pre_grasp.clone();
        plan.trajectory_start = Some(pre_grasp);
        plan.error_code = ErrorCode::Success;
        true
    }
}
