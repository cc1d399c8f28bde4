//! Plan stage: full motion planning toward `approach_state` under the plan's deadline.

use crate::error::ErrorCode;
use crate::plan::ManipulationPlan;
use crate::services::{goal_constraints_from_state, MotionPlanRequest, MotionPlanner, PlanningScene};
use crate::stage::{ManipulationStage, StopSignal};
use std::sync::Arc;
use tracing::debug;

pub struct PlanStage {
    name: String,
    scene: Arc<dyn PlanningScene>,
    planner: Arc<dyn MotionPlanner>,
    num_planning_attempts: u32,
    goal_tolerance: f64,
    stop: StopSignal,
}

impl PlanStage {
    pub const DEFAULT_NAME: &'static str = "plan";

    pub fn new(scene: Arc<dyn PlanningScene>, planner: Arc<dyn MotionPlanner>) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            scene,
            planner,
            num_planning_attempts: 1,
            goal_tolerance: 1e-4,
            stop: StopSignal::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_planning_attempts(mut self, attempts: u32) -> Self {
        self.num_planning_attempts = attempts.max(1);
        self
    }

    pub fn with_goal_tolerance(mut self, tolerance: f64) -> Self {
        self.goal_tolerance = tolerance;
        self
    }
}

impl ManipulationStage for PlanStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    fn signal_stop(&self) {
        self.stop.raise();
        self.planner.terminate();
    }

    fn reset_stop(&self) {
        self.stop.clear();
        self.planner.reset_termination();
    }

    fn evaluate(&self, plan: &mut ManipulationPlan) -> bool {
        if self.is_stopped() {
            plan.error_code = ErrorCode::Preempted;
            return false;
        }

        let allowed_planning_time = plan.remaining_time();
        if allowed_planning_time.is_zero() {
            debug!(plan_id = %plan.id(), stage = %self.name, "Deadline passed before planning");
            plan.error_code = ErrorCode::TimedOut;
            return false;
        }

        let group = plan.planning_group().to_string();
        let Some(group_joints) = self.scene.group_joints(&group) else {
            debug!(plan_id = %plan.id(), stage = %self.name, group = %group, "Unknown planning group");
            plan.error_code = ErrorCode::InvalidGroupName;
            return false;
        };
        let Some(goal_constraints) =
            goal_constraints_from_state(&plan.approach_state, &group_joints, self.goal_tolerance)
        else {
            debug!(plan_id = %plan.id(), stage = %self.name, group = %group, "Approach state lacks group joints");
            plan.error_code = ErrorCode::InvalidGoalConstraints;
            return false;
        };

        let request = MotionPlanRequest {
            group_name: group,
            goal_constraints,
            allowed_planning_time,
            num_planning_attempts: self.num_planning_attempts,
        };
        let response = self.planner.generate_plan(self.scene.as_ref(), &request);

        // A raised flag means the planner was told to terminate mid-call
        if self.is_stopped() {
            plan.error_code = ErrorCode::Preempted;
            return false;
        }

        plan.error_code = response.error_code;
        match (response.error_code, response.trajectory) {
            (ErrorCode::Success, Some(trajectory)) => {
                debug!(
                    plan_id = %plan.id(),
                    stage = %self.name,
                    waypoints = trajectory.len(),
                    "Motion plan found"
                );
                plan.trajectory_start = response.trajectory_start.or_else(|| trajectory.first_state());
                plan.prepend_trajectory(trajectory, self.name.clone());
                true
            }
            (ErrorCode::Success, None) => {
                plan.error_code = ErrorCode::InvalidMotionPlan;
                false
            }
            (code, _) => {
                debug!(plan_id = %plan.id(), stage = %self.name, error_code = %code, "Motion planning failed");
                false
            }
        }
    }
}
