//! Error types for the pick/place evaluation pipeline.
//!
//! Two families live here. [`ErrorCode`] is the per-plan status a stage writes
//! onto a [`ManipulationPlan`](crate::plan::ManipulationPlan); it describes
//! expected infeasibility and is never raised. [`PipelineError`] covers
//! invariant violations in how the pipeline itself is driven, and is returned
//! from control operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Status recorded on a plan by the last stage that touched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Success,
    /// Generic failure, also used before any stage has run
    #[default]
    Failure,
    PlanningFailed,
    InvalidMotionPlan,
    /// Deadline exhausted before the work could start or finish
    TimedOut,
    /// Cancelled through `signal_stop`
    Preempted,
    StartStateInCollision,
    GoalInCollision,
    /// Goal state does not cover every joint of the planning group
    InvalidGoalConstraints,
    NoIkSolution,
    InvalidGroupName,
}

impl ErrorCode {
    /// Stable numeric value, matching the motion planning status codes.
    pub fn value(self) -> i32 {
        match self {
            ErrorCode::Success => 1,
            ErrorCode::Failure => 99999,
            ErrorCode::PlanningFailed => -1,
            ErrorCode::InvalidMotionPlan => -2,
            ErrorCode::TimedOut => -6,
            ErrorCode::Preempted => -7,
            ErrorCode::StartStateInCollision => -10,
            ErrorCode::GoalInCollision => -12,
            ErrorCode::InvalidGoalConstraints => -13,
            ErrorCode::NoIkSolution => -31,
            ErrorCode::InvalidGroupName => -15,
        }
    }

    pub fn is_success(self) -> bool {
        self == ErrorCode::Success
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Success => "success",
            ErrorCode::Failure => "failure",
            ErrorCode::PlanningFailed => "planning_failed",
            ErrorCode::InvalidMotionPlan => "invalid_motion_plan",
            ErrorCode::TimedOut => "timed_out",
            ErrorCode::Preempted => "preempted",
            ErrorCode::StartStateInCollision => "start_state_in_collision",
            ErrorCode::GoalInCollision => "goal_in_collision",
            ErrorCode::InvalidGoalConstraints => "invalid_goal_constraints",
            ErrorCode::NoIkSolution => "no_ik_solution",
            ErrorCode::InvalidGroupName => "invalid_group_name",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.value())
    }
}

/// Errors raised when the pipeline is driven incorrectly
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline '{0}' has no stages configured")]
    EmptyStageChain(String),

    #[error("Stage chain of pipeline '{0}' is fixed while workers are running")]
    ChainLocked(String),

    #[error("Pipeline '{0}' must be stopped before it can be reset")]
    NotStopped(String),

    #[error("Worker count must be at least 1")]
    NoWorkers,

    #[error("Pipeline '{0}' was signalled to stop; call stop() before starting it again")]
    StopPending(String),

    #[error("Invalid settings for stage '{stage}': {reason}")]
    InvalidStageSettings { stage: String, reason: String },

    #[error("{count} worker(s) of pipeline '{pipeline}' terminated on a stage fault")]
    WorkerFaulted { pipeline: String, count: usize },

    #[error("Failed to spawn worker thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    #[error("Timeout waiting for pipeline '{0}' to drain")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::ConfigError(err.to_string())
    }
}
