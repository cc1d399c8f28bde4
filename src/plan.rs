//! Manipulation plan: the mutable record threaded through the pipeline
//!
//! A plan is owned by exactly one party at a time: the producer, the pipeline
//! queue, the worker evaluating it, and finally one of the result sets. Stages
//! mutate it in place through `&mut`.

use crate::error::ErrorCode;
use crate::robot::{RobotState, RobotTrajectory};
use nalgebra::{Isometry3, Unit, Vector3};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Process-unique plan identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PlanId(u64);

impl PlanId {
    /// Generate the next plan ID
    pub fn next() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        PlanId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plan-{}", self.0)
    }
}

/// Straight-line gripper motion relative to the grasp pose
#[derive(Debug, Clone, PartialEq)]
pub struct GripperTranslation {
    /// Direction of travel in the planning frame
    pub direction: Unit<Vector3<f64>>,
    /// Distance to travel, in meters
    pub distance: f64,
}

impl GripperTranslation {
    pub fn new(direction: Vector3<f64>, distance: f64) -> Self {
        Self {
            direction: Unit::new_normalize(direction),
            distance,
        }
    }
}

/// One grasp or place candidate under evaluation
#[derive(Debug, Clone)]
pub struct ManipulationPlan {
    id: PlanId,
    planning_group: String,
    /// Absolute deadline for all remaining stage work
    pub timeout: Instant,
    /// Configuration stages plan toward or from
    pub approach_state: RobotState,
    /// End-effector pose matching the initial `approach_state`
    pub goal_pose: Isometry3<f64>,
    /// Motion into the grasp pose, ending at `goal_pose`
    pub approach: Option<GripperTranslation>,
    /// Motion out of the grasp pose, starting at `goal_pose`
    pub retreat: Option<GripperTranslation>,
    /// Segments in execution order
    pub trajectories: VecDeque<RobotTrajectory>,
    /// Labels parallel to `trajectories`
    pub trajectory_descriptions: VecDeque<String>,
    /// State at which the first segment begins
    pub trajectory_start: Option<RobotState>,
    pub error_code: ErrorCode,
}

impl ManipulationPlan {
    pub fn new(
        planning_group: impl Into<String>,
        approach_state: RobotState,
        goal_pose: Isometry3<f64>,
        timeout: Instant,
    ) -> Self {
        Self {
            id: PlanId::next(),
            planning_group: planning_group.into(),
            timeout,
            approach_state,
            goal_pose,
            approach: None,
            retreat: None,
            trajectories: VecDeque::new(),
            trajectory_descriptions: VecDeque::new(),
            trajectory_start: None,
            error_code: ErrorCode::default(),
        }
    }

    pub fn with_approach(mut self, approach: GripperTranslation) -> Self {
        self.approach = Some(approach);
        self
    }

    pub fn with_retreat(mut self, retreat: GripperTranslation) -> Self {
        self.retreat = Some(retreat);
        self
    }

    pub fn id(&self) -> PlanId {
        self.id
    }

    pub fn planning_group(&self) -> &str {
        &self.planning_group
    }

    /// Time left before the deadline; zero once it has passed
    pub fn remaining_time(&self) -> Duration {
        self.timeout.saturating_duration_since(Instant::now())
    }

    /// Prepend a segment so the list keeps reading in execution order
    pub fn prepend_trajectory(&mut self, trajectory: RobotTrajectory, description: impl Into<String>) {
        self.trajectories.push_front(trajectory);
        self.trajectory_descriptions.push_front(description.into());
    }

    /// Total duration of all segments, in seconds
    pub fn total_duration(&self) -> f64 {
        self.trajectories.iter().map(RobotTrajectory::duration).sum()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            id: self.id.as_u64(),
            planning_group: self.planning_group.clone(),
            error_code: self.error_code,
            segments: self.trajectory_descriptions.iter().cloned().collect(),
            waypoints: self.trajectories.iter().map(RobotTrajectory::len).sum(),
            duration_s: self.total_duration(),
        }
    }
}

/// Serializable digest of a retired plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub id: u64,
    pub planning_group: String,
    pub error_code: ErrorCode,
    pub segments: Vec<String>,
    pub waypoints: usize,
    pub duration_s: f64,
}
