//! Cartesian gantry simulation
//!
//! Deterministic reference implementations of the service contracts in
//! [`crate::services`] for a three-axis gantry whose joint positions equal the
//! tool position. Inverse kinematics is exact inside the workspace, obstacles
//! are axis-aligned boxes and the "motion planner" is a straight joint-space
//! interpolation that honors deadlines and termination. Used by the CLI demo
//! and by tests.

use crate::error::ErrorCode;
use crate::plan::{GripperTranslation, ManipulationPlan};
use crate::robot::{AllowedCollisionMatrix, RobotState};
use crate::services::{
    KinematicsSolver, MotionPlanRequest, MotionPlanResponse, MotionPlanner, PlanningScene,
    TimeParameterization,
};
use crate::time_param::{IterativeParabolicTimeParameterization, JointLimits};
use nalgebra::{Isometry3, Point3, Vector3};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

pub const GROUP: &str = "gantry";
pub const JOINTS: [&str; 3] = ["gantry_x", "gantry_y", "gantry_z"];
pub const GRIPPER_LINK: &str = "gripper";

/// Joint state placing the tool at `position`
pub fn state_at(position: &Vector3<f64>) -> RobotState {
    RobotState::from_positions(JOINTS.iter().copied().zip(position.iter().copied()))
}

/// Tool position encoded by a gantry state
pub fn tool_position(state: &RobotState) -> Option<Point3<f64>> {
    Some(Point3::new(
        state.position(JOINTS[0])?,
        state.position(JOINTS[1])?,
        state.position(JOINTS[2])?,
    ))
}

/// Axis-aligned box obstacle
#[derive(Debug, Clone)]
pub struct BoxObstacle {
    pub name: String,
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl BoxObstacle {
    pub fn new(name: impl Into<String>, min: Point3<f64>, max: Point3<f64>) -> Self {
        Self {
            name: name.into(),
            min,
            max,
        }
    }

    fn distance_to(&self, point: &Point3<f64>) -> f64 {
        let clamped = Point3::new(
            point.x.clamp(self.min.x, self.max.x),
            point.y.clamp(self.min.y, self.max.y),
            point.z.clamp(self.min.z, self.max.z),
        );
        nalgebra::distance(point, &clamped)
    }
}

/// Scene snapshot: box obstacles and a spherical gripper
#[derive(Debug, Clone)]
pub struct GantryScene {
    name: String,
    obstacles: Vec<BoxObstacle>,
    gripper_radius: f64,
}

impl GantryScene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            obstacles: Vec::new(),
            gripper_radius: 0.02,
        }
    }

    pub fn with_obstacle(mut self, obstacle: BoxObstacle) -> Self {
        self.obstacles.push(obstacle);
        self
    }

    pub fn with_gripper_radius(mut self, radius: f64) -> Self {
        self.gripper_radius = radius;
        self
    }
}

impl PlanningScene for GantryScene {
    fn name(&self) -> &str {
        &self.name
    }

    fn group_joints(&self, group: &str) -> Option<Vec<String>> {
        (group == GROUP).then(|| JOINTS.iter().map(|joint| joint.to_string()).collect())
    }

    fn is_state_colliding(
        &self,
        state: &RobotState,
        _group: &str,
        acm: &AllowedCollisionMatrix,
    ) -> bool {
        let Some(tool) = tool_position(state) else {
            return true;
        };
        self.obstacles.iter().any(|obstacle| {
            obstacle.distance_to(&tool) < self.gripper_radius
                && !acm.is_allowed(GRIPPER_LINK, &obstacle.name)
        })
    }
}

/// Exact inverse kinematics inside a box-shaped workspace
#[derive(Debug, Clone)]
pub struct GantryKinematics {
    workspace_min: Point3<f64>,
    workspace_max: Point3<f64>,
}

impl GantryKinematics {
    pub fn new(workspace_min: Point3<f64>, workspace_max: Point3<f64>) -> Self {
        Self {
            workspace_min,
            workspace_max,
        }
    }
}

impl Default for GantryKinematics {
    fn default() -> Self {
        Self::new(Point3::new(-1.0, -1.0, 0.0), Point3::new(1.0, 1.0, 1.5))
    }
}

impl KinematicsSolver for GantryKinematics {
    fn solve(&self, group: &str, pose: &Isometry3<f64>, _seed: &RobotState) -> Option<RobotState> {
        if group != GROUP {
            return None;
        }
        let p = pose.translation.vector;
        let inside = (0..3).all(|i| p[i] >= self.workspace_min[i] && p[i] <= self.workspace_max[i]);
        inside.then(|| state_at(&p))
    }
}

/// Straight joint-space planner with cooperative termination
pub struct GantryPlanner {
    start_state: RobotState,
    time_param: IterativeParabolicTimeParameterization,
    max_joint_step: f64,
    planning_delay: Duration,
    terminated: AtomicBool,
}

impl GantryPlanner {
    const POLL_INTERVAL: Duration = Duration::from_millis(2);

    pub fn new(start_state: RobotState, limits: JointLimits) -> Self {
        Self {
            start_state,
            time_param: IterativeParabolicTimeParameterization::new(limits),
            max_joint_step: 0.05,
            planning_delay: Duration::ZERO,
            terminated: AtomicBool::new(false),
        }
    }

    /// Simulated compute time spent before answering
    pub fn with_planning_delay(mut self, delay: Duration) -> Self {
        self.planning_delay = delay;
        self
    }

    /// Wait out the simulated compute time; `Err` if interrupted first
    fn think(&self, deadline: Instant) -> Result<(), ErrorCode> {
        let done = Instant::now() + self.planning_delay;
        loop {
            if self.terminated.load(Ordering::SeqCst) {
                return Err(ErrorCode::Preempted);
            }
            let now = Instant::now();
            if now >= done {
                return Ok(());
            }
            if now >= deadline {
                return Err(ErrorCode::TimedOut);
            }
            std::thread::sleep(Self::POLL_INTERVAL.min(done - now));
        }
    }
}

impl MotionPlanner for GantryPlanner {
    fn generate_plan(
        &self,
        scene: &dyn PlanningScene,
        request: &MotionPlanRequest,
    ) -> MotionPlanResponse {
        if request.group_name != GROUP {
            return MotionPlanResponse::failure(ErrorCode::InvalidGroupName);
        }
        let deadline = Instant::now() + request.allowed_planning_time;
        if let Err(code) = self.think(deadline) {
            return MotionPlanResponse::failure(code);
        }

        let goal = RobotState::from_positions(
            request
                .goal_constraints
                .iter()
                .map(|c| (c.joint_name.clone(), c.position)),
        );
        let acm = AllowedCollisionMatrix::new();
        if scene.is_state_colliding(&goal, GROUP, &acm) {
            return MotionPlanResponse::failure(ErrorCode::GoalInCollision);
        }

        let (Some(from), Some(to)) = (tool_position(&self.start_state), tool_position(&goal)) else {
            return MotionPlanResponse::failure(ErrorCode::InvalidMotionPlan);
        };
        let span = self.start_state.max_joint_distance(&goal);
        let steps = (span / self.max_joint_step).ceil().max(1.0) as usize;
        let mut waypoints = Vec::with_capacity(steps + 1);
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let state = state_at(&from.coords.lerp(&to.coords, t));
            if scene.is_state_colliding(&state, GROUP, &acm) {
                debug!(step = i, "Straight-line path blocked");
                return MotionPlanResponse::failure(ErrorCode::PlanningFailed);
            }
            waypoints.push(state);
        }

        match self.time_param.compute(GROUP, &waypoints) {
            Some(trajectory) => MotionPlanResponse {
                error_code: ErrorCode::Success,
                trajectory: Some(trajectory),
                trajectory_start: Some(self.start_state.clone()),
            },
            None => MotionPlanResponse::failure(ErrorCode::InvalidMotionPlan),
        }
    }

    fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    fn reset_termination(&self) {
        self.terminated.store(false, Ordering::SeqCst);
    }
}

/// Top-down grasp candidates spread on a ring around `target`
pub fn grasp_candidates(
    target: Point3<f64>,
    count: usize,
    ring_radius: f64,
    approach_distance: f64,
    timeout: Duration,
) -> Vec<ManipulationPlan> {
    let deadline = Instant::now() + timeout;
    (0..count)
        .map(|i| {
            let angle = std::f64::consts::TAU * i as f64 / count.max(1) as f64;
            let offset = Vector3::new(ring_radius * angle.cos(), ring_radius * angle.sin(), 0.0);
            let grasp = target.coords + offset;
            ManipulationPlan::new(
                GROUP,
                state_at(&grasp),
                Isometry3::translation(grasp.x, grasp.y, grasp.z),
                deadline,
            )
            .with_approach(GripperTranslation::new(-Vector3::z(), approach_distance))
            .with_retreat(GripperTranslation::new(Vector3::z(), approach_distance))
        })
        .collect()
}
