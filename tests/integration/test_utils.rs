//! Shared test utilities for integration tests
//!
//! Stub stages and services with call counters, so tests can assert on how
//! often the pipeline and stages reach into them.

use nalgebra::{Isometry3, Vector3};
use pickplace::robot::{AllowedCollisionMatrix, RobotState, RobotTrajectory, TrajectoryPoint};
use pickplace::services::{
    KinematicsSolver, MotionPlanRequest, MotionPlanResponse, MotionPlanner, PlanningScene,
};
use pickplace::sim::{self, GantryKinematics};
use pickplace::{ErrorCode, ManipulationPlan, ManipulationStage, StopSignal};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::{Duration, Instant};

/// Stage with a fixed verdict that counts its evaluations
pub struct CountingStage {
    name: String,
    accept: bool,
    reject_code: ErrorCode,
    prepend_segment: bool,
    calls: AtomicUsize,
    stop: StopSignal,
}

impl CountingStage {
    pub fn accepting(name: &str) -> Arc<Self> {
        Arc::new(Self::build(name, true, ErrorCode::Success, false))
    }

    pub fn rejecting(name: &str, code: ErrorCode) -> Arc<Self> {
        Arc::new(Self::build(name, false, code, false))
    }

    /// Accepts and prepends an empty segment labeled with its name
    pub fn segment(name: &str) -> Arc<Self> {
        Arc::new(Self::build(name, true, ErrorCode::Success, true))
    }

    fn build(name: &str, accept: bool, reject_code: ErrorCode, prepend_segment: bool) -> Self {
        Self {
            name: name.to_string(),
            accept,
            reject_code,
            prepend_segment,
            calls: AtomicUsize::new(0),
            stop: StopSignal::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ManipulationStage for CountingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    fn evaluate(&self, plan: &mut ManipulationPlan) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.accept {
            plan.error_code = self.reject_code;
            return false;
        }
        if self.prepend_segment {
            let group = plan.planning_group().to_string();
            plan.prepend_trajectory(RobotTrajectory::new(group, Vec::new()), self.name.clone());
        }
        plan.error_code = ErrorCode::Success;
        true
    }
}

/// Stage that panics on every plan
pub struct PanickingStage {
    stop: StopSignal,
}

impl PanickingStage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            stop: StopSignal::new(),
        })
    }
}

impl ManipulationStage for PanickingStage {
    fn name(&self) -> &str {
        "panics"
    }

    fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    fn evaluate(&self, _plan: &mut ManipulationPlan) -> bool {
        panic!("stage fault");
    }
}

fn gantry_joints(group: &str) -> Option<Vec<String>> {
    (group == sim::GROUP).then(|| sim::JOINTS.iter().map(|j| j.to_string()).collect())
}

/// Scene with no obstacles
pub struct FreeScene;

impl PlanningScene for FreeScene {
    fn name(&self) -> &str {
        "free"
    }

    fn group_joints(&self, group: &str) -> Option<Vec<String>> {
        gantry_joints(group)
    }

    fn is_state_colliding(&self, _state: &RobotState, _group: &str, _acm: &AllowedCollisionMatrix) -> bool {
        false
    }
}

/// Scene colliding whenever the gantry tool rises above `max_z`
pub struct CeilingScene {
    pub max_z: f64,
}

impl PlanningScene for CeilingScene {
    fn name(&self) -> &str {
        "ceiling"
    }

    fn group_joints(&self, group: &str) -> Option<Vec<String>> {
        gantry_joints(group)
    }

    fn is_state_colliding(&self, state: &RobotState, _group: &str, _acm: &AllowedCollisionMatrix) -> bool {
        match sim::tool_position(state) {
            Some(tool) => tool.z > self.max_z,
            None => true,
        }
    }
}

/// Gantry IK that fails on the listed (1-based) calls
pub struct ScriptedKinematics {
    inner: GantryKinematics,
    fail_on: Vec<usize>,
    fail_always: bool,
    calls: AtomicUsize,
}

impl ScriptedKinematics {
    pub fn exact() -> Arc<Self> {
        Self::failing_on(Vec::new())
    }

    pub fn failing_on(fail_on: Vec<usize>) -> Arc<Self> {
        Arc::new(Self {
            inner: GantryKinematics::default(),
            fail_on,
            fail_always: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            inner: GantryKinematics::default(),
            fail_on: Vec::new(),
            fail_always: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KinematicsSolver for ScriptedKinematics {
    fn solve(&self, group: &str, pose: &Isometry3<f64>, seed: &RobotState) -> Option<RobotState> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_always || self.fail_on.contains(&call) {
            return None;
        }
        self.inner.solve(group, pose, seed)
    }
}

/// Gantry IK that raises stop on the attached stage during its `stop_on`-th call
pub struct StopOnCallKinematics {
    inner: GantryKinematics,
    stop_on: usize,
    stage: OnceLock<Weak<dyn ManipulationStage>>,
    calls: AtomicUsize,
}

impl StopOnCallKinematics {
    pub fn new(stop_on: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: GantryKinematics::default(),
            stop_on,
            stage: OnceLock::new(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn attach(&self, stage: &Arc<dyn ManipulationStage>) {
        let _ = self.stage.set(Arc::downgrade(stage));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KinematicsSolver for StopOnCallKinematics {
    fn solve(&self, group: &str, pose: &Isometry3<f64>, seed: &RobotState) -> Option<RobotState> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.stop_on {
            if let Some(stage) = self.stage.get().and_then(Weak::upgrade) {
                stage.signal_stop();
            }
        }
        self.inner.solve(group, pose, seed)
    }
}

/// Planner answering with a fixed code after optionally blocking until terminated
pub struct ScriptedPlanner {
    code: ErrorCode,
    block_until_terminated: bool,
    terminated: AtomicBool,
    calls: AtomicUsize,
    terminate_calls: AtomicUsize,
    last_request: Mutex<Option<MotionPlanRequest>>,
}

impl ScriptedPlanner {
    /// Upper bound on how long a blocking call waits for `terminate`
    const BLOCK_LIMIT: Duration = Duration::from_secs(5);

    pub fn answering(code: ErrorCode) -> Arc<Self> {
        Arc::new(Self::build(code, false))
    }

    pub fn blocking() -> Arc<Self> {
        Arc::new(Self::build(ErrorCode::Success, true))
    }

    fn build(code: ErrorCode, block_until_terminated: bool) -> Self {
        Self {
            code,
            block_until_terminated,
            terminated: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            terminate_calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn terminate_calls(&self) -> usize {
        self.terminate_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<MotionPlanRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

impl MotionPlanner for ScriptedPlanner {
    fn generate_plan(&self, _scene: &dyn PlanningScene, request: &MotionPlanRequest) -> MotionPlanResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        if self.block_until_terminated {
            let started = Instant::now();
            while !self.terminated.load(Ordering::SeqCst) && started.elapsed() < Self::BLOCK_LIMIT {
                std::thread::sleep(Duration::from_millis(1));
            }
            return MotionPlanResponse::failure(ErrorCode::Preempted);
        }
        if self.code != ErrorCode::Success {
            return MotionPlanResponse::failure(self.code);
        }

        let goal = RobotState::from_positions(
            request
                .goal_constraints
                .iter()
                .map(|c| (c.joint_name.clone(), c.position)),
        );
        let start = sim::state_at(&Vector3::new(0.0, 0.0, 1.0));
        let mut trajectory = RobotTrajectory::new(request.group_name.clone(), Vec::new());
        trajectory.joint_names = goal.joint_names().map(str::to_string).collect();
        for (time, state) in [(0.0, &start), (1.0, &goal)] {
            trajectory.points.push(TrajectoryPoint {
                positions: state.positions_for(&trajectory.joint_names).unwrap_or_default(),
                velocities: vec![0.0; 3],
                accelerations: vec![0.0; 3],
                time_from_start: time,
            });
        }
        MotionPlanResponse {
            error_code: ErrorCode::Success,
            trajectory: Some(trajectory),
            trajectory_start: None,
        }
    }

    fn terminate(&self) {
        self.terminate_calls.fetch_add(1, Ordering::SeqCst);
        self.terminated.store(true, Ordering::SeqCst);
    }

    fn reset_termination(&self) {
        self.terminated.store(false, Ordering::SeqCst);
    }
}

/// Gantry plan grasping at `position` with a generous deadline
pub fn gantry_plan(position: Vector3<f64>) -> ManipulationPlan {
    ManipulationPlan::new(
        sim::GROUP,
        sim::state_at(&position),
        Isometry3::translation(position.x, position.y, position.z),
        Instant::now() + Duration::from_secs(5),
    )
}

/// Plan that stubs do not inspect
pub fn blank_plan() -> ManipulationPlan {
    gantry_plan(Vector3::new(0.0, 0.0, 0.5))
}
