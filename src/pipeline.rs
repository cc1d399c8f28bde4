//! Manipulation Pipeline
//!
//! Owns an ordered stage chain, a fixed pool of worker threads, a pending-plan
//! queue and the success/failure result sets. Every worker runs the same loop:
//! pop one plan, push it through the stages in chain order, retire it.
//!
//! Lock scopes:
//! - the queue lock guards pending plans, the in-flight count and the halt
//!   flag, and pairs with the `available`/`idle` condition variables;
//! - the result lock guards the two result sets only.
//!
//! The two are never held at the same time.

use crate::config::PipelineSettings;
use crate::error::{ErrorCode, PipelineError};
use crate::plan::{ManipulationPlan, PlanId};
use crate::stage::ManipulationStage;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Invoked on a worker thread each time a plan clears every stage
pub type SolutionCallback = Arc<dyn Fn(&ManipulationPlan) + Send + Sync>;

type StageChain = Arc<[Arc<dyn ManipulationStage>]>;

/// Pipeline statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Plans waiting in the queue
    pub pending: usize,
    /// Plans currently held by a worker
    pub processing: usize,
    /// Plans retired to the success set
    pub succeeded: usize,
    /// Plans retired to the failure set
    pub failed: usize,
}

struct QueueState {
    pending: VecDeque<ManipulationPlan>,
    processing: usize,
    halted: bool,
}

/// Pending plans plus the bookkeeping workers and waiters block on
struct WorkQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    idle: Condvar,
}

impl WorkQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                processing: 0,
                halted: true,
            }),
            available: Condvar::new(),
            idle: Condvar::new(),
        }
    }

    fn push(&self, plan: ManipulationPlan) -> usize {
        let mut state = self.state.lock();
        state.pending.push_back(plan);
        let queued = state.pending.len();
        drop(state);
        self.available.notify_one();
        queued
    }

    /// Block until a plan is available or the queue is halted
    fn pop(&self) -> Option<ManipulationPlan> {
        let mut state = self.state.lock();
        loop {
            if state.halted {
                return None;
            }
            if let Some(plan) = state.pending.pop_front() {
                state.processing += 1;
                return Some(plan);
            }
            self.available.wait(&mut state);
        }
    }

    /// Mark one in-flight plan as retired
    fn finish_one(&self) {
        let mut state = self.state.lock();
        state.processing = state.processing.saturating_sub(1);
        if Self::is_settled(&state) {
            self.idle.notify_all();
        }
    }

    fn is_settled(state: &QueueState) -> bool {
        state.processing == 0 && (state.pending.is_empty() || state.halted)
    }

    fn drain(&self) -> Vec<ManipulationPlan> {
        let mut state = self.state.lock();
        let drained: Vec<_> = state.pending.drain(..).collect();
        if Self::is_settled(&state) {
            self.idle.notify_all();
        }
        drained
    }

    fn halt(&self) {
        self.state.lock().halted = true;
        self.available.notify_all();
        self.idle.notify_all();
    }

    fn resume(&self) {
        self.state.lock().halted = false;
    }

    fn is_halted(&self) -> bool {
        self.state.lock().halted
    }

    /// Wait until nothing is pending or in flight. False on timeout.
    fn wait_idle(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        while !Self::is_settled(&state) {
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.idle.wait_for(&mut state, deadline - now);
                }
                None => self.idle.wait(&mut state),
            }
        }
        true
    }

    fn counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.pending.len(), state.processing)
    }
}

#[derive(Default)]
struct ResultSets {
    succeeded: Vec<Arc<ManipulationPlan>>,
    failed: Vec<Arc<ManipulationPlan>>,
}

/// Fault counters shared between a pipeline and its workers
struct FaultTracker {
    faulted: Arc<AtomicUsize>,
    live_workers: Arc<AtomicUsize>,
}

impl FaultTracker {
    /// Count a fault-terminated worker. True if it was the last one alive.
    fn record(&self) -> bool {
        self.faulted.fetch_add(1, Ordering::SeqCst);
        self.live_workers.fetch_sub(1, Ordering::SeqCst) == 1
    }
}

enum PlanOutcome {
    Succeeded,
    Rejected,
    /// A stage panicked while evaluating the plan
    Faulted,
}

/// Concurrent stage-chain evaluator for manipulation plans
pub struct ManipulationPipeline {
    name: String,
    worker_count: usize,
    stages: RwLock<Vec<Arc<dyn ManipulationStage>>>,
    queue: Arc<WorkQueue>,
    results: Arc<Mutex<ResultSets>>,
    solution_callback: Arc<RwLock<Option<SolutionCallback>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    running: RwLock<bool>,
    faulted: Arc<AtomicUsize>,
    live_workers: Arc<AtomicUsize>,
}

impl ManipulationPipeline {
    pub fn new(name: impl Into<String>, worker_count: usize) -> Self {
        Self {
            name: name.into(),
            worker_count,
            stages: RwLock::new(Vec::new()),
            queue: Arc::new(WorkQueue::new()),
            results: Arc::new(Mutex::new(ResultSets::default())),
            solution_callback: Arc::new(RwLock::new(None)),
            workers: Mutex::new(Vec::new()),
            running: RwLock::new(false),
            faulted: Arc::new(AtomicUsize::new(0)),
            live_workers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(settings.name.clone(), settings.worker_count)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Append a stage to the chain
    pub fn add_stage(&self, stage: Arc<dyn ManipulationStage>) -> Result<(), PipelineError> {
        let running = self.running.read();
        if *running {
            return Err(PipelineError::ChainLocked(self.name.clone()));
        }
        debug!(pipeline = %self.name, stage = stage.name(), "Added stage");
        self.stages.write().push(stage);
        Ok(())
    }

    pub fn first_stage(&self) -> Option<Arc<dyn ManipulationStage>> {
        self.stages.read().first().cloned()
    }

    pub fn last_stage(&self) -> Option<Arc<dyn ManipulationStage>> {
        self.stages.read().last().cloned()
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages
            .read()
            .iter()
            .map(|stage| stage.name().to_string())
            .collect()
    }

    pub fn set_solution_callback<F>(&self, callback: F)
    where
        F: Fn(&ManipulationPlan) + Send + Sync + 'static,
    {
        *self.solution_callback.write() = Some(Arc::new(callback));
    }

    /// Enqueue a plan and wake one waiting worker
    pub fn push(&self, plan: ManipulationPlan) -> PlanId {
        let plan_id = plan.id();
        let queue_size = self.queue.push(plan);
        debug!(pipeline = %self.name, plan_id = %plan_id, queue_size, "Enqueued plan");
        plan_id
    }

    /// Remove every pending plan and hand them back to the caller.
    ///
    /// Plans already held by a worker or retired are not affected.
    pub fn clear(&self) -> Vec<ManipulationPlan> {
        let drained = self.queue.drain();
        debug!(pipeline = %self.name, cleared = drained.len(), "Cleared pending plans");
        drained
    }

    /// Drop the stage chain, pending plans and results
    pub fn reset(&self) -> Result<(), PipelineError> {
        let running = self.running.read();
        if *running {
            return Err(PipelineError::NotStopped(self.name.clone()));
        }
        self.stages.write().clear();
        self.queue.drain();
        *self.results.lock() = ResultSets::default();
        self.faulted.store(0, Ordering::SeqCst);
        debug!(pipeline = %self.name, "Pipeline reset");
        Ok(())
    }

    pub fn successful_plans(&self) -> Vec<Arc<ManipulationPlan>> {
        self.results.lock().succeeded.clone()
    }

    pub fn failed_plans(&self) -> Vec<Arc<ManipulationPlan>> {
        self.results.lock().failed.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        let (pending, processing) = self.queue.counts();
        let results = self.results.lock();
        PipelineStats {
            pending,
            processing,
            succeeded: results.succeeded.len(),
            failed: results.failed.len(),
        }
    }

    /// Start the worker threads.
    ///
    /// A no-op while running, unless the pipeline was signalled to stop or
    /// every worker faulted; `stop` must join the old workers first.
    pub fn start(&self) -> Result<(), PipelineError> {
        let mut running = self.running.write();
        if *running {
            if self.queue.is_halted() {
                return Err(PipelineError::StopPending(self.name.clone()));
            }
            return Ok(());
        }
        if self.worker_count == 0 {
            return Err(PipelineError::NoWorkers);
        }
        let stages: StageChain = self.stages.read().iter().cloned().collect();
        if stages.is_empty() {
            return Err(PipelineError::EmptyStageChain(self.name.clone()));
        }

        for stage in stages.iter() {
            stage.reset_stop();
        }
        self.faulted.store(0, Ordering::SeqCst);
        self.live_workers.store(self.worker_count, Ordering::SeqCst);
        self.queue.resume();
        *running = true;
        drop(running);

        let mut workers = self.workers.lock();
        for worker_id in 0..self.worker_count {
            let stages = Arc::clone(&stages);
            let queue = Arc::clone(&self.queue);
            let results = Arc::clone(&self.results);
            let callback = Arc::clone(&self.solution_callback);
            let faults = FaultTracker {
                faulted: Arc::clone(&self.faulted),
                live_workers: Arc::clone(&self.live_workers),
            };
            let pipeline = self.name.clone();

            let spawned = std::thread::Builder::new()
                .name(format!("{}-worker-{}", self.name, worker_id))
                .spawn(move || {
                    Self::worker_loop(worker_id, pipeline, stages, queue, results, callback, faults)
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    error!(pipeline = %self.name, worker_id, error = %e, "Failed to spawn worker");
                    drop(workers);
                    let _ = self.stop();
                    return Err(PipelineError::ThreadSpawn(e));
                }
            }
        }

        info!(
            pipeline = %self.name,
            worker_count = workers.len(),
            stages = stages.len(),
            "Started manipulation pipeline workers"
        );
        Ok(())
    }

    /// Ask stages and workers to stop without waiting for them
    pub fn signal_stop(&self) {
        self.queue.halt();
        for stage in self.stages.read().iter() {
            stage.signal_stop();
        }
    }

    /// Stop and join the worker threads. Pending plans stay queued.
    pub fn stop(&self) -> Result<(), PipelineError> {
        self.signal_stop();

        let workers = std::mem::take(&mut *self.workers.lock());
        let mut panicked = 0;
        for handle in workers {
            if handle.join().is_err() {
                panicked += 1;
            }
        }

        let was_running = std::mem::replace(&mut *self.running.write(), false);
        if was_running {
            info!(pipeline = %self.name, "Stopped manipulation pipeline workers");
        }

        let count = self.faulted.swap(0, Ordering::SeqCst) + panicked;
        if count > 0 {
            return Err(PipelineError::WorkerFaulted {
                pipeline: self.name.clone(),
                count,
            });
        }
        Ok(())
    }

    /// Block until the queue is empty and no plan is in flight.
    ///
    /// Returns early once every worker has faulted, leaving the remaining
    /// plans queued. Faults are reported here without being cleared; `stop`
    /// reports them again and clears them.
    pub fn wait_for_completion(&self, timeout: Option<Duration>) -> Result<(), PipelineError> {
        if !self.queue.wait_idle(timeout) {
            return Err(PipelineError::Timeout(self.name.clone()));
        }
        match self.faulted.load(Ordering::SeqCst) {
            0 => Ok(()),
            count => Err(PipelineError::WorkerFaulted {
                pipeline: self.name.clone(),
                count,
            }),
        }
    }

    fn worker_loop(
        worker_id: usize,
        pipeline: String,
        stages: StageChain,
        queue: Arc<WorkQueue>,
        results: Arc<Mutex<ResultSets>>,
        callback: Arc<RwLock<Option<SolutionCallback>>>,
        faults: FaultTracker,
    ) {
        debug!(worker_id, pipeline = %pipeline, "Worker started");

        while let Some(mut plan) = queue.pop() {
            let started = Instant::now();
            let plan_id = plan.id();
            let outcome = Self::evaluate_plan(worker_id, &stages, &mut plan);

            let fault = match outcome {
                PlanOutcome::Succeeded => {
                    let plan = Arc::new(plan);
                    results.lock().succeeded.push(Arc::clone(&plan));
                    debug!(
                        worker_id,
                        plan_id = %plan_id,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Plan cleared every stage"
                    );
                    let solution = callback.read().clone();
                    match solution {
                        Some(solution) => {
                            let panicked =
                                catch_unwind(AssertUnwindSafe(|| solution(plan.as_ref()))).is_err();
                            if panicked {
                                error!(worker_id, plan_id = %plan_id, "Solution callback panicked");
                            }
                            panicked
                        }
                        None => false,
                    }
                }
                PlanOutcome::Rejected => {
                    debug!(
                        worker_id,
                        plan_id = %plan_id,
                        error_code = %plan.error_code,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Plan rejected"
                    );
                    results.lock().failed.push(Arc::new(plan));
                    false
                }
                PlanOutcome::Faulted => {
                    plan.error_code = ErrorCode::Failure;
                    results.lock().failed.push(Arc::new(plan));
                    true
                }
            };
            // Counted before retiring so a woken waiter sees the fault
            let last_alive = fault && faults.record();
            queue.finish_one();

            if fault {
                error!(worker_id, pipeline = %pipeline, "Worker terminating after fault");
                if last_alive {
                    error!(pipeline = %pipeline, "Every worker faulted; halting queue");
                    queue.halt();
                }
                break;
            }
        }

        debug!(worker_id, pipeline = %pipeline, "Worker stopped");
    }

    /// Run `plan` through the chain, stopping at the first rejection
    fn evaluate_plan(
        worker_id: usize,
        stages: &[Arc<dyn ManipulationStage>],
        plan: &mut ManipulationPlan,
    ) -> PlanOutcome {
        for stage in stages {
            match catch_unwind(AssertUnwindSafe(|| stage.evaluate(plan))) {
                Ok(true) => {}
                Ok(false) => {
                    if plan.error_code == ErrorCode::Preempted {
                        warn!(worker_id, plan_id = %plan.id(), stage = stage.name(), "Evaluation preempted");
                    }
                    return PlanOutcome::Rejected;
                }
                Err(_) => {
                    error!(
                        worker_id,
                        plan_id = %plan.id(),
                        stage = stage.name(),
                        "Stage panicked during evaluation"
                    );
                    return PlanOutcome::Faulted;
                }
            }
        }
        PlanOutcome::Succeeded
    }
}

impl Drop for ManipulationPipeline {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(pipeline = %self.name, error = %e, "Pipeline stopped with errors");
        }
    }
}
