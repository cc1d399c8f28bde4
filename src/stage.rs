//! Manipulation stages
//!
//! A stage is one pass/fail evaluation step over a [`ManipulationPlan`]. Stage
//! instances are shared read-only across worker threads; the only mutable
//! state they carry is a [`StopSignal`].

use crate::plan::ManipulationPlan;
use std::sync::atomic::{AtomicBool, Ordering};

pub mod approach;
pub mod plan_stage;

pub use approach::{ApproachAndTranslateStage, ApproachSettings, ApproachTermination};
pub use plan_stage::PlanStage;

/// Cooperative cancellation flag polled by stages
#[derive(Debug, Default)]
pub struct StopSignal {
    raised: AtomicBool,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.raised.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

/// Uniform evaluation unit of the pipeline
///
/// `evaluate` must never panic for expected infeasibility: it returns `false`
/// and leaves an explanatory [`ErrorCode`](crate::error::ErrorCode) on the
/// plan instead.
pub trait ManipulationStage: Send + Sync {
    /// Label copied into `trajectory_descriptions`
    fn name(&self) -> &str;

    fn stop_signal(&self) -> &StopSignal;

    /// Examine and mutate `plan`; true iff it stays viable
    fn evaluate(&self, plan: &mut ManipulationPlan) -> bool;

    /// Ask in-flight and future evaluations to finish early. Idempotent.
    fn signal_stop(&self) {
        self.stop_signal().raise();
    }

    /// Clear a previous stop request so the stage can be reused
    fn reset_stop(&self) {
        self.stop_signal().clear();
    }

    fn is_stopped(&self) -> bool {
        self.stop_signal().is_raised()
    }
}
