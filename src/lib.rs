//! Pickplace: Concurrent Manipulation Plan Evaluation
//!
//! Turns grasp and place candidates into verified, collision-free,
//! time-parameterized trajectories by driving them through an ordered chain of
//! evaluation stages on a fixed pool of worker threads.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod plan;
pub mod robot;
pub mod services;
pub mod sim;
pub mod stage;
pub mod time_param;

pub use error::{ErrorCode, PipelineError};
pub use pipeline::{ManipulationPipeline, PipelineStats, SolutionCallback};
pub use plan::{GripperTranslation, ManipulationPlan, PlanId};
pub use stage::{ApproachAndTranslateStage, ManipulationStage, PlanStage, StopSignal};
