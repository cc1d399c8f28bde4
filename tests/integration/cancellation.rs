//! Integration tests for pipeline cancellation
//!
//! Tests cover:
//! - Idempotent signal_stop/stop, including before start
//! - Preemption of in-flight planner calls on stop
//! - Pending plans surviving a stop
//! - Restarting after a bare signal_stop

use crate::integration::test_utils::{blank_plan, CountingStage, FreeScene, ScriptedPlanner};
use pickplace::{ErrorCode, ManipulationPipeline, PipelineError, PlanStage};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn test_stop_before_start_is_harmless() {
    let pipeline = ManipulationPipeline::new("idle", 2);
    pipeline.add_stage(CountingStage::accepting("accept")).unwrap();

    pipeline.signal_stop();
    pipeline.signal_stop();
    pipeline.stop().unwrap();
    pipeline.stop().unwrap();
    assert!(!pipeline.is_running());

    // Stop flags raised above are cleared by start
    pipeline.start().unwrap();
    pipeline.push(blank_plan());
    pipeline.wait_for_completion(Some(Duration::from_secs(10))).unwrap();
    pipeline.stop().unwrap();
    assert_eq!(pipeline.successful_plans().len(), 1);
}

#[test]
fn test_repeated_stop_after_run() {
    let pipeline = ManipulationPipeline::new("twice", 3);
    pipeline.add_stage(CountingStage::accepting("accept")).unwrap();
    pipeline.start().unwrap();
    pipeline.stop().unwrap();
    pipeline.signal_stop();
    pipeline.stop().unwrap();
    assert!(!pipeline.is_running());
}

#[test]
fn test_stop_preempts_blocked_planning() {
    let planner = ScriptedPlanner::blocking();
    let pipeline = ManipulationPipeline::new("blocked", 2);
    pipeline
        .add_stage(Arc::new(PlanStage::new(Arc::new(FreeScene), planner.clone())))
        .unwrap();

    pipeline.start().unwrap();
    for _ in 0..4 {
        pipeline.push(blank_plan());
    }

    // Both workers hold a plan inside the planner
    let started = Instant::now();
    while planner.calls() < 2 && started.elapsed() < Duration::from_secs(5) {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(planner.calls(), 2);

    let stopping = Instant::now();
    pipeline.stop().unwrap();
    assert!(stopping.elapsed() < Duration::from_secs(2));
    assert!(planner.terminate_calls() >= 1);

    let failed = pipeline.failed_plans();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|plan| plan.error_code == ErrorCode::Preempted));
    assert!(pipeline.successful_plans().is_empty());

    let stats = pipeline.stats();
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.processing, 0);
    assert_eq!(pipeline.clear().len(), 2);
}

#[test]
fn test_wait_for_completion_times_out_while_blocked() {
    let planner = ScriptedPlanner::blocking();
    let pipeline = ManipulationPipeline::new("slow", 1);
    pipeline
        .add_stage(Arc::new(PlanStage::new(Arc::new(FreeScene), planner)))
        .unwrap();
    pipeline.start().unwrap();
    pipeline.push(blank_plan());

    let waited = pipeline.wait_for_completion(Some(Duration::from_millis(50)));
    assert!(matches!(waited, Err(PipelineError::Timeout(_))));

    pipeline.stop().unwrap();
    pipeline.wait_for_completion(Some(Duration::from_secs(1))).unwrap();
}

#[test]
fn test_start_after_signal_stop_is_refused_until_stopped() {
    let stage = CountingStage::accepting("accept");
    let pipeline = ManipulationPipeline::new("restart", 2);
    pipeline.add_stage(stage.clone()).unwrap();
    pipeline.start().unwrap();

    pipeline.signal_stop();
    pipeline.push(blank_plan());
    match pipeline.start() {
        Err(PipelineError::StopPending(name)) => assert_eq!(name, "restart"),
        other => panic!("expected pending stop, got {:?}", other),
    }
    assert_eq!(pipeline.stats().pending, 1);
    assert_eq!(stage.calls(), 0);

    pipeline.stop().unwrap();
    pipeline.start().unwrap();
    pipeline.wait_for_completion(Some(Duration::from_secs(10))).unwrap();
    pipeline.stop().unwrap();
    assert_eq!(pipeline.successful_plans().len(), 1);
    assert_eq!(stage.calls(), 1);
}
