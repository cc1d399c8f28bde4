//! Integration tests for ManipulationPipeline
//!
//! Tests cover:
//! - Stage chain order and fail-fast evaluation
//! - Retirement into exactly one result set
//! - Solution callback invocation
//! - Worker faults

use crate::integration::test_utils::{blank_plan, CountingStage, PanickingStage};
use pickplace::{ErrorCode, ManipulationPipeline, PipelineError, PlanId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Option<Duration> = Some(Duration::from_secs(10));

#[test]
fn test_rejecting_stage_fails_every_plan() {
    let pipeline = ManipulationPipeline::new("accept-reject", 4);
    let accept = CountingStage::accepting("alwaysAccept");
    let reject = CountingStage::rejecting("alwaysReject", ErrorCode::PlanningFailed);
    pipeline.add_stage(accept.clone()).unwrap();
    pipeline.add_stage(reject.clone()).unwrap();

    let solutions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&solutions);
    pipeline.set_solution_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    pipeline.start().unwrap();
    for _ in 0..10 {
        pipeline.push(blank_plan());
    }
    pipeline.wait_for_completion(WAIT).unwrap();
    pipeline.stop().unwrap();

    assert!(pipeline.successful_plans().is_empty());
    let failed = pipeline.failed_plans();
    assert_eq!(failed.len(), 10);
    assert!(failed.iter().all(|plan| plan.error_code == ErrorCode::PlanningFailed));
    assert_eq!(solutions.load(Ordering::SeqCst), 0);
    assert_eq!(accept.calls(), 10);
    assert_eq!(reject.calls(), 10);
}

#[test]
fn test_rejection_short_circuits_later_stages() {
    let pipeline = ManipulationPipeline::new("fail-fast", 2);
    let first = CountingStage::accepting("first");
    let gate = CountingStage::rejecting("gate", ErrorCode::NoIkSolution);
    let never = CountingStage::accepting("never");
    pipeline.add_stage(first.clone()).unwrap();
    pipeline.add_stage(gate.clone()).unwrap();
    pipeline.add_stage(never.clone()).unwrap();

    pipeline.start().unwrap();
    for _ in 0..6 {
        pipeline.push(blank_plan());
    }
    pipeline.wait_for_completion(WAIT).unwrap();
    pipeline.stop().unwrap();

    assert_eq!(first.calls(), 6);
    assert_eq!(gate.calls(), 6);
    assert_eq!(never.calls(), 0);
    assert!(pipeline
        .failed_plans()
        .iter()
        .all(|plan| plan.error_code == ErrorCode::NoIkSolution));
}

#[test]
fn test_segments_read_in_reverse_stage_order() {
    let pipeline = ManipulationPipeline::new("order", 3);
    for name in ["s1", "s2", "s3"] {
        pipeline.add_stage(CountingStage::segment(name)).unwrap();
    }

    pipeline.start().unwrap();
    for _ in 0..5 {
        pipeline.push(blank_plan());
    }
    pipeline.wait_for_completion(WAIT).unwrap();
    pipeline.stop().unwrap();

    let succeeded = pipeline.successful_plans();
    assert_eq!(succeeded.len(), 5);
    for plan in succeeded {
        let labels: Vec<&str> = plan.trajectory_descriptions.iter().map(String::as_str).collect();
        assert_eq!(labels, vec!["s3", "s2", "s1"]);
        assert_eq!(plan.trajectories.len(), 3);
        assert_eq!(plan.error_code, ErrorCode::Success);
    }
}

#[test]
fn test_every_plan_lands_in_exactly_one_set() {
    let pipeline = ManipulationPipeline::new("owners", 4);
    let accept = CountingStage::accepting("accept");
    pipeline.add_stage(accept).unwrap();

    let solutions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&solutions);
    pipeline.set_solution_callback(move |plan| {
        assert_eq!(plan.error_code, ErrorCode::Success);
        counter.fetch_add(1, Ordering::SeqCst);
    });

    pipeline.start().unwrap();
    let pushed: HashSet<PlanId> = (0..40).map(|_| pipeline.push(blank_plan())).collect();
    pipeline.wait_for_completion(WAIT).unwrap();
    pipeline.stop().unwrap();

    let succeeded: HashSet<PlanId> = pipeline.successful_plans().iter().map(|p| p.id()).collect();
    let failed: HashSet<PlanId> = pipeline.failed_plans().iter().map(|p| p.id()).collect();

    assert!(succeeded.is_disjoint(&failed));
    let retired: HashSet<PlanId> = succeeded.union(&failed).copied().collect();
    assert_eq!(retired, pushed);
    assert_eq!(solutions.load(Ordering::SeqCst), succeeded.len());

    let stats = pipeline.stats();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.processing, 0);
    assert_eq!(stats.succeeded + stats.failed, 40);
}

#[test]
fn test_restart_after_stop_processes_new_plans() {
    let pipeline = ManipulationPipeline::new("restart", 2);
    pipeline.add_stage(CountingStage::accepting("accept")).unwrap();

    pipeline.start().unwrap();
    pipeline.push(blank_plan());
    pipeline.wait_for_completion(WAIT).unwrap();
    pipeline.stop().unwrap();

    pipeline.start().unwrap();
    pipeline.push(blank_plan());
    pipeline.wait_for_completion(WAIT).unwrap();
    pipeline.stop().unwrap();

    assert_eq!(pipeline.successful_plans().len(), 2);
}

#[test]
fn test_panicking_stage_faults_worker() {
    let pipeline = ManipulationPipeline::new("faulty", 1);
    pipeline.add_stage(PanickingStage::new()).unwrap();

    pipeline.start().unwrap();
    let id = pipeline.push(blank_plan());
    match pipeline.wait_for_completion(WAIT) {
        Err(PipelineError::WorkerFaulted { count, .. }) => assert_eq!(count, 1),
        other => panic!("expected worker fault from wait, got {:?}", other),
    }

    match pipeline.stop() {
        Err(PipelineError::WorkerFaulted { count, .. }) => assert_eq!(count, 1),
        other => panic!("expected worker fault, got {:?}", other),
    }

    let failed = pipeline.failed_plans();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id(), id);
    assert_eq!(failed[0].error_code, ErrorCode::Failure);
    assert!(pipeline.successful_plans().is_empty());

    // The fault is reported once
    pipeline.stop().unwrap();
}

#[test]
fn test_last_worker_fault_releases_waiters() {
    let pipeline = ManipulationPipeline::new("stranded", 1);
    pipeline.add_stage(PanickingStage::new()).unwrap();

    let first = pipeline.push(blank_plan());
    let second = pipeline.push(blank_plan());
    pipeline.start().unwrap();

    // The only worker dies on the first plan; waiting must not hang
    match pipeline.wait_for_completion(None) {
        Err(PipelineError::WorkerFaulted { count, .. }) => assert_eq!(count, 1),
        other => panic!("expected worker fault from wait, got {:?}", other),
    }

    let failed = pipeline.failed_plans();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id(), first);
    let stats = pipeline.stats();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.processing, 0);

    // Dead workers must be joined before the pipeline can run again
    assert!(matches!(pipeline.start(), Err(PipelineError::StopPending(_))));
    assert!(matches!(pipeline.stop(), Err(PipelineError::WorkerFaulted { count: 1, .. })));

    let stranded = pipeline.clear();
    assert_eq!(stranded.len(), 1);
    assert_eq!(stranded[0].id(), second);
}
