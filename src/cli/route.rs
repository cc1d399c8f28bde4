//! CLI route: run context and command dispatch.

use crate::cli::parse::{Commands, OutputFormat};
use crate::cli::presentation::{format_run_json, format_run_text, RunReport};
use crate::config::{ConfigLoader, PickPlaceConfig};
use crate::error::PipelineError;
use crate::pipeline::ManipulationPipeline;
use crate::robot::AllowedCollisionMatrix;
use crate::services::{KinematicsSolver, MotionPlanner, PlanningScene, TimeParameterization};
use crate::sim::{self, BoxObstacle, GantryKinematics, GantryPlanner, GantryScene};
use crate::stage::{ApproachAndTranslateStage, PlanStage};
use crate::time_param::IterativeParabolicTimeParameterization;
use nalgebra::{Point3, Vector3};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

const OBJECT: &str = "object";

/// Runtime context for CLI execution: the effective configuration.
pub struct RunContext {
    config: PickPlaceConfig,
}

impl RunContext {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, PipelineError> {
        let config = ConfigLoader::load(config_path.as_deref())?;
        Ok(Self { config })
    }

    pub fn from_config(config: PickPlaceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PickPlaceConfig {
        &self.config
    }

    pub fn execute(&self, command: &Commands) -> Result<String, PipelineError> {
        match command {
            Commands::Run {
                candidates,
                workers,
                obstacle,
                timeout_ms,
                approach_distance,
                planning_delay_ms,
                format,
            } => {
                let report = self.run(
                    *candidates,
                    *workers,
                    *obstacle,
                    Duration::from_millis(*timeout_ms),
                    *approach_distance,
                    Duration::from_millis(*planning_delay_ms),
                )?;
                match format {
                    OutputFormat::Text => Ok(format_run_text(&report)),
                    OutputFormat::Json => format_run_json(&report),
                }
            }
            Commands::Config => toml::to_string_pretty(&self.config)
                .map_err(|e| PipelineError::ConfigError(e.to_string())),
        }
    }

    /// Assemble `[approach, plan]` against the gantry and evaluate candidates
    fn run(
        &self,
        candidates: usize,
        workers: Option<usize>,
        obstacle: bool,
        timeout: Duration,
        approach_distance: f64,
        planning_delay: Duration,
    ) -> Result<RunReport, PipelineError> {
        let mut settings = self.config.pipeline.clone();
        if let Some(workers) = workers {
            settings.worker_count = workers;
        }

        // Object resting on the table; the gripper sphere touches it when grasping
        let object = BoxObstacle::new(
            OBJECT,
            Point3::new(0.37, -0.03, 0.0),
            Point3::new(0.43, 0.03, 0.08),
        );
        let table = BoxObstacle::new(
            "table",
            Point3::new(-1.0, -1.0, -0.1),
            Point3::new(1.0, 1.0, -0.001),
        );
        let mut pre_grasp = GantryScene::new("pre-grasp")
            .with_obstacle(table.clone())
            .with_obstacle(object);
        // The object travels with the gripper after the grasp
        let mut post_grasp = GantryScene::new("post-grasp").with_obstacle(table);
        if obstacle {
            let shelf = BoxObstacle::new(
                "shelf",
                Point3::new(0.40, -0.2, 0.14),
                Point3::new(0.6, 0.2, 0.15),
            );
            pre_grasp = pre_grasp.with_obstacle(shelf.clone());
            post_grasp = post_grasp.with_obstacle(shelf);
        }
        let pre_grasp: Arc<dyn PlanningScene> = Arc::new(pre_grasp);
        let post_grasp: Arc<dyn PlanningScene> = Arc::new(post_grasp);

        let mut acm = AllowedCollisionMatrix::new();
        acm.allow(sim::GRIPPER_LINK, OBJECT);

        let kinematics: Arc<dyn KinematicsSolver> = Arc::new(GantryKinematics::default());
        let time_param: Arc<dyn TimeParameterization> = Arc::new(
            IterativeParabolicTimeParameterization::new(self.config.limits.clone()),
        );
        let planner: Arc<dyn MotionPlanner> = Arc::new(
            GantryPlanner::new(
                sim::state_at(&Vector3::new(0.0, 0.0, 0.5)),
                self.config.limits.clone(),
            )
            .with_planning_delay(planning_delay),
        );

        let pipeline = ManipulationPipeline::from_settings(&settings);
        pipeline.add_stage(Arc::new(ApproachAndTranslateStage::new(
            Arc::clone(&pre_grasp),
            post_grasp,
            Arc::new(acm),
            kinematics,
            time_param,
            self.config.approach.clone(),
        )?))?;
        pipeline.add_stage(Arc::new(
            PlanStage::new(pre_grasp, planner)
                .with_planning_attempts(self.config.planning.num_planning_attempts)
                .with_goal_tolerance(self.config.planning.goal_tolerance),
        ))?;

        let solutions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&solutions);
        pipeline.set_solution_callback(move |_plan| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        let started = Instant::now();
        pipeline.start()?;
        for plan in sim::grasp_candidates(
            Point3::new(0.4, 0.0, 0.09),
            candidates,
            0.02,
            approach_distance,
            timeout,
        ) {
            pipeline.push(plan);
        }
        pipeline.wait_for_completion(Some(timeout + Duration::from_secs(5)))?;
        pipeline.stop()?;

        let report = RunReport::new(
            &pipeline,
            solutions.load(Ordering::Relaxed),
            started.elapsed(),
        );
        info!(
            pipeline = %pipeline.name(),
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Run finished"
        );
        Ok(report)
    }
}
