//! CLI presentation: text tables and JSON for run results.

use crate::error::PipelineError;
use crate::pipeline::ManipulationPipeline;
use crate::plan::PlanSummary;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;
use std::time::Duration;

/// Outcome of one `pickplace run`
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub pipeline: String,
    pub workers: usize,
    pub stages: Vec<String>,
    pub finished_at: String,
    pub elapsed_ms: u64,
    pub solution_callbacks: usize,
    pub succeeded: Vec<PlanSummary>,
    pub failed: Vec<PlanSummary>,
}

impl RunReport {
    pub fn new(pipeline: &ManipulationPipeline, solution_callbacks: usize, elapsed: Duration) -> Self {
        let mut succeeded: Vec<PlanSummary> = pipeline
            .successful_plans()
            .iter()
            .map(|plan| plan.summary())
            .collect();
        let mut failed: Vec<PlanSummary> = pipeline
            .failed_plans()
            .iter()
            .map(|plan| plan.summary())
            .collect();
        succeeded.sort_by_key(|s| s.id);
        failed.sort_by_key(|s| s.id);

        Self {
            pipeline: pipeline.name().to_string(),
            workers: pipeline.worker_count(),
            stages: pipeline.stage_names(),
            finished_at: chrono::Utc::now().to_rfc3339(),
            elapsed_ms: elapsed.as_millis() as u64,
            solution_callbacks,
            succeeded,
            failed,
        }
    }
}

pub fn format_run_text(report: &RunReport) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Plan", "Result", "Error Code", "Segments", "Waypoints", "Duration (s)"]);

    let mut rows: Vec<(&PlanSummary, bool)> = report
        .succeeded
        .iter()
        .map(|s| (s, true))
        .chain(report.failed.iter().map(|s| (s, false)))
        .collect();
    rows.sort_by_key(|(s, _)| s.id);

    for (summary, ok) in rows {
        let result = if ok { "success" } else { "rejected" };
        let segments = if summary.segments.is_empty() {
            "-".to_string()
        } else {
            summary.segments.join(" > ")
        };
        table.add_row(vec![
            summary.id.to_string(),
            result.to_string(),
            summary.error_code.to_string(),
            segments,
            summary.waypoints.to_string(),
            format!("{:.3}", summary.duration_s),
        ]);
    }

    let headline = format!(
        "Pipeline '{}' [{}] with {} worker(s) in {} ms",
        report.pipeline,
        report.stages.join(" -> "),
        report.workers,
        report.elapsed_ms
    );
    format!(
        "{}\n{}\n{} succeeded, {} rejected, {} solution callback(s)",
        headline.bold(),
        table,
        report.succeeded.len().green(),
        report.failed.len().red(),
        report.solution_callbacks
    )
}

pub fn format_run_json(report: &RunReport) -> Result<String, PipelineError> {
    serde_json::to_string_pretty(report)
        .map_err(|e| PipelineError::ConfigError(format!("Failed to encode report: {}", e)))
}
