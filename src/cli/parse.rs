//! CLI parse: clap types for pickplace. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Pickplace CLI - evaluate grasp candidates through the manipulation pipeline
#[derive(Parser)]
#[command(name = "pickplace")]
#[command(about = "Evaluate grasp candidates through a concurrent stage pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging
    #[arg(long, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run synthetic grasp candidates against the gantry simulation
    Run {
        /// Number of grasp candidates to push
        #[arg(long, default_value_t = 16)]
        candidates: usize,

        /// Worker threads (overrides configuration)
        #[arg(long)]
        workers: Option<usize>,

        /// Place a shelf above part of the object to force rejections
        #[arg(long)]
        obstacle: bool,

        /// Per-candidate deadline in milliseconds
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,

        /// Approach and retreat distance in meters
        #[arg(long, default_value_t = 0.1)]
        approach_distance: f64,

        /// Simulated motion planner compute time in milliseconds
        #[arg(long, default_value_t = 0)]
        planning_delay_ms: u64,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the effective configuration as TOML
    Config,
}
