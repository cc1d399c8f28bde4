//! Configuration System
//!
//! Layered configuration for the pipeline, its stages, joint limits and
//! logging. Sources are merged lowest to highest precedence:
//!
//! 1. Built-in defaults
//! 2. Global file: `$XDG_CONFIG_HOME/pickplace/config.toml` (platform config dir)
//! 3. Explicit file passed by the caller
//! 4. Environment variables: `PICKPLACE__<SECTION>__<KEY>`

use crate::error::PipelineError;
use crate::logging::LoggingConfig;
use crate::stage::ApproachSettings;
use crate::time_param::JointLimits;
use config::{Config, ConfigBuilder, Environment, File};
use config::builder::DefaultState;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PickPlaceConfig {
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Approach-and-translate stage tunables
    #[serde(default)]
    pub approach: ApproachSettings,

    #[serde(default)]
    pub planning: PlanningSettings,

    /// Limits used for time parameterization
    #[serde(default)]
    pub limits: JointLimits,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pipeline construction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    /// Number of worker threads, fixed at construction
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

fn default_pipeline_name() -> String {
    "pick".to_string()
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(2)
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            worker_count: default_worker_count(),
        }
    }
}

/// Plan stage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningSettings {
    #[serde(default = "default_planning_attempts")]
    pub num_planning_attempts: u32,

    /// Joint tolerance of the goal constraints
    #[serde(default = "default_goal_tolerance")]
    pub goal_tolerance: f64,
}

fn default_planning_attempts() -> u32 {
    1
}

fn default_goal_tolerance() -> f64 {
    1e-4
}

impl Default for PlanningSettings {
    fn default() -> Self {
        Self {
            num_planning_attempts: default_planning_attempts(),
            goal_tolerance: default_goal_tolerance(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Pipeline(String),
    Approach(String),
    Planning(String),
    Limits(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Pipeline(msg) => write!(f, "Pipeline: {}", msg),
            ValidationError::Approach(msg) => write!(f, "Approach: {}", msg),
            ValidationError::Planning(msg) => write!(f, "Planning: {}", msg),
            ValidationError::Limits(msg) => write!(f, "Limits: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl PickPlaceConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.pipeline.name.trim().is_empty() {
            errors.push(ValidationError::Pipeline("name cannot be empty".to_string()));
        }
        if self.pipeline.worker_count == 0 {
            errors.push(ValidationError::Pipeline(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if let Err(e) = self.approach.validate() {
            errors.push(ValidationError::Approach(e));
        }
        if self.planning.num_planning_attempts == 0 {
            errors.push(ValidationError::Planning(
                "num_planning_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.planning.goal_tolerance.is_finite() && self.planning.goal_tolerance >= 0.0) {
            errors.push(ValidationError::Planning(
                "goal_tolerance must be non-negative".to_string(),
            ));
        }
        if let Err(e) = self.limits.validate() {
            errors.push(ValidationError::Limits(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold every error into a single `PipelineError`
    pub fn ensure_valid(&self) -> Result<(), PipelineError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            PipelineError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })
    }
}

/// Loads [`PickPlaceConfig`] from layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    pub const ENV_PREFIX: &'static str = "PICKPLACE";

    /// Path of the user-level config file, if a config dir can be resolved
    pub fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "pickplace")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load defaults, global file, optional explicit file and environment
    pub fn load(explicit: Option<&Path>) -> Result<PickPlaceConfig, PipelineError> {
        let mut builder = Config::builder();
        if let Some(global) = Self::global_config_path() {
            debug!(config_path = %global.display(), "Checking global configuration file");
            builder = builder.add_source(File::from(global).required(false));
        }
        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }
        Self::finish(Self::with_environment(builder))
    }

    /// Load a single file on top of the defaults, ignoring other sources
    pub fn load_from_file(path: &Path) -> Result<PickPlaceConfig, PipelineError> {
        let builder = Config::builder().add_source(File::from(path.to_path_buf()).required(true));
        Self::finish(builder)
    }

    fn with_environment(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
        builder.add_source(
            Environment::with_prefix(Self::ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<PickPlaceConfig, PipelineError> {
        let config: PickPlaceConfig = builder.build()?.try_deserialize()?;
        config.ensure_valid()?;
        Ok(config)
    }
}
