//! Configuration system for SpatialCV.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from the user config directory and/or `.spatialcv/config.toml`
//! in the workspace directory.

use crate::data::{ColumnMapping, DataSourceType};
use crate::error::CvError;
use crate::metrics::Metric;
use crate::models::ModelKind;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvConfig {
    /// Fold partitioning configuration.
    #[serde(default)]
    pub partition: PartitionConfig,
    /// Per-fold evaluation configuration.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// Model family configuration.
    #[serde(default)]
    pub model: ModelConfig,
    /// Input data configuration.
    #[serde(default)]
    pub data: DataConfig,
}

/// How observations are split into folds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionMethod {
    /// k-means clustering over coordinates.
    #[default]
    #[serde(alias = "k_means")]
    Kmeans,
    /// Systematic rectangular blocks over the bounding box.
    Blocks,
    /// Conventional, location-blind random folds.
    Random,
}

impl PartitionMethod {
    pub fn is_spatial(&self) -> bool {
        !matches!(self, Self::Random)
    }
}

impl std::fmt::Display for PartitionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kmeans => write!(f, "kmeans"),
            Self::Blocks => write!(f, "blocks"),
            Self::Random => write!(f, "random"),
        }
    }
}

/// Fold partitioning configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionConfig {
    #[serde(default)]
    pub method: PartitionMethod,
    /// Number of folds (k).
    #[serde(default = "default_folds")]
    pub folds: usize,
    /// Minimum distance between a fold's test points and its training points.
    #[serde(default)]
    pub buffer_distance: Option<f64>,
    /// Seed for randomized initialization and shuffling.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Maximum Lloyd iterations for k-means.
    #[serde(default = "default_kmeans_iterations")]
    pub max_iterations: usize,
    /// Grid cells per axis for block partitioning (derived from k if unset).
    #[serde(default)]
    pub blocks_per_axis: Option<usize>,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            method: PartitionMethod::default(),
            folds: default_folds(),
            buffer_distance: None,
            seed: default_seed(),
            max_iterations: default_kmeans_iterations(),
            blocks_per_axis: None,
        }
    }
}

fn default_folds() -> usize {
    5
}

fn default_seed() -> u64 {
    42
}

fn default_kmeans_iterations() -> usize {
    100
}

impl PartitionConfig {
    pub fn validate(&self) -> Result<(), CvError> {
        if self.folds < 2 {
            return Err(CvError::configuration(format!(
                "fold count must be at least 2, got {}",
                self.folds
            )));
        }
        if let Some(d) = self.buffer_distance {
            if !d.is_finite() || d < 0.0 {
                return Err(CvError::configuration(format!(
                    "buffer distance must be a finite value >= 0, got {d}"
                )));
            }
        }
        if self.max_iterations == 0 {
            return Err(CvError::configuration("max_iterations must be positive"));
        }
        if self.blocks_per_axis == Some(0) {
            return Err(CvError::configuration("blocks_per_axis must be positive"));
        }
        Ok(())
    }

    /// Buffer distance if buffering is actually enabled.
    pub fn effective_buffer(&self) -> Option<f64> {
        self.buffer_distance.filter(|d| *d > 0.0)
    }
}

/// Per-fold evaluation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Scoring metric.
    #[serde(default)]
    pub metric: Metric,
    /// Number of times the partition + evaluate cycle is repeated.
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,
    /// Maximum number of folds evaluated concurrently (available parallelism if unset).
    #[serde(default)]
    pub max_workers: Option<usize>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            metric: Metric::default(),
            repetitions: default_repetitions(),
            max_workers: None,
        }
    }
}

fn default_repetitions() -> usize {
    1
}

impl EvaluationConfig {
    pub fn validate(&self) -> Result<(), CvError> {
        if self.repetitions == 0 {
            return Err(CvError::configuration("repetitions must be at least 1"));
        }
        if self.max_workers == Some(0) {
            return Err(CvError::configuration("max_workers must be positive"));
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.max_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Model family configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub family: ModelKind,
    /// Iteration cap for iterative fitting (IRLS).
    #[serde(default = "default_model_iterations")]
    pub max_iterations: usize,
    /// Convergence tolerance on the change in deviance.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            family: ModelKind::default(),
            max_iterations: default_model_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

fn default_model_iterations() -> usize {
    25
}

fn default_tolerance() -> f64 {
    1e-8
}

/// Input data configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Where to load observations from (overridden by the CLI `--data` flag).
    #[serde(default)]
    pub source: Option<DataSourceType>,
    /// Column roles.
    #[serde(default)]
    pub columns: ColumnMapping,
}

impl CvConfig {
    pub fn validate(&self) -> Result<(), CvError> {
        self.partition.validate()?;
        self.evaluation.validate()?;
        if self.model.max_iterations == 0 {
            return Err(CvError::configuration("model max_iterations must be positive"));
        }
        if self.model.tolerance.is_nan() || self.model.tolerance <= 0.0 {
            return Err(CvError::configuration("model tolerance must be positive"));
        }
        Ok(())
    }
}

/// Path of the workspace-local config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".spatialcv").join("config.toml")
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "spatialcv", "spatialcv")
        .map(|d| d.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument; only the keys present are
///    applied, e.g. `{"partition": {"seed": 7}}`)
/// 2. Environment variables (prefixed with `SPATIALCV_`)
/// 3. Workspace-local config (`.spatialcv/config.toml`)
/// 4. User config (`~/.config/spatialcv/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&serde_json::Value>,
) -> Result<CvConfig, CvError> {
    let mut figment = Figment::from(Serialized::defaults(CvConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // SPATIALCV_PARTITION__FOLDS, SPATIALCV_EVALUATION__METRIC, etc.
    figment = figment.merge(Env::prefixed("SPATIALCV_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: CvConfig = figment.extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}
