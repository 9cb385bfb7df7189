//! # spatialcv-core
//!
//! Estimates how well a predictive model generalizes to new locations by
//! partitioning georeferenced observations into spatially separated folds,
//! fitting the model on all but one fold, and scoring it on the held-out fold.
//!
//! ## Pieces
//!
//! - [`partition`]: k-means and block spatial partitioners, a random
//!   baseline, and buffering of training observations near the test fold
//! - [`evaluation`]: concurrent per-fold fit/predict/score and aggregation
//! - [`models`]: the [`ModelFamily`] contract plus logistic and linear GLMs
//! - [`metrics`]: AUROC, accuracy, RMSE, MAE
//! - [`experiment`]: single runs, repeated runs, spatial-vs-random comparison

// Foundation
pub mod config;
pub mod error;
pub mod reproducibility;

// Data
pub mod data;

// Partitioning & evaluation
pub mod evaluation;
pub mod metrics;
pub mod models;
pub mod partition;

// Orchestration
pub mod experiment;

// Re-exports
pub use config::{CvConfig, PartitionConfig, PartitionMethod, load_config};
pub use data::{Coordinate, Dataset, Observation, PredictorValue, Response};
pub use error::CvError;
pub use evaluation::{CvReport, Evaluator, FoldResult, FoldStatus, ScoreSummary};
pub use experiment::{Comparison, RepeatedCvReport, RunOutcome, SpatialCrossValidation};
pub use metrics::{Metric, Scorer};
pub use models::{Glm, ModelFamily, ModelKind};
pub use partition::{FoldAssignment, FoldPlan, Partitioner, partitioner_for, plan_folds};
