//! Model families: the fit/predict contract and the reference GLMs.

pub mod design;
pub mod glm;
pub mod linalg;

pub use glm::{Glm, GlmFamily, GlmFit};

use crate::config::ModelConfig;
use crate::data::{DataView, Dataset};
use crate::error::CvError;
use serde::{Deserialize, Serialize};

/// Anything that can be fit on a training view and predict a test view.
///
/// The evaluator owns each `Fitted` value only for the duration of one fold.
pub trait ModelFamily: Send + Sync + 'static {
    type Fitted: Send;

    fn name(&self) -> &str;

    fn fit(&self, train: &DataView<'_>) -> Result<Self::Fitted, CvError>;

    /// One prediction per test observation, in view order.
    fn predict(&self, fitted: &Self::Fitted, test: &DataView<'_>) -> Result<Vec<f64>, CvError>;
}

/// Which reference model to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Logistic for binary responses, linear otherwise.
    #[default]
    Auto,
    Logistic,
    Linear,
}

impl Glm {
    /// Build the GLM selected by `config` for `dataset`'s response type.
    pub fn from_config(config: &ModelConfig, dataset: &Dataset) -> Result<Self, CvError> {
        let binary = dataset.has_binary_response();
        let family = match config.family {
            ModelKind::Auto if binary => GlmFamily::Binomial,
            ModelKind::Auto => GlmFamily::Gaussian,
            ModelKind::Logistic if !binary => {
                return Err(CvError::configuration(
                    "logistic regression requires a binary response",
                ));
            }
            ModelKind::Logistic => GlmFamily::Binomial,
            ModelKind::Linear => GlmFamily::Gaussian,
        };
        Ok(Self {
            family,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        })
    }
}
