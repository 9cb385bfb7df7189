//! Per-fold results and their aggregate.

use serde::{Deserialize, Serialize};

/// How a fold's evaluation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldStatus {
    Scored,
    FitFailed,
    ScoringFailed,
}

/// Outcome of evaluating one fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold: usize,
    pub status: FoldStatus,
    /// Missing when the fold failed.
    pub score: Option<f64>,
    pub error: Option<String>,
    pub n_train: usize,
    pub n_test: usize,
    pub n_buffered: usize,
    pub elapsed_ms: u64,
}

impl FoldResult {
    pub fn is_scored(&self) -> bool {
        self.status == FoldStatus::Scored
    }
}

/// Summary statistics over the non-missing scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator); 0 for a single score.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub n_scored: usize,
    pub n_missing: usize,
}

impl ScoreSummary {
    /// `None` when every score is missing.
    pub fn from_scores(scores: &[Option<f64>]) -> Option<Self> {
        let present: Vec<f64> = scores.iter().flatten().copied().collect();
        if present.is_empty() {
            return None;
        }
        let n = present.len() as f64;
        let mean = present.iter().sum::<f64>() / n;
        let std_dev = if present.len() > 1 {
            let ss = present.iter().map(|s| (s - mean).powi(2)).sum::<f64>();
            (ss / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        Some(Self {
            mean,
            std_dev,
            min: present.iter().copied().fold(f64::INFINITY, f64::min),
            max: present.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            n_scored: present.len(),
            n_missing: scores.len() - present.len(),
        })
    }
}

/// Result of one cross-validation run: fold scores in fold order plus aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvReport {
    pub method: String,
    pub model: String,
    pub metric: String,
    pub higher_is_better: bool,
    pub k: usize,
    pub seed: u64,
    pub buffer_distance: Option<f64>,
    /// Fingerprint of the fold assignment the scores were computed on.
    pub fingerprint: String,
    pub folds: Vec<FoldResult>,
    pub summary: ScoreSummary,
    pub warnings: Vec<String>,
}

impl CvReport {
    /// Per-fold scores in fold order, `None` for failed folds.
    pub fn scores(&self) -> Vec<Option<f64>> {
        self.folds.iter().map(|f| f.score).collect()
    }

    pub fn failed_folds(&self) -> Vec<usize> {
        self.folds
            .iter()
            .filter(|f| !f.is_scored())
            .map(|f| f.fold)
            .collect()
    }
}
