//! Scoring functions applied to a fold's predictions.

use crate::data::Response;
use crate::error::CvError;
use serde::{Deserialize, Serialize};

/// Trait for scoring predictions against true labels.
pub trait Scorer: Send + Sync {
    fn name(&self) -> &str;

    /// Whether larger scores mean better predictions.
    fn higher_is_better(&self) -> bool;

    fn score(&self, predictions: &[f64], truth: &[Response]) -> Result<f64, CvError>;
}

/// Built-in metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Area under the ROC curve. Binary responses only.
    #[default]
    Auroc,
    /// Fraction of correct labels at a 0.5 probability threshold. Binary responses only.
    Accuracy,
    Rmse,
    Mae,
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Scorer for Metric {
    fn name(&self) -> &str {
        match self {
            Self::Auroc => "auroc",
            Self::Accuracy => "accuracy",
            Self::Rmse => "rmse",
            Self::Mae => "mae",
        }
    }

    fn higher_is_better(&self) -> bool {
        matches!(self, Self::Auroc | Self::Accuracy)
    }

    fn score(&self, predictions: &[f64], truth: &[Response]) -> Result<f64, CvError> {
        check_inputs(predictions, truth)?;
        match self {
            Self::Auroc => auroc(predictions, &binary_labels(truth)?),
            Self::Accuracy => Ok(accuracy(predictions, &binary_labels(truth)?, 0.5)),
            Self::Rmse => Ok(rmse(predictions, &continuous(truth))),
            Self::Mae => Ok(mae(predictions, &continuous(truth))),
        }
    }
}

fn check_inputs(predictions: &[f64], truth: &[Response]) -> Result<(), CvError> {
    if predictions.len() != truth.len() {
        return Err(CvError::scoring(format!(
            "{} predictions for {} labels",
            predictions.len(),
            truth.len()
        )));
    }
    if predictions.is_empty() {
        return Err(CvError::scoring("no predictions to score"));
    }
    if predictions.iter().any(|p| !p.is_finite()) {
        return Err(CvError::scoring("non-finite prediction"));
    }
    Ok(())
}

fn binary_labels(truth: &[Response]) -> Result<Vec<bool>, CvError> {
    truth
        .iter()
        .map(|r| {
            r.as_bool()
                .ok_or_else(|| CvError::scoring("metric requires a binary response"))
        })
        .collect()
}

fn continuous(truth: &[Response]) -> Vec<f64> {
    truth.iter().map(Response::as_f64).collect()
}

/// Area under the ROC curve via the Mann-Whitney U statistic. Tied scores
/// receive their average rank, so a constant predictor scores 0.5.
pub fn auroc(scores: &[f64], labels: &[bool]) -> Result<f64, CvError> {
    let n_pos = labels.iter().filter(|&&l| l).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(CvError::scoring(
            "AUROC is undefined when the test fold contains a single class",
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their mean
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if labels[idx] {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let u = rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0;
    Ok(u / (n_pos * n_neg as f64))
}

pub fn accuracy(probabilities: &[f64], labels: &[bool], threshold: f64) -> f64 {
    let correct = probabilities
        .iter()
        .zip(labels)
        .filter(|&(&p, &l)| (p >= threshold) == l)
        .count();
    correct as f64 / labels.len() as f64
}

pub fn rmse(predictions: &[f64], truth: &[f64]) -> f64 {
    let mse = predictions
        .iter()
        .zip(truth)
        .map(|(p, t)| (p - t).powi(2))
        .sum::<f64>()
        / truth.len() as f64;
    mse.sqrt()
}

pub fn mae(predictions: &[f64], truth: &[f64]) -> f64 {
    predictions
        .iter()
        .zip(truth)
        .map(|(p, t)| (p - t).abs())
        .sum::<f64>()
        / truth.len() as f64
}
