//! Per-fold fit/predict/score, run concurrently on the blocking pool.

use super::callbacks::FoldCallback;
use super::report::{CvReport, FoldResult, FoldStatus, ScoreSummary};
use crate::data::Dataset;
use crate::error::CvError;
use crate::metrics::Scorer;
use crate::models::ModelFamily;
use crate::partition::{Fold, FoldPlan};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Evaluates every fold of a plan and aggregates the scores.
pub struct Evaluator {
    max_workers: usize,
    cancellation: CancellationToken,
    callbacks: Vec<Arc<dyn FoldCallback>>,
}

impl Evaluator {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            cancellation: CancellationToken::new(),
            callbacks: Vec::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn FoldCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Fit, predict, and score each fold, at most `max_workers` at a time.
    ///
    /// Fold failures are recorded and excluded from the summary; the run
    /// fails with [`CvError::AggregateFailure`] only if no fold was scored.
    /// Cancellation is observed before each fold starts and while waiting for
    /// folds to finish; results of folds still running are discarded.
    pub async fn evaluate<M: ModelFamily>(
        &self,
        dataset: Arc<Dataset>,
        plan: Arc<FoldPlan>,
        model: Arc<M>,
        scorer: Arc<dyn Scorer>,
    ) -> Result<CvReport, CvError> {
        let total = plan.folds.len();
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks: JoinSet<FoldResult> = JoinSet::new();

        for index in 0..total {
            let permit = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => {
                    tasks.abort_all();
                    return Err(CvError::Cancelled);
                }
                permit = semaphore.clone().acquire_owned() => {
                    permit.map_err(|_| CvError::Cancelled)?
                }
            };

            let dataset = Arc::clone(&dataset);
            let plan = Arc::clone(&plan);
            let model = Arc::clone(&model);
            let scorer = Arc::clone(&scorer);
            tasks.spawn_blocking(move || {
                let _permit = permit;
                evaluate_fold(&dataset, &plan.folds[index], model.as_ref(), scorer.as_ref())
            });
        }

        let mut results = Vec::with_capacity(total);
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => {
                    tasks.abort_all();
                    return Err(CvError::Cancelled);
                }
                next = tasks.join_next() => next,
            };
            let Some(joined) = next else { break };
            let result = joined?;
            for callback in &self.callbacks {
                callback.on_fold_end(&result, results.len() + 1, total);
            }
            results.push(result);
        }
        results.sort_by_key(|r| r.fold);

        let mut warnings = Vec::new();
        for r in results.iter().filter(|r| !r.is_scored()) {
            let reason = r.error.as_deref().unwrap_or("unknown error");
            tracing::warn!(fold = r.fold, reason, "Fold excluded from aggregate");
            warnings.push(format!("fold {} excluded: {reason}", r.fold));
        }

        let scores: Vec<Option<f64>> = results.iter().map(|r| r.score).collect();
        let summary = ScoreSummary::from_scores(&scores).ok_or_else(|| {
            CvError::aggregate(format!("all {total} folds failed to produce a score"))
        })?;

        Ok(CvReport {
            method: plan.method.clone(),
            model: model.name().to_string(),
            metric: scorer.name().to_string(),
            higher_is_better: scorer.higher_is_better(),
            k: plan.k(),
            seed: plan.seed,
            buffer_distance: plan.buffer_distance,
            fingerprint: plan.fingerprint(),
            folds: results,
            summary,
            warnings,
        })
    }
}

/// Fit on the fold's training set, predict its test set, score. The fitted
/// model and predictions are dropped before returning.
pub fn evaluate_fold<M: ModelFamily>(
    dataset: &Dataset,
    fold: &Fold,
    model: &M,
    scorer: &dyn Scorer,
) -> FoldResult {
    let started = Instant::now();
    let train = dataset.view(&fold.train);
    let test = dataset.view(&fold.test);

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        let fitted = model.fit(&train)?;
        let predictions = model.predict(&fitted, &test)?;
        drop(fitted);
        scorer.score(&predictions, &test.responses())
    }))
    .unwrap_or_else(|_| Err(CvError::fit("model panicked during fit or predict")));

    let (status, score, error) = match outcome {
        Ok(score) => (FoldStatus::Scored, Some(score), None),
        Err(e @ CvError::ScoringFailure(_)) => (FoldStatus::ScoringFailed, None, Some(e.to_string())),
        Err(e) => (FoldStatus::FitFailed, None, Some(e.to_string())),
    };

    tracing::debug!(fold = fold.index, ?status, ?score, "Evaluated fold");

    FoldResult {
        fold: fold.index,
        status,
        score,
        error,
        n_train: fold.train.len(),
        n_test: fold.test.len(),
        n_buffered: fold.buffered.len(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}
