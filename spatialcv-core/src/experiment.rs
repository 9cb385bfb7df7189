//! Cross-validation runs: the run record and its state machine, repeated
//! cross-validation, and the spatial-versus-random comparison.

use crate::config::{CvConfig, PartitionConfig, PartitionMethod};
use crate::data::Dataset;
use crate::error::CvError;
use crate::evaluation::{CvReport, Evaluator, FoldCallback, ScoreSummary};
use crate::metrics::Scorer;
use crate::models::ModelFamily;
use crate::partition::{partitioner_for, plan_folds};
use crate::reproducibility::{EnvironmentSnapshot, SeedManager};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Initialized,
    Partitioning,
    Evaluating,
    Aggregated,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Aggregated | Self::Failed | Self::Cancelled)
    }

    fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Initialized, Partitioning)
                | (Partitioning, Evaluating)
                | (Evaluating, Aggregated)
                | (Initialized | Partitioning | Evaluating, Failed)
                | (Initialized | Partitioning | Evaluating, Cancelled)
        )
    }
}

/// Record of one partition + evaluate cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvRun {
    pub id: String,
    pub method: PartitionMethod,
    pub repetition: usize,
    pub seed: u64,
    pub status: RunStatus,
    pub history: Vec<(RunStatus, DateTime<Utc>)>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CvRun {
    pub fn new(method: PartitionMethod, repetition: usize, seed: u64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method,
            repetition,
            seed,
            status: RunStatus::Initialized,
            history: vec![(RunStatus::Initialized, now)],
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`; invalid transitions are ignored and logged.
    pub fn transition(&mut self, next: RunStatus) {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                run = %self.id,
                from = ?self.status,
                to = ?next,
                "Ignoring invalid run transition"
            );
            return;
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        self.history.push((next, now));
    }

    fn fail(&mut self, error: &CvError) {
        self.error = Some(error.to_string());
        let next = if matches!(error, CvError::Cancelled) {
            RunStatus::Cancelled
        } else {
            RunStatus::Failed
        };
        self.transition(next);
    }
}

/// A successful run with its record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run: CvRun,
    pub report: CvReport,
}

/// A repetition that failed as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepetitionFailure {
    pub repetition: usize,
    pub seed: u64,
    pub error: String,
}

/// Result of repeating the whole cross-validation `r` times with derived seeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatedCvReport {
    pub method: PartitionMethod,
    pub metric: String,
    pub higher_is_better: bool,
    pub runs: Vec<RunOutcome>,
    pub failures: Vec<RepetitionFailure>,
    /// Summary over each repetition's mean score.
    pub summary: ScoreSummary,
    /// Summary over every fold score of every repetition.
    pub pooled: ScoreSummary,
    pub environment: EnvironmentSnapshot,
}

/// Spatial cross-validation side by side with conventional random folds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub spatial: RepeatedCvReport,
    pub random: RepeatedCvReport,
    /// How much better random folds make the model look; positive values
    /// mean conventional cross-validation is over-optimistic.
    pub optimism: f64,
}

/// Orchestrates partitioning and evaluation according to a [`CvConfig`].
pub struct SpatialCrossValidation {
    config: CvConfig,
    scorer: Arc<dyn Scorer>,
    cancellation: CancellationToken,
    callbacks: Vec<Arc<dyn FoldCallback>>,
}

impl SpatialCrossValidation {
    pub fn new(config: CvConfig) -> Result<Self, CvError> {
        config.validate()?;
        let scorer: Arc<dyn Scorer> = Arc::new(config.evaluation.metric);
        Ok(Self {
            config,
            scorer,
            cancellation: CancellationToken::new(),
            callbacks: Vec::new(),
        })
    }

    /// Replace the configured metric with a custom scorer.
    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn FoldCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn config(&self) -> &CvConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    fn evaluator(&self) -> Evaluator {
        self.callbacks.iter().fold(
            Evaluator::new(self.config.evaluation.worker_count())
                .with_cancellation(self.cancellation.clone()),
            |ev, cb| ev.with_callback(Arc::clone(cb)),
        )
    }

    /// One run with the configured method and seed.
    pub async fn run<M: ModelFamily>(
        &self,
        dataset: Arc<Dataset>,
        model: Arc<M>,
    ) -> Result<RunOutcome, CvError> {
        let partition = &self.config.partition;
        self.run_once(dataset, model, partition, 0, partition.seed)
            .await
    }

    async fn run_once<M: ModelFamily>(
        &self,
        dataset: Arc<Dataset>,
        model: Arc<M>,
        partition: &PartitionConfig,
        repetition: usize,
        seed: u64,
    ) -> Result<RunOutcome, CvError> {
        let mut run = CvRun::new(partition.method, repetition, seed);
        tracing::info!(
            run = %run.id,
            method = %partition.method,
            k = partition.folds,
            seed,
            buffer = ?partition.effective_buffer(),
            "Starting cross-validation run"
        );

        if self.cancellation.is_cancelled() {
            run.fail(&CvError::Cancelled);
            return Err(CvError::Cancelled);
        }

        run.transition(RunStatus::Partitioning);
        let partitioner = partitioner_for(partition);
        let plan = match plan_folds(&dataset, partitioner.as_ref(), partition, seed) {
            Ok(plan) => Arc::new(plan),
            Err(e) => {
                run.fail(&e);
                tracing::error!(run = %run.id, error = %e, "Partitioning failed");
                return Err(e);
            }
        };

        run.transition(RunStatus::Evaluating);
        let report = match self
            .evaluator()
            .evaluate(dataset, plan, model, Arc::clone(&self.scorer))
            .await
        {
            Ok(report) => report,
            Err(e) => {
                run.fail(&e);
                tracing::error!(run = %run.id, error = %e, "Evaluation failed");
                return Err(e);
            }
        };

        run.transition(RunStatus::Aggregated);
        tracing::info!(
            run = %run.id,
            mean = report.summary.mean,
            std_dev = report.summary.std_dev,
            scored = report.summary.n_scored,
            missing = report.summary.n_missing,
            "Cross-validation run aggregated"
        );
        Ok(RunOutcome { run, report })
    }

    /// Repeat the configured method `evaluation.repetitions` times.
    pub async fn run_repeated<M: ModelFamily>(
        &self,
        dataset: Arc<Dataset>,
        model: Arc<M>,
    ) -> Result<RepeatedCvReport, CvError> {
        self.repeat(dataset, model, &self.config.partition).await
    }

    async fn repeat<M: ModelFamily>(
        &self,
        dataset: Arc<Dataset>,
        model: Arc<M>,
        partition: &PartitionConfig,
    ) -> Result<RepeatedCvReport, CvError> {
        let repetitions = self.config.evaluation.repetitions;
        let seeds = SeedManager::new(partition.seed);
        let mut runs = Vec::with_capacity(repetitions);
        let mut failures = Vec::new();

        for repetition in 0..repetitions {
            let seed = seeds.repetition_seed(repetition);
            match self
                .run_once(
                    Arc::clone(&dataset),
                    Arc::clone(&model),
                    partition,
                    repetition,
                    seed,
                )
                .await
            {
                Ok(outcome) => runs.push(outcome),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(repetition, seed, error = %e, "Repetition failed");
                    failures.push(RepetitionFailure {
                        repetition,
                        seed,
                        error: e.to_string(),
                    });
                }
            }
        }

        let means: Vec<Option<f64>> = runs
            .iter()
            .map(|o| Some(o.report.summary.mean))
            .chain(failures.iter().map(|_| None))
            .collect();
        let summary = ScoreSummary::from_scores(&means).ok_or_else(|| {
            CvError::aggregate(format!("all {repetitions} repetitions failed"))
        })?;
        let pooled_scores: Vec<Option<f64>> =
            runs.iter().flat_map(|o| o.report.scores()).collect();
        let pooled = ScoreSummary::from_scores(&pooled_scores)
            .ok_or_else(|| CvError::aggregate("no fold produced a score"))?;

        Ok(RepeatedCvReport {
            method: partition.method,
            metric: self.scorer.name().to_string(),
            higher_is_better: self.scorer.higher_is_better(),
            runs,
            failures,
            summary,
            pooled,
            environment: EnvironmentSnapshot::capture(),
        })
    }

    /// Repeated cross-validation with the configured spatial method and with
    /// random folds, using the same seeds, model, and metric.
    pub async fn compare<M: ModelFamily>(
        &self,
        dataset: Arc<Dataset>,
        model: Arc<M>,
    ) -> Result<Comparison, CvError> {
        let spatial_config = &self.config.partition;
        if !spatial_config.method.is_spatial() {
            return Err(CvError::configuration(
                "comparison needs a spatial partition method (kmeans or blocks)",
            ));
        }
        let random_config = PartitionConfig {
            method: PartitionMethod::Random,
            buffer_distance: None,
            ..spatial_config.clone()
        };

        let spatial = self
            .repeat(Arc::clone(&dataset), Arc::clone(&model), spatial_config)
            .await?;
        let random = self.repeat(dataset, model, &random_config).await?;

        let diff = random.summary.mean - spatial.summary.mean;
        let optimism = if self.scorer.higher_is_better() {
            diff
        } else {
            -diff
        };
        tracing::info!(
            spatial = spatial.summary.mean,
            random = random.summary.mean,
            optimism,
            "Compared spatial and random cross-validation"
        );

        Ok(Comparison {
            spatial,
            random,
            optimism,
        })
    }
}
