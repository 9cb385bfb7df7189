//! End-to-end tests: partition, evaluate, aggregate, repeat, compare.

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use spatialcv_core::config::{CvConfig, PartitionConfig, PartitionMethod};
use spatialcv_core::data::{Coordinate, DataView, Dataset, Observation, PredictorValue, Response};
use spatialcv_core::evaluation::{CountingCallback, Evaluator, FoldStatus};
use spatialcv_core::metrics::{Metric, Scorer};
use spatialcv_core::models::{Glm, ModelFamily};
use spatialcv_core::partition::{Partitioner, partitioner_for, plan_folds};
use spatialcv_core::{CvError, SpatialCrossValidation};

// --- Fixtures ---

/// Uses a fixed label per observation.
struct FixedLabels(Vec<usize>);

impl Partitioner for FixedLabels {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn assign(&self, _: &[Coordinate], _: usize, _: &mut StdRng) -> Result<Vec<usize>, CvError> {
        Ok(self.0.clone())
    }
}

/// Predicts the first predictor verbatim.
struct Passthrough;

impl ModelFamily for Passthrough {
    type Fitted = ();

    fn name(&self) -> &str {
        "passthrough"
    }

    fn fit(&self, _train: &DataView<'_>) -> Result<(), CvError> {
        Ok(())
    }

    fn predict(&self, _: &(), test: &DataView<'_>) -> Result<Vec<f64>, CvError> {
        Ok(test
            .iter()
            .map(|o| o.predictors[0].as_f64().unwrap_or(0.0))
            .collect())
    }
}

/// Predicts the response of the nearest training observation.
struct NearestNeighbour;

impl ModelFamily for NearestNeighbour {
    type Fitted = Vec<(Coordinate, f64)>;

    fn name(&self) -> &str {
        "1-nn"
    }

    fn fit(&self, train: &DataView<'_>) -> Result<Self::Fitted, CvError> {
        Ok(train.iter().map(|o| (o.coord, o.response.as_f64())).collect())
    }

    fn predict(&self, fitted: &Self::Fitted, test: &DataView<'_>) -> Result<Vec<f64>, CvError> {
        test.iter()
            .map(|o| {
                fitted
                    .iter()
                    .min_by(|a, b| {
                        o.coord
                            .distance_squared(&a.0)
                            .total_cmp(&o.coord.distance_squared(&b.0))
                    })
                    .map(|(_, y)| *y)
                    .ok_or_else(|| CvError::fit("empty training set"))
            })
            .collect()
    }
}

/// Always fails to fit.
struct Broken;

impl ModelFamily for Broken {
    type Fitted = ();

    fn name(&self) -> &str {
        "broken"
    }

    fn fit(&self, _train: &DataView<'_>) -> Result<(), CvError> {
        Err(CvError::fit("singular design"))
    }

    fn predict(&self, _: &(), _: &DataView<'_>) -> Result<Vec<f64>, CvError> {
        Ok(vec![])
    }
}

/// Blocks in `fit` until released, tracking how many fits run at once.
#[derive(Default)]
struct Gated {
    started: Arc<Notify>,
    released: Arc<AtomicBool>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ModelFamily for Gated {
    type Fitted = ();

    fn name(&self) -> &str {
        "gated"
    }

    fn fit(&self, _train: &DataView<'_>) -> Result<(), CvError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.started.notify_one();
        // Give other workers a chance to overlap even when already released.
        std::thread::sleep(Duration::from_millis(20));
        while !self.released.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn predict(&self, _: &(), test: &DataView<'_>) -> Result<Vec<f64>, CvError> {
        Ok(vec![0.0; test.len()])
    }
}

/// Mean of the test responses, so each fold's score is known in advance.
struct MeanResponse;

impl Scorer for MeanResponse {
    fn name(&self) -> &str {
        "mean_response"
    }

    fn higher_is_better(&self) -> bool {
        true
    }

    fn score(&self, _predictions: &[f64], truth: &[Response]) -> Result<f64, CvError> {
        Ok(truth.iter().map(Response::as_f64).sum::<f64>() / truth.len() as f64)
    }
}

/// 20 x 20 grid with a smooth response surface.
fn smooth_field() -> Dataset {
    let mut observations = Vec::new();
    for i in 0..20 {
        for j in 0..20 {
            let (x, y) = (i as f64, j as f64);
            observations.push(Observation::new(
                format!("g{i}-{j}"),
                Coordinate::new(x, y),
                vec![PredictorValue::Numeric(x)],
                Response::Continuous((x / 4.0).sin() + (y / 4.0).cos()),
            ));
        }
    }
    Dataset::new(vec!["x".into()], observations).unwrap()
}

/// Two tight clusters far apart, binary response driven by a noisy predictor.
fn two_clusters() -> Dataset {
    let mut observations = Vec::new();
    for i in 0..100 {
        let (cx, cy) = if i < 50 { (0.0, 0.0) } else { (1000.0, 1000.0) };
        let jitter = (i % 10) as f64;
        let elevation = ((i * 37) % 100) as f64 / 10.0;
        observations.push(Observation::new(
            format!("p{i}"),
            Coordinate::new(cx + jitter, cy + (i / 10 % 5) as f64),
            vec![PredictorValue::Numeric(elevation)],
            Response::Binary(elevation + ((i * 13) % 7) as f64 / 2.0 > 6.0),
        ));
    }
    Dataset::new(vec!["elevation".into()], observations).unwrap()
}

fn fixed_labels(n: usize, k: usize) -> Vec<usize> {
    (0..n).map(|i| i % k).collect()
}

fn line(n: usize) -> Dataset {
    let observations = (0..n)
        .map(|i| {
            Observation::new(
                format!("l{i}"),
                Coordinate::new(i as f64, 0.0),
                vec![PredictorValue::Numeric(i as f64)],
                Response::Continuous(i as f64),
            )
        })
        .collect();
    Dataset::new(vec!["x".into()], observations).unwrap()
}

// --- Evaluator ---

#[tokio::test]
async fn test_hand_computed_mean_over_five_folds() {
    let observations: Vec<Observation> = (0..25)
        .map(|i| {
            Observation::new(
                format!("o{i}"),
                Coordinate::new(i as f64, 0.0),
                vec![PredictorValue::Numeric(0.0)],
                Response::Continuous(0.1 * ((i % 5) + 1) as f64),
            )
        })
        .collect();
    let ds = Arc::new(Dataset::new(vec!["z".into()], observations).unwrap());
    let cfg = PartitionConfig {
        folds: 5,
        ..PartitionConfig::default()
    };
    let plan = plan_folds(&ds, &FixedLabels(fixed_labels(25, 5)), &cfg, 7).unwrap();

    let report = Evaluator::new(2)
        .evaluate(ds, Arc::new(plan), Arc::new(Passthrough), Arc::new(MeanResponse))
        .await
        .unwrap();

    let scores: Vec<f64> = report.scores().into_iter().flatten().collect();
    assert_eq!(scores.len(), 5);
    for (fold, score) in scores.iter().enumerate() {
        assert!((score - 0.1 * (fold + 1) as f64).abs() < 1e-12);
    }
    assert!((report.summary.mean - 0.3).abs() < 1e-12);
    assert!((report.summary.std_dev - 0.158_113_883_008_418_98).abs() < 1e-12);
    assert_eq!(report.summary.n_missing, 0);
    assert!(report.warnings.is_empty());
    assert_eq!(report.k, 5);
}

#[tokio::test]
async fn test_single_class_fold_is_excluded_with_warning() {
    // Fold 2 holds only positives, so AUROC is undefined there.
    let observations: Vec<Observation> = (0..25)
        .map(|i| {
            let fold = i % 5;
            let positive = fold == 2 || i % 2 == 0;
            Observation::new(
                format!("o{i}"),
                Coordinate::new(i as f64, i as f64),
                vec![PredictorValue::Numeric(i as f64)],
                Response::Binary(positive),
            )
        })
        .collect();
    let ds = Arc::new(Dataset::new(vec!["z".into()], observations).unwrap());
    let cfg = PartitionConfig::default();
    let plan = plan_folds(&ds, &FixedLabels(fixed_labels(25, 5)), &cfg, 1).unwrap();
    let counter = Arc::new(CountingCallback::default());

    let report = Evaluator::new(4)
        .with_callback(counter.clone())
        .evaluate(ds, Arc::new(plan), Arc::new(Passthrough), Arc::new(Metric::Auroc))
        .await
        .unwrap();

    assert_eq!(report.summary.n_scored, 4);
    assert_eq!(report.summary.n_missing, 1);
    assert_eq!(report.failed_folds(), vec![2]);
    assert_eq!(report.folds[2].status, FoldStatus::ScoringFailed);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(counter.finished(), 5);
    assert_eq!(counter.failed(), 1);
}

#[tokio::test]
async fn test_single_class_training_set_fails_fit_only_for_that_fold() {
    // Every negative sits in fold 0, so its training set is all positives.
    let observations: Vec<Observation> = (0..50)
        .map(|i| {
            Observation::new(
                format!("o{i}"),
                Coordinate::new(i as f64, 0.0),
                vec![PredictorValue::Numeric(((i * 7) % 11) as f64)],
                Response::Binary(i % 5 != 0),
            )
        })
        .collect();
    let ds = Arc::new(Dataset::new(vec!["z".into()], observations).unwrap());
    let cfg = PartitionConfig::default();
    let plan = plan_folds(&ds, &FixedLabels(fixed_labels(50, 5)), &cfg, 1).unwrap();

    let report = Evaluator::new(2)
        .evaluate(ds, Arc::new(plan), Arc::new(Glm::logistic()), Arc::new(Metric::Rmse))
        .await
        .unwrap();

    let statuses: Vec<FoldStatus> = report.folds.iter().map(|f| f.status).collect();
    assert_eq!(
        statuses,
        vec![
            FoldStatus::FitFailed,
            FoldStatus::Scored,
            FoldStatus::Scored,
            FoldStatus::Scored,
            FoldStatus::Scored,
        ]
    );
    assert!(report.folds[0].score.is_none());
    assert!(
        report.folds[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("single response class"))
    );
    assert_eq!(report.summary.n_scored, 4);
    assert_eq!(report.summary.n_missing, 1);
    assert_eq!(report.warnings.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_while_folds_are_running() {
    let ds = Arc::new(line(10));
    let cfg = PartitionConfig::default();
    let plan = plan_folds(&ds, &FixedLabels(fixed_labels(10, 5)), &cfg, 1).unwrap();
    let model = Arc::new(Gated::default());
    let started = Arc::clone(&model.started);
    let released = Arc::clone(&model.released);
    let token = CancellationToken::new();

    // Enough workers that every fold is spawned before any finishes.
    let evaluator = Evaluator::new(8).with_cancellation(token.clone());
    let evaluation = evaluator.evaluate(ds, Arc::new(plan), model, Arc::new(Metric::Rmse));
    let cancel = async {
        started.notified().await;
        token.cancel();
    };
    let (result, ()) = tokio::join!(evaluation, cancel);
    released.store(true, Ordering::SeqCst);

    assert!(matches!(result, Err(CvError::Cancelled)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_max_workers_bounds_concurrent_fits() {
    let ds = Arc::new(line(12));
    let cfg = PartitionConfig {
        folds: 6,
        ..PartitionConfig::default()
    };
    let plan = plan_folds(&ds, &FixedLabels(fixed_labels(12, 6)), &cfg, 1).unwrap();
    let model = Arc::new(Gated::default());
    model.released.store(true, Ordering::SeqCst);
    let peak = Arc::clone(&model.peak);

    let report = Evaluator::new(2)
        .evaluate(ds, Arc::new(plan), model, Arc::new(Metric::Rmse))
        .await
        .unwrap();

    assert_eq!(report.summary.n_scored, 6);
    let peak = peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak concurrency {peak}");
}

#[tokio::test]
async fn test_all_folds_failing_is_aggregate_failure() {
    let ds = Arc::new(smooth_field());
    let cfg = PartitionConfig::default();
    let plan = plan_folds(&ds, partitioner_for(&cfg).as_ref(), &cfg, 3).unwrap();

    let result = Evaluator::new(2)
        .evaluate(ds, Arc::new(plan), Arc::new(Broken), Arc::new(Metric::Rmse))
        .await;
    assert!(matches!(result, Err(CvError::AggregateFailure(_))));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let ds = Arc::new(smooth_field());
    let cfg = PartitionConfig::default();
    let plan = plan_folds(&ds, partitioner_for(&cfg).as_ref(), &cfg, 3).unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let result = Evaluator::new(2)
        .with_cancellation(token)
        .evaluate(ds, Arc::new(plan), Arc::new(NearestNeighbour), Arc::new(Metric::Rmse))
        .await;
    assert!(matches!(result, Err(CvError::Cancelled)));
}

// --- Partitioning ---

#[test]
fn test_two_separated_clusters_become_two_folds() {
    let ds = two_clusters();
    let cfg = PartitionConfig {
        method: PartitionMethod::Kmeans,
        folds: 2,
        ..PartitionConfig::default()
    };
    let plan = plan_folds(&ds, partitioner_for(&cfg).as_ref(), &cfg, 11).unwrap();
    let labels = plan.assignment.labels();

    assert!(labels[..50].iter().all(|&l| l == labels[0]));
    assert!(labels[50..].iter().all(|&l| l == labels[50]));
    assert_ne!(labels[0], labels[50]);
    assert_eq!(plan.assignment.fold_sizes(), vec![50, 50]);
}

#[test]
fn test_more_folds_than_locations_is_configuration_error() {
    let observations: Vec<Observation> = (0..30)
        .map(|i| {
            Observation::new(
                format!("o{i}"),
                Coordinate::new((i % 3) as f64 * 10.0, 0.0),
                vec![],
                Response::Continuous(i as f64),
            )
        })
        .collect();
    let ds = Dataset::new(vec![], observations).unwrap();
    let cfg = PartitionConfig {
        method: PartitionMethod::Kmeans,
        folds: 5,
        ..PartitionConfig::default()
    };
    let result = plan_folds(&ds, partitioner_for(&cfg).as_ref(), &cfg, 1);
    assert!(matches!(result, Err(CvError::Configuration(_))));
}

#[test]
fn test_buffer_swallowing_training_set_is_insufficient_data() {
    let ds = smooth_field();
    let cfg = PartitionConfig {
        buffer_distance: Some(1_000.0),
        ..PartitionConfig::default()
    };
    let result = plan_folds(&ds, partitioner_for(&cfg).as_ref(), &cfg, 1);
    assert!(matches!(result, Err(CvError::InsufficientData(_))));
}

// --- Orchestration ---

fn rmse_config(method: PartitionMethod, repetitions: usize) -> CvConfig {
    let mut config = CvConfig::default();
    config.partition.method = method;
    config.evaluation.metric = Metric::Rmse;
    config.evaluation.repetitions = repetitions;
    config
}

#[tokio::test]
async fn test_single_run_is_reproducible() {
    let cv = SpatialCrossValidation::new(rmse_config(PartitionMethod::Blocks, 1)).unwrap();
    let ds = Arc::new(smooth_field());
    let model = Arc::new(NearestNeighbour);

    let first = cv.run(ds.clone(), model.clone()).await.unwrap();
    let second = cv.run(ds, model).await.unwrap();

    assert_eq!(first.report.fingerprint, second.report.fingerprint);
    assert_eq!(first.report.scores(), second.report.scores());
    assert_ne!(first.run.id, second.run.id);
    assert!(first.run.status.is_terminal());
}

#[tokio::test]
async fn test_repeated_runs_use_derived_seeds() {
    let cv = SpatialCrossValidation::new(rmse_config(PartitionMethod::Kmeans, 3)).unwrap();
    let report = cv
        .run_repeated(Arc::new(smooth_field()), Arc::new(NearestNeighbour))
        .await
        .unwrap();

    let seeds: Vec<u64> = report.runs.iter().map(|r| r.report.seed).collect();
    assert_eq!(seeds, vec![42, 43, 44]);
    assert_eq!(report.summary.n_scored, 3);
    assert_eq!(report.pooled.n_scored, 15);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn test_random_folds_are_more_optimistic_on_autocorrelated_data() {
    let cv = SpatialCrossValidation::new(rmse_config(PartitionMethod::Kmeans, 2)).unwrap();
    let comparison = cv
        .compare(Arc::new(smooth_field()), Arc::new(NearestNeighbour))
        .await
        .unwrap();

    assert_eq!(comparison.random.method, PartitionMethod::Random);
    assert!(comparison.spatial.summary.mean > comparison.random.summary.mean);
    assert!(comparison.optimism > 0.0);
}

#[tokio::test]
async fn test_compare_rejects_random_method() {
    let cv = SpatialCrossValidation::new(rmse_config(PartitionMethod::Random, 1)).unwrap();
    let result = cv
        .compare(Arc::new(smooth_field()), Arc::new(NearestNeighbour))
        .await;
    assert!(matches!(result, Err(CvError::Configuration(_))));
}

#[tokio::test]
async fn test_run_observes_cancellation() {
    let token = CancellationToken::new();
    let cv = SpatialCrossValidation::new(rmse_config(PartitionMethod::Kmeans, 3))
        .unwrap()
        .with_cancellation(token.clone());
    token.cancel();

    let result = cv
        .run_repeated(Arc::new(smooth_field()), Arc::new(NearestNeighbour))
        .await;
    assert!(matches!(result, Err(CvError::Cancelled)));
}

#[tokio::test]
async fn test_logistic_glm_on_clustered_data() {
    let ds = Arc::new(two_clusters());
    let mut config = CvConfig::default();
    config.partition.method = PartitionMethod::Random;
    config.partition.folds = 4;
    let model = Arc::new(Glm::from_config(&config.model, &ds).unwrap());
    let cv = SpatialCrossValidation::new(config).unwrap();

    let outcome = cv.run(ds, model).await.unwrap();
    assert_eq!(outcome.report.model, "logistic");
    assert_eq!(outcome.report.metric, "auroc");
    // Response rises with elevation, so the fit should beat chance.
    assert!(outcome.report.summary.mean > 0.5);
}
