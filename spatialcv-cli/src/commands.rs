//! Subcommand handlers for the spatialcv CLI.

use crate::{Commands, ConfigAction, DataArgs, PartitionArgs, RunArgs};
use anyhow::Context;
use serde::Serialize;
use spatialcv_core::config::{CvConfig, load_config, workspace_config_path};
use spatialcv_core::data::{Dataset, load_dataset};
use spatialcv_core::evaluation::{CvReport, LoggingCallback};
use spatialcv_core::experiment::{Comparison, RepeatedCvReport, SpatialCrossValidation};
use spatialcv_core::metrics::Metric;
use spatialcv_core::models::Glm;
use spatialcv_core::partition::{partitioner_for, plan_folds};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => handle_run(args, workspace).await,
        Commands::Compare(args) => handle_compare(args, workspace).await,
        Commands::Partition {
            data,
            partition,
            output,
        } => handle_partition(&data, &partition, output.as_deref(), workspace).await,
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }

            let toml_str = toml::to_string_pretty(&CvConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Effective config: layered files and environment, then command-line flags.
fn resolve_config(
    workspace: &Path,
    apply: impl FnOnce(&mut CvConfig),
) -> anyhow::Result<CvConfig> {
    let mut config = load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    apply(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    Ok(config)
}

async fn load_input(config: &CvConfig) -> anyhow::Result<Arc<Dataset>> {
    let source = config
        .data
        .source
        .as_ref()
        .context("no input data: pass --data or set [data.source] in the config")?;
    let dataset = load_dataset(source, &config.data.columns).await?;
    Ok(Arc::new(dataset))
}

fn check_metric(metric: Metric, dataset: &Dataset) -> anyhow::Result<()> {
    let binary_metric = matches!(metric, Metric::Auroc | Metric::Accuracy);
    if binary_metric && !dataset.has_binary_response() {
        anyhow::bail!(
            "metric '{metric}' needs a binary response; use --metric rmse or --metric mae"
        );
    }
    Ok(())
}

/// Cancel the run on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling outstanding folds");
            child.cancel();
        }
    });
    token
}

async fn prepare(
    args: &RunArgs,
    workspace: &Path,
) -> anyhow::Result<(SpatialCrossValidation, Arc<Dataset>, Arc<Glm>)> {
    let config = resolve_config(workspace, |c| args.apply(c))?;
    let dataset = load_input(&config).await?;
    check_metric(config.evaluation.metric, &dataset)?;
    let model = Arc::new(Glm::from_config(&config.model, &dataset)?);
    let cv = SpatialCrossValidation::new(config)?
        .with_cancellation(cancel_on_ctrl_c())
        .with_callback(Arc::new(LoggingCallback));
    Ok((cv, dataset, model))
}

fn emit<T: Serialize>(
    value: &T,
    json: bool,
    output: Option<&Path>,
    human: impl FnOnce(&T) -> String,
) -> anyhow::Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(value)?)
            .with_context(|| format!("writing report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Wrote report");
    }
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", human(value));
    }
    Ok(())
}

async fn handle_run(args: RunArgs, workspace: &Path) -> anyhow::Result<()> {
    let (cv, dataset, model) = prepare(&args, workspace).await?;
    let report = cv.run_repeated(dataset, model).await?;
    emit(&report, args.json, args.output.as_deref(), format_repeated)
}

async fn handle_compare(args: RunArgs, workspace: &Path) -> anyhow::Result<()> {
    let (cv, dataset, model) = prepare(&args, workspace).await?;
    let comparison = cv.compare(dataset, model).await?;
    emit(
        &comparison,
        args.json,
        args.output.as_deref(),
        format_comparison,
    )
}

async fn handle_partition(
    data: &DataArgs,
    partition: &PartitionArgs,
    output: Option<&Path>,
    workspace: &Path,
) -> anyhow::Result<()> {
    let config = resolve_config(workspace, |c| {
        data.apply(c);
        partition.apply(c);
    })?;
    let dataset = load_input(&config).await?;
    let partitioner = partitioner_for(&config.partition);
    let plan = plan_folds(
        &dataset,
        partitioner.as_ref(),
        &config.partition,
        config.partition.seed,
    )?;

    let mut csv = String::from("id,fold\n");
    for (id, fold) in plan.assignment.iter() {
        let _ = writeln!(csv, "{id},{fold}");
    }
    match output {
        Some(path) => {
            std::fs::write(path, csv)
                .with_context(|| format!("writing assignment to {}", path.display()))?;
            println!(
                "Wrote {} assignments to {} (fold sizes {:?}, fingerprint {})",
                dataset.len(),
                path.display(),
                plan.assignment.fold_sizes(),
                &plan.fingerprint()[..12]
            );
        }
        None => print!("{csv}"),
    }
    Ok(())
}

fn format_report(report: &CvReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "  {} folds, seed {}, buffer {}",
        report.k,
        report.seed,
        report
            .buffer_distance
            .map(|d| d.to_string())
            .unwrap_or_else(|| "none".into())
    );
    for fold in &report.folds {
        let score = fold
            .score
            .map(|s| format!("{s:.4}"))
            .unwrap_or_else(|| "-".into());
        let _ = writeln!(
            out,
            "    fold {:>2}  train {:>6}  test {:>6}  buffered {:>6}  {} {}",
            fold.fold,
            fold.n_train,
            fold.n_test,
            fold.n_buffered,
            report.metric,
            score
        );
    }
    for warning in &report.warnings {
        let _ = writeln!(out, "    warning: {warning}");
    }
    out
}

fn format_repeated(report: &RepeatedCvReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} cross-validation, metric {} ({} is better)",
        report.method,
        report.metric,
        if report.higher_is_better {
            "higher"
        } else {
            "lower"
        }
    );
    for outcome in &report.runs {
        let _ = writeln!(out, "Repetition {}", outcome.run.repetition + 1);
        out.push_str(&format_report(&outcome.report));
    }
    for failure in &report.failures {
        let _ = writeln!(
            out,
            "Repetition {} failed (seed {}): {}",
            failure.repetition + 1,
            failure.seed,
            failure.error
        );
    }
    let _ = writeln!(
        out,
        "Mean {}: {:.4} (sd {:.4}, min {:.4}, max {:.4}) over {} repetition(s)",
        report.metric,
        report.summary.mean,
        report.summary.std_dev,
        report.summary.min,
        report.summary.max,
        report.summary.n_scored
    );
    out
}

fn format_comparison(comparison: &Comparison) -> String {
    let (spatial, random) = (&comparison.spatial, &comparison.random);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Spatial ({}): {:.4} (sd {:.4})",
        spatial.method, spatial.summary.mean, spatial.summary.std_dev
    );
    let _ = writeln!(
        out,
        "Random:  {:.4} (sd {:.4})",
        random.summary.mean, random.summary.std_dev
    );
    let verdict = if comparison.optimism > 0.0 {
        "random folds overestimate performance"
    } else {
        "no optimism from random folds"
    };
    let _ = writeln!(
        out,
        "Optimism in {}: {:+.4} ({verdict})",
        spatial.metric, comparison.optimism
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use spatialcv_core::data::{Coordinate, Observation, Response};

    #[test]
    fn test_check_metric_rejects_binary_metric_on_continuous() {
        let ds = Dataset::new(
            vec![],
            vec![Observation::new(
                "a",
                Coordinate::new(0.0, 0.0),
                vec![],
                Response::Continuous(1.0),
            )],
        )
        .unwrap();
        assert!(check_metric(Metric::Auroc, &ds).is_err());
        assert!(check_metric(Metric::Rmse, &ds).is_ok());
    }

    #[test]
    fn test_config_init_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        handle_config(ConfigAction::Init, dir.path()).unwrap();
        let path = workspace_config_path(dir.path());
        let written = std::fs::read_to_string(&path).unwrap();
        let parsed: CvConfig = toml::from_str(&written).unwrap();
        assert_eq!(parsed, CvConfig::default());

        std::fs::write(&path, "[partition]\nfolds = 3\n").unwrap();
        handle_config(ConfigAction::Init, dir.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[partition]\nfolds = 3\n"
        );
    }
}
