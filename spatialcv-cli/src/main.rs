//! spatialcv CLI: spatial cross-validation of point datasets from the terminal.

mod commands;

use clap::Parser;
use serde::de::DeserializeOwned;
use spatialcv_core::config::{CvConfig, PartitionMethod};
use spatialcv_core::data::{ColumnMapping, DataSourceType, ResponseKind};
use spatialcv_core::metrics::Metric;
use spatialcv_core::models::ModelKind;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Estimate how well a model generalizes to new locations.
#[derive(Parser, Debug)]
#[command(name = "spatialcv", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds .spatialcv/config.toml)
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run (repeated) cross-validation with the configured method
    Run(RunArgs),
    /// Compare spatial cross-validation against random folds
    Compare(RunArgs),
    /// Assign observations to folds without fitting anything
    Partition {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        partition: PartitionArgs,
        /// Write `id,fold` rows here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default workspace config file
    Init,
    /// Show the effective configuration
    Show,
}

/// Input table and column roles.
#[derive(clap::Args, Debug)]
struct DataArgs {
    /// Point table (.csv, .tsv, .json, .jsonl)
    #[arg(short, long)]
    data: Option<PathBuf>,
    /// Field delimiter for delimited text
    #[arg(long, default_value_t = ',')]
    delimiter: char,
    /// X coordinate column
    #[arg(long)]
    x: Option<String>,
    /// Y coordinate column
    #[arg(long)]
    y: Option<String>,
    /// Response column
    #[arg(long)]
    response: Option<String>,
    /// Observation id column (row number if unset)
    #[arg(long)]
    id: Option<String>,
    /// Predictor columns (every other column if unset)
    #[arg(long, value_delimiter = ',')]
    predictors: Option<Vec<String>>,
    /// Predictors to treat as categorical
    #[arg(long, value_delimiter = ',')]
    categorical: Vec<String>,
    /// Response interpretation: auto, binary, continuous
    #[arg(long, value_parser = parse_setting::<ResponseKind>)]
    response_kind: Option<ResponseKind>,
}

/// Partitioning overrides.
#[derive(clap::Args, Debug)]
struct PartitionArgs {
    /// Partition method: kmeans, blocks, random
    #[arg(short, long, value_parser = parse_setting::<PartitionMethod>)]
    method: Option<PartitionMethod>,
    /// Number of folds
    #[arg(short = 'k', long)]
    folds: Option<usize>,
    /// Buffer distance in coordinate units (0 disables)
    #[arg(short, long)]
    buffer: Option<f64>,
    /// Random seed
    #[arg(short, long)]
    seed: Option<u64>,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    data: DataArgs,
    #[command(flatten)]
    partition: PartitionArgs,
    /// Number of repetitions
    #[arg(short, long)]
    repetitions: Option<usize>,
    /// Model: auto, logistic, linear
    #[arg(long, value_parser = parse_setting::<ModelKind>)]
    model: Option<ModelKind>,
    /// Metric: auroc, accuracy, rmse, mae
    #[arg(long, value_parser = parse_setting::<Metric>)]
    metric: Option<Metric>,
    /// Maximum folds evaluated at once
    #[arg(long)]
    workers: Option<usize>,
    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
    /// Also write the JSON report to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Parse a config enum from its serialized (snake_case) name.
fn parse_setting<T: DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_ascii_lowercase()))
        .map_err(|_| format!("unrecognized value '{s}'"))
}

impl DataArgs {
    fn apply(&self, config: &mut CvConfig) {
        if let Some(path) = &self.data {
            config.data.source = Some(DataSourceType::from_path(path, self.delimiter));
        }
        let columns: &mut ColumnMapping = &mut config.data.columns;
        if let Some(x) = &self.x {
            columns.x = x.clone();
        }
        if let Some(y) = &self.y {
            columns.y = y.clone();
        }
        if let Some(response) = &self.response {
            columns.response = response.clone();
        }
        if self.id.is_some() {
            columns.id = self.id.clone();
        }
        if self.predictors.is_some() {
            columns.predictors = self.predictors.clone();
        }
        if !self.categorical.is_empty() {
            columns.categorical = self.categorical.clone();
        }
        if let Some(kind) = self.response_kind {
            columns.response_kind = kind;
        }
    }
}

impl PartitionArgs {
    fn apply(&self, config: &mut CvConfig) {
        let partition = &mut config.partition;
        if let Some(method) = self.method {
            partition.method = method;
        }
        if let Some(folds) = self.folds {
            partition.folds = folds;
        }
        if let Some(buffer) = self.buffer {
            partition.buffer_distance = Some(buffer);
        }
        if let Some(seed) = self.seed {
            partition.seed = seed;
        }
    }
}

impl RunArgs {
    fn apply(&self, config: &mut CvConfig) {
        self.data.apply(config);
        self.partition.apply(config);
        if let Some(r) = self.repetitions {
            config.evaluation.repetitions = r;
        }
        if let Some(model) = self.model {
            config.model.family = model;
        }
        if let Some(metric) = self.metric {
            config.evaluation.metric = metric;
        }
        if self.workers.is_some() {
            config.evaluation.max_workers = self.workers;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("org", "spatialcv", "spatialcv")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "spatialcv.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace).await
}
