//! Data loading: observations, datasets, table sources, column mapping.

pub mod observation;
pub mod schema;
pub mod source;

pub use observation::{Coordinate, DataView, Dataset, Observation, PredictorValue, Response};
pub use schema::{ColumnMapping, ResponseKind};
pub use source::{CsvSource, DataBatch, DataSource, DataSourceType, JsonSource, JsonlSource};

use crate::error::CvError;

/// Load a dataset from a source using the given column mapping.
pub async fn load_dataset(
    source: &DataSourceType,
    mapping: &ColumnMapping,
) -> Result<Dataset, CvError> {
    let src = source.open();
    let info = src.source_info();
    let batch = src.load(None).await?;
    let dataset = mapping.to_dataset(&batch)?;
    tracing::info!(
        source = %info.source_type,
        location = %info.location,
        observations = dataset.len(),
        predictors = dataset.predictor_names().len(),
        "Loaded dataset"
    );
    Ok(dataset)
}
