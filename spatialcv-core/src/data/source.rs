//! Data source abstraction for loading point tables from CSV and JSON files.

use crate::error::CvError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The type of data source to load from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSourceType {
    Csv {
        path: PathBuf,
        #[serde(default = "default_delimiter")]
        delimiter: char,
    },
    Json {
        path: PathBuf,
    },
    Jsonl {
        path: PathBuf,
    },
}

fn default_delimiter() -> char {
    ','
}

impl DataSourceType {
    /// Pick a source type from the file extension, defaulting to CSV.
    pub fn from_path(path: &Path, delimiter: char) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("json") | Some("geojson") => Self::Json {
                path: path.to_path_buf(),
            },
            Some("jsonl") | Some("ndjson") => Self::Jsonl {
                path: path.to_path_buf(),
            },
            Some("tsv") => Self::Csv {
                path: path.to_path_buf(),
                delimiter: '\t',
            },
            _ => Self::Csv {
                path: path.to_path_buf(),
                delimiter,
            },
        }
    }

    pub fn open(&self) -> Box<dyn DataSource> {
        match self {
            Self::Csv { path, delimiter } => Box::new(CsvSource {
                path: path.clone(),
                delimiter: *delimiter,
            }),
            Self::Json { path } => Box::new(JsonSource { path: path.clone() }),
            Self::Jsonl { path } => Box::new(JsonlSource { path: path.clone() }),
        }
    }
}

/// A batch of raw table rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl DataBatch {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Information about where a batch came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceInfo {
    pub source_type: String,
    pub location: String,
    pub accessed_at: chrono::DateTime<chrono::Utc>,
}

/// Trait for loading tabular point data.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Load rows from this source, optionally limiting the number of rows.
    async fn load(&self, limit: Option<usize>) -> Result<DataBatch, CvError>;

    /// Metadata about this source.
    fn source_info(&self) -> DataSourceInfo;
}

// ---------------------------------------------------------------------------
// CsvSource
// ---------------------------------------------------------------------------

/// Delimited text file with a header row. Fields are not allowed to contain
/// the delimiter; surrounding quotes are stripped.
pub struct CsvSource {
    pub path: PathBuf,
    pub delimiter: char,
}

#[async_trait]
impl DataSource for CsvSource {
    async fn load(&self, limit: Option<usize>) -> Result<DataBatch, CvError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        parse_delimited(&content, self.delimiter, limit)
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "csv".to_string(),
            location: self.path.display().to_string(),
            accessed_at: chrono::Utc::now(),
        }
    }
}

/// Parse delimited text into a batch of string cells.
pub fn parse_delimited(
    content: &str,
    delimiter: char,
    limit: Option<usize>,
) -> Result<DataBatch, CvError> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());

    let columns: Vec<String> = lines
        .next()
        .ok_or_else(|| CvError::dataset("Empty CSV file"))?
        .split(delimiter)
        .map(|s| s.trim().trim_matches('"').to_string())
        .collect();

    let mut rows = Vec::new();
    for (line_no, line) in lines.enumerate() {
        if let Some(max) = limit {
            if rows.len() >= max {
                break;
            }
        }
        let row: Vec<serde_json::Value> = line
            .split(delimiter)
            .map(|s| serde_json::Value::String(s.trim().trim_matches('"').to_string()))
            .collect();
        if row.len() != columns.len() {
            return Err(CvError::dataset(format!(
                "row {} has {} fields, header has {}",
                line_no + 2,
                row.len(),
                columns.len()
            )));
        }
        rows.push(row);
    }

    Ok(DataBatch { columns, rows })
}

// ---------------------------------------------------------------------------
// JsonSource
// ---------------------------------------------------------------------------

/// JSON file holding an array of flat objects (or a single object).
pub struct JsonSource {
    pub path: PathBuf,
}

#[async_trait]
impl DataSource for JsonSource {
    async fn load(&self, limit: Option<usize>) -> Result<DataBatch, CvError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let value: serde_json::Value = serde_json::from_str(&content)?;

        let items = match value {
            serde_json::Value::Array(arr) => arr,
            obj @ serde_json::Value::Object(_) => vec![obj],
            _ => return Err(CvError::dataset("JSON must be an array or object")),
        };

        let limited: Vec<_> = match limit {
            Some(max) => items.into_iter().take(max).collect(),
            None => items,
        };

        Ok(records_to_batch(&limited))
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "json".to_string(),
            location: self.path.display().to_string(),
            accessed_at: chrono::Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// JsonlSource
// ---------------------------------------------------------------------------

/// JSON Lines file, one object per line.
pub struct JsonlSource {
    pub path: PathBuf,
}

#[async_trait]
impl DataSource for JsonlSource {
    async fn load(&self, limit: Option<usize>) -> Result<DataBatch, CvError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let mut items = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(max) = limit {
                if items.len() >= max {
                    break;
                }
            }
            items.push(serde_json::from_str::<serde_json::Value>(line)?);
        }
        Ok(records_to_batch(&items))
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "jsonl".to_string(),
            location: self.path.display().to_string(),
            accessed_at: chrono::Utc::now(),
        }
    }
}

/// Columns are taken from the first record; missing keys become null.
fn records_to_batch(items: &[serde_json::Value]) -> DataBatch {
    let columns: Vec<String> = match items.first() {
        Some(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
        Some(_) => vec!["value".to_string()],
        None => return DataBatch::empty(),
    };

    let rows = items
        .iter()
        .map(|item| {
            columns
                .iter()
                .map(|col| item.get(col).cloned().unwrap_or(serde_json::Value::Null))
                .collect()
        })
        .collect();

    DataBatch { columns, rows }
}
