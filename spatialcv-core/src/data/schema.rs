//! Column typing and the mapping from raw table columns to observations.

use crate::data::observation::{Coordinate, Dataset, Observation, PredictorValue, Response};
use crate::data::source::DataBatch;
use crate::error::CvError;
use serde::{Deserialize, Serialize};

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    String,
    Boolean,
    Null,
    Unknown,
}

/// Parse a raw cell into the most specific JSON value it represents.
/// Strings that look like numbers or booleans become numbers or booleans.
pub fn parse_cell(value: &serde_json::Value) -> serde_json::Value {
    let serde_json::Value::String(s) = value else {
        return value.clone();
    };
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("na") || s.eq_ignore_ascii_case("null") {
        return serde_json::Value::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return serde_json::Value::Number(i.into());
    }
    if let Ok(f) = s.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return serde_json::Value::Number(n);
        }
    }
    if let Some(b) = parse_bool(s) {
        return serde_json::Value::Bool(b);
    }
    serde_json::Value::String(s.to_string())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

/// Infer column type from a sample of parsed values.
pub fn infer_column_type(values: &[serde_json::Value]) -> ColumnType {
    let non_null: Vec<_> = values.iter().filter(|v| !v.is_null()).collect();
    if non_null.is_empty() {
        return ColumnType::Null;
    }

    let mut has_int = false;
    let mut has_float = false;
    let mut has_bool = false;
    let mut has_string = false;

    for v in &non_null {
        match v {
            serde_json::Value::Number(n) => {
                if n.is_f64() {
                    has_float = true;
                } else {
                    has_int = true;
                }
            }
            serde_json::Value::Bool(_) => has_bool = true,
            serde_json::Value::String(_) => has_string = true,
            _ => {}
        }
    }

    if has_string || (has_bool && (has_int || has_float)) {
        return ColumnType::String;
    }
    if has_float {
        return ColumnType::Float;
    }
    if has_int {
        return ColumnType::Integer;
    }
    if has_bool {
        return ColumnType::Boolean;
    }
    ColumnType::Unknown
}

/// How the response column should be interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// Binary when every value is a boolean token or 0/1, continuous otherwise.
    #[default]
    Auto,
    Binary,
    Continuous,
}

/// Which table columns hold coordinates, response, id, and predictors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(default = "default_x_column")]
    pub x: String,
    #[serde(default = "default_y_column")]
    pub y: String,
    #[serde(default = "default_response_column")]
    pub response: String,
    #[serde(default)]
    pub id: Option<String>,
    /// Predictor columns; every remaining column when unset.
    #[serde(default)]
    pub predictors: Option<Vec<String>>,
    /// Predictors forced to categorical even when their values parse as numbers.
    #[serde(default)]
    pub categorical: Vec<String>,
    #[serde(default)]
    pub response_kind: ResponseKind,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            x: default_x_column(),
            y: default_y_column(),
            response: default_response_column(),
            id: None,
            predictors: None,
            categorical: Vec::new(),
            response_kind: ResponseKind::Auto,
        }
    }
}

fn default_x_column() -> String {
    "x".to_string()
}

fn default_y_column() -> String {
    "y".to_string()
}

fn default_response_column() -> String {
    "lslpts".to_string()
}

impl ColumnMapping {
    /// Convert a raw batch into a validated dataset.
    pub fn to_dataset(&self, batch: &DataBatch) -> Result<Dataset, CvError> {
        let column = |name: &str| {
            batch
                .column_index(name)
                .ok_or_else(|| CvError::dataset(format!("column '{name}' not found")))
        };
        let x_idx = column(&self.x)?;
        let y_idx = column(&self.y)?;
        let resp_idx = column(&self.response)?;
        let id_idx = self.id.as_deref().map(column).transpose()?;

        let predictor_names: Vec<String> = match &self.predictors {
            Some(names) => names.clone(),
            None => batch
                .columns
                .iter()
                .enumerate()
                .filter(|(i, _)| {
                    *i != x_idx && *i != y_idx && *i != resp_idx && Some(*i) != id_idx
                })
                .map(|(_, name)| name.clone())
                .collect(),
        };
        let predictor_idx = predictor_names
            .iter()
            .map(|name| column(name))
            .collect::<Result<Vec<_>, _>>()?;

        let parsed: Vec<Vec<serde_json::Value>> = batch
            .rows
            .iter()
            .map(|row| row.iter().map(parse_cell).collect())
            .collect();

        let categorical: Vec<bool> = predictor_names
            .iter()
            .zip(&predictor_idx)
            .map(|(name, &j)| {
                if self.categorical.contains(name) {
                    return true;
                }
                let values: Vec<serde_json::Value> =
                    parsed.iter().map(|row| row[j].clone()).collect();
                matches!(
                    infer_column_type(&values),
                    ColumnType::String | ColumnType::Boolean
                )
            })
            .collect();

        let response_values: Vec<serde_json::Value> =
            parsed.iter().map(|row| row[resp_idx].clone()).collect();
        let binary = match self.response_kind {
            ResponseKind::Binary => true,
            ResponseKind::Continuous => false,
            ResponseKind::Auto => response_values.iter().all(|v| as_binary(v).is_some()),
        };

        let mut observations = Vec::with_capacity(parsed.len());
        for (row_no, row) in parsed.iter().enumerate() {
            let coord = Coordinate::new(
                numeric_cell(&row[x_idx], &self.x, row_no)?,
                numeric_cell(&row[y_idx], &self.y, row_no)?,
            );

            let response = if binary {
                Response::Binary(as_binary(&row[resp_idx]).ok_or_else(|| {
                    CvError::dataset(format!(
                        "row {row_no}: response '{}' is not binary",
                        row[resp_idx]
                    ))
                })?)
            } else {
                Response::Continuous(numeric_cell(&row[resp_idx], &self.response, row_no)?)
            };

            let mut predictors = Vec::with_capacity(predictor_idx.len());
            for (k, &j) in predictor_idx.iter().enumerate() {
                let value = if categorical[k] {
                    PredictorValue::Categorical(level_string(&row[j], &predictor_names[k], row_no)?)
                } else {
                    PredictorValue::Numeric(numeric_cell(&row[j], &predictor_names[k], row_no)?)
                };
                predictors.push(value);
            }

            let id = match id_idx {
                Some(j) => level_string(&row[j], "id", row_no)?,
                None => row_no.to_string(),
            };

            observations.push(Observation::new(id, coord, predictors, response));
        }

        Dataset::new(predictor_names, observations)
    }
}

fn as_binary(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(v) if v == 1.0 => Some(true),
            Some(v) if v == 0.0 => Some(false),
            _ => None,
        },
        serde_json::Value::String(s) => parse_bool(s),
        _ => None,
    }
}

fn numeric_cell(value: &serde_json::Value, column: &str, row_no: usize) -> Result<f64, CvError> {
    value
        .as_f64()
        .ok_or_else(|| CvError::dataset(format!("row {row_no}: column '{column}' is not numeric")))
}

fn level_string(value: &serde_json::Value, column: &str, row_no: usize) -> Result<String, CvError> {
    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        _ => Err(CvError::dataset(format!(
            "row {row_no}: column '{column}' is missing"
        ))),
    }
}
