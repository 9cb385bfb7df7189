//! Observations, the immutable dataset they live in, and borrowed views over it.

use crate::error::CvError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A planar coordinate. Distances are Euclidean, so data should be in a
/// projected coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Coordinate) -> f64 {
        self.distance_squared(other).sqrt()
    }

    pub fn distance_squared(&self, other: &Coordinate) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A single predictor value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictorValue {
    Numeric(f64),
    Categorical(String),
}

impl PredictorValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Numeric(v) => Some(*v),
            Self::Categorical(_) => None,
        }
    }

    pub fn as_level(&self) -> Option<&str> {
        match self {
            Self::Numeric(_) => None,
            Self::Categorical(level) => Some(level),
        }
    }
}

/// Response label of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Binary(bool),
    Continuous(f64),
}

impl Response {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Binary(true) => 1.0,
            Self::Binary(false) => 0.0,
            Self::Continuous(v) => *v,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Binary(b) => Some(*b),
            Self::Continuous(_) => None,
        }
    }
}

/// A labelled spatial point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub coord: Coordinate,
    pub predictors: Vec<PredictorValue>,
    pub response: Response,
}

impl Observation {
    pub fn new(
        id: impl Into<String>,
        coord: Coordinate,
        predictors: Vec<PredictorValue>,
        response: Response,
    ) -> Self {
        Self {
            id: id.into(),
            coord,
            predictors,
            response,
        }
    }
}

/// An immutable, validated collection of observations sharing one predictor layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    predictor_names: Vec<String>,
    observations: Vec<Observation>,
}

impl Dataset {
    /// Build a dataset, checking that ids are unique, every observation has
    /// one value per predictor, and a predictor never mixes numeric and
    /// categorical values.
    pub fn new(
        predictor_names: Vec<String>,
        observations: Vec<Observation>,
    ) -> Result<Self, CvError> {
        let mut seen = HashSet::with_capacity(observations.len());
        for obs in &observations {
            if !seen.insert(obs.id.as_str()) {
                return Err(CvError::dataset(format!(
                    "duplicate observation id '{}'",
                    obs.id
                )));
            }
            if obs.predictors.len() != predictor_names.len() {
                return Err(CvError::dataset(format!(
                    "observation '{}' has {} predictor values, expected {}",
                    obs.id,
                    obs.predictors.len(),
                    predictor_names.len()
                )));
            }
        }

        for (j, name) in predictor_names.iter().enumerate() {
            let mut numeric = false;
            let mut categorical = false;
            for obs in &observations {
                match obs.predictors[j] {
                    PredictorValue::Numeric(_) => numeric = true,
                    PredictorValue::Categorical(_) => categorical = true,
                }
            }
            if numeric && categorical {
                return Err(CvError::dataset(format!(
                    "predictor '{name}' mixes numeric and categorical values"
                )));
            }
        }

        Ok(Self {
            predictor_names,
            observations,
        })
    }

    pub fn predictor_names(&self) -> &[String] {
        &self.predictor_names
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn get(&self, index: usize) -> Option<&Observation> {
        self.observations.get(index)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.observations.iter().map(|o| o.coord).collect()
    }

    /// True when every response is binary.
    pub fn has_binary_response(&self) -> bool {
        !self.observations.is_empty()
            && self
                .observations
                .iter()
                .all(|o| matches!(o.response, Response::Binary(_)))
    }

    /// Borrow a subset of observations by index.
    pub fn view<'a>(&'a self, indices: &'a [usize]) -> DataView<'a> {
        DataView {
            dataset: self,
            indices,
        }
    }
}

/// A borrowed subset of a [`Dataset`], used as model training or test input.
#[derive(Debug, Clone, Copy)]
pub struct DataView<'a> {
    dataset: &'a Dataset,
    indices: &'a [usize],
}

impl<'a> DataView<'a> {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn predictor_names(&self) -> &'a [String] {
        &self.dataset.predictor_names
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Observation> + 'a {
        let dataset = self.dataset;
        self.indices.iter().map(move |&i| &dataset.observations[i])
    }

    pub fn responses(&self) -> Vec<Response> {
        self.iter().map(|o| o.response).collect()
    }
}
