//! Design-matrix encoding: intercept, standardized numeric columns, and
//! treatment-coded categorical predictors.

use crate::data::{DataView, Observation, PredictorValue};
use crate::error::CvError;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
enum Term {
    /// Centred on the training mean and divided by the training sample
    /// standard deviation. A constant column keeps scale 1 and so encodes
    /// as all zeros.
    Numeric { mean: f64, scale: f64 },
    /// Non-reference levels, each encoded as one indicator column. The
    /// reference (first sorted) level and levels unseen at fit time encode
    /// as all zeros.
    Categorical(Vec<String>),
}

/// Column layout learned from a training set and reused for its test set.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignEncoder {
    terms: Vec<Term>,
    width: usize,
}

impl DesignEncoder {
    pub fn learn(train: &DataView<'_>) -> Result<Self, CvError> {
        let n_predictors = train.predictor_names().len();
        let mut terms = Vec::with_capacity(n_predictors);
        for j in 0..n_predictors {
            let mut levels = BTreeSet::new();
            let mut values = Vec::new();
            for obs in train.iter() {
                match &obs.predictors[j] {
                    PredictorValue::Numeric(v) => {
                        if !v.is_finite() {
                            return Err(CvError::fit(format!(
                                "predictor '{}' of observation '{}' is not finite",
                                train.predictor_names()[j],
                                obs.id
                            )));
                        }
                        values.push(*v);
                    }
                    PredictorValue::Categorical(level) => {
                        levels.insert(level.clone());
                    }
                }
            }
            if !values.is_empty() {
                let (mean, scale) = mean_and_scale(&values);
                terms.push(Term::Numeric { mean, scale });
            } else {
                terms.push(Term::Categorical(levels.into_iter().skip(1).collect()));
            }
        }

        let width = 1 + terms
            .iter()
            .map(|t| match t {
                Term::Numeric { .. } => 1,
                Term::Categorical(levels) => levels.len(),
            })
            .sum::<usize>();
        Ok(Self { terms, width })
    }

    /// Number of columns including the intercept.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn encode(&self, obs: &Observation) -> Result<Vec<f64>, CvError> {
        let mut row = Vec::with_capacity(self.width);
        row.push(1.0);
        for (term, value) in self.terms.iter().zip(&obs.predictors) {
            match (term, value) {
                (Term::Numeric { mean, scale }, PredictorValue::Numeric(v)) => {
                    row.push((v - mean) / scale);
                }
                (Term::Categorical(levels), PredictorValue::Categorical(level)) => {
                    row.extend(levels.iter().map(|l| if l == level { 1.0 } else { 0.0 }));
                }
                _ => {
                    return Err(CvError::fit(format!(
                        "observation '{}' does not match the training predictor layout",
                        obs.id
                    )));
                }
            }
        }
        Ok(row)
    }

    /// Map coefficients of the encoded columns back onto the raw predictor
    /// scale. Categorical indicator coefficients are unchanged.
    pub fn unscale(&self, beta: &[f64]) -> Vec<f64> {
        let mut raw = beta.to_vec();
        let mut col = 1;
        for term in &self.terms {
            match term {
                Term::Numeric { mean, scale } => {
                    raw[col] = beta[col] / scale;
                    raw[0] -= beta[col] * mean / scale;
                    col += 1;
                }
                Term::Categorical(levels) => col += levels.len(),
            }
        }
        raw
    }
}

fn mean_and_scale(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 1.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let sd = var.sqrt();
    (mean, if sd > 0.0 && sd.is_finite() { sd } else { 1.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Coordinate, Dataset, Response};

    fn dataset() -> Dataset {
        let mk = |id: &str, slope: f64, lith: &str| {
            Observation::new(
                id,
                Coordinate::new(0.0, 0.0),
                vec![
                    PredictorValue::Numeric(slope),
                    PredictorValue::Categorical(lith.into()),
                ],
                Response::Binary(true),
            )
        };
        Dataset::new(
            vec!["slope".into(), "lithology".into()],
            vec![
                mk("a", 10.0, "schist"),
                mk("b", 20.0, "granite"),
                mk("c", 30.0, "marl"),
                mk("d", 40.0, "basalt"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_treatment_coding() {
        let ds = dataset();
        let idx = [0, 1, 2];
        let enc = DesignEncoder::learn(&ds.view(&idx)).unwrap();
        // levels granite (reference), marl, schist; slope mean 20, sd 10
        assert_eq!(enc.width(), 4);
        assert_eq!(enc.encode(&ds.observations()[0]).unwrap(), vec![1.0, -1.0, 0.0, 1.0]);
        assert_eq!(enc.encode(&ds.observations()[1]).unwrap(), vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(enc.encode(&ds.observations()[2]).unwrap(), vec![1.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_unseen_level_encodes_as_reference() {
        let ds = dataset();
        let idx = [0, 1, 2];
        let enc = DesignEncoder::learn(&ds.view(&idx)).unwrap();
        assert_eq!(enc.encode(&ds.observations()[3]).unwrap(), vec![1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_unscale_recovers_raw_coefficients() {
        let ds = dataset();
        let idx = [0, 1, 2];
        let enc = DesignEncoder::learn(&ds.view(&idx)).unwrap();
        // 1 + 0.5 * z_slope + 3 * marl  ==  -0 + 0.05 * slope + 3 * marl
        let raw = enc.unscale(&[1.0, 0.5, 3.0, 0.0]);
        assert!((raw[0] - 0.0).abs() < 1e-12);
        assert!((raw[1] - 0.05).abs() < 1e-12);
        assert_eq!(&raw[2..], &[3.0, 0.0]);
    }

    #[test]
    fn test_constant_column_encodes_as_zero() {
        let ds = dataset();
        let idx = [0];
        let enc = DesignEncoder::learn(&ds.view(&idx)).unwrap();
        assert_eq!(enc.encode(&ds.observations()[0]).unwrap(), vec![1.0, 0.0]);
    }
}
