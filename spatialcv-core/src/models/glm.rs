//! Generalized linear models: binomial (logit link) fitted by iteratively
//! reweighted least squares, and Gaussian (identity link) by least squares.

use super::ModelFamily;
use super::design::DesignEncoder;
use super::linalg::{Matrix, solve};
use crate::data::{DataView, Response};
use crate::error::CvError;
use serde::{Deserialize, Serialize};

const MU_EPS: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlmFamily {
    /// Binary response, logit link; predictions are probabilities.
    Binomial,
    /// Continuous response, identity link.
    Gaussian,
}

/// GLM settings; fitting produces a [`GlmFit`].
#[derive(Debug, Clone, PartialEq)]
pub struct Glm {
    pub family: GlmFamily,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Glm {
    pub fn logistic() -> Self {
        Self {
            family: GlmFamily::Binomial,
            max_iterations: 25,
            tolerance: 1e-8,
        }
    }

    pub fn linear() -> Self {
        Self {
            family: GlmFamily::Gaussian,
            max_iterations: 1,
            tolerance: 1e-8,
        }
    }
}

/// Fitted coefficients plus the encoder they apply to.
///
/// `coefficients` are on the raw predictor scale (intercept first). The
/// fit itself is solved on standardized columns and predicts from those.
#[derive(Debug, Clone)]
pub struct GlmFit {
    pub family: GlmFamily,
    pub coefficients: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
    encoder: DesignEncoder,
    beta: Vec<f64>,
}

impl GlmFit {
    fn new(
        family: GlmFamily,
        beta: Vec<f64>,
        iterations: usize,
        converged: bool,
        encoder: DesignEncoder,
    ) -> Self {
        Self {
            family,
            coefficients: encoder.unscale(&beta),
            iterations,
            converged,
            encoder,
            beta,
        }
    }

    fn linear_predictor(&self, row: &[f64]) -> f64 {
        row.iter().zip(&self.beta).map(|(x, b)| x * b).sum()
    }
}

fn sigmoid(eta: f64) -> f64 {
    1.0 / (1.0 + (-eta).exp())
}

fn binomial_deviance(y: &[f64], mu: &[f64]) -> f64 {
    -2.0 * y
        .iter()
        .zip(mu)
        .map(|(&yi, &mi)| {
            let m = mi.clamp(MU_EPS, 1.0 - MU_EPS);
            yi * m.ln() + (1.0 - yi) * (1.0 - m).ln()
        })
        .sum::<f64>()
}

/// Solve the weighted normal equations `XᵀWX β = XᵀWz`.
fn weighted_least_squares(
    rows: &[Vec<f64>],
    weights: &[f64],
    z: &[f64],
    width: usize,
) -> Result<Vec<f64>, CvError> {
    let mut xtwx = Matrix::zeros(width);
    let mut xtwz = vec![0.0; width];
    for ((row, &w), &zi) in rows.iter().zip(weights).zip(z) {
        xtwx.add_outer(row, w);
        for (acc, &x) in xtwz.iter_mut().zip(row) {
            *acc += w * x * zi;
        }
    }
    solve(&xtwx, &xtwz).ok_or_else(|| {
        CvError::fit("design matrix is singular (collinear or constant predictors)")
    })
}

impl ModelFamily for Glm {
    type Fitted = GlmFit;

    fn name(&self) -> &str {
        match self.family {
            GlmFamily::Binomial => "logistic",
            GlmFamily::Gaussian => "linear",
        }
    }

    fn fit(&self, train: &DataView<'_>) -> Result<GlmFit, CvError> {
        let encoder = DesignEncoder::learn(train)?;
        let width = encoder.width();
        if train.len() < width {
            return Err(CvError::fit(format!(
                "{} training observations for {width} coefficients",
                train.len()
            )));
        }
        let rows = train
            .iter()
            .map(|o| encoder.encode(o))
            .collect::<Result<Vec<_>, _>>()?;

        match self.family {
            GlmFamily::Gaussian => {
                let y = train
                    .iter()
                    .map(|o| match o.response {
                        Response::Continuous(v) if v.is_finite() => Ok(v),
                        Response::Continuous(_) => Err(CvError::fit("non-finite response")),
                        Response::Binary(b) => Ok(if b { 1.0 } else { 0.0 }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let weights = vec![1.0; y.len()];
                let beta = weighted_least_squares(&rows, &weights, &y, width)?;
                Ok(GlmFit::new(self.family, beta, 1, true, encoder))
            }
            GlmFamily::Binomial => {
                let y = train
                    .iter()
                    .map(|o| {
                        o.response
                            .as_bool()
                            .map(|b| if b { 1.0 } else { 0.0 })
                            .ok_or_else(|| CvError::fit("logistic regression needs a binary response"))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let positives = y.iter().filter(|&&v| v == 1.0).count();
                if positives == 0 || positives == y.len() {
                    return Err(CvError::fit(
                        "training set contains a single response class",
                    ));
                }
                self.irls(rows, &y, width, encoder)
            }
        }
    }

    fn predict(&self, fitted: &GlmFit, test: &DataView<'_>) -> Result<Vec<f64>, CvError> {
        test.iter()
            .map(|o| {
                let eta = fitted.linear_predictor(&fitted.encoder.encode(o)?);
                Ok(match fitted.family {
                    GlmFamily::Binomial => sigmoid(eta),
                    GlmFamily::Gaussian => eta,
                })
            })
            .collect()
    }
}

impl Glm {
    fn irls(
        &self,
        rows: Vec<Vec<f64>>,
        y: &[f64],
        width: usize,
        encoder: DesignEncoder,
    ) -> Result<GlmFit, CvError> {
        // Start each mean halfway between its response and 0.5.
        let mut mu: Vec<f64> = y.iter().map(|&yi| (yi + 0.5) / 2.0).collect();
        let mut eta: Vec<f64> = mu.iter().map(|&m| (m / (1.0 - m)).ln()).collect();
        let mut deviance = binomial_deviance(y, &mu);
        let mut beta = vec![0.0; width];
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;
            let weights: Vec<f64> = mu.iter().map(|&m| (m * (1.0 - m)).max(MU_EPS)).collect();
            let z: Vec<f64> = eta
                .iter()
                .zip(y)
                .zip(&mu)
                .zip(&weights)
                .map(|(((&e, &yi), &m), &w)| e + (yi - m) / w)
                .collect();

            beta = weighted_least_squares(&rows, &weights, &z, width)?;
            eta = rows
                .iter()
                .map(|r| r.iter().zip(&beta).map(|(x, b)| x * b).sum())
                .collect();
            mu = eta.iter().map(|&e| sigmoid(e)).collect();

            let next = binomial_deviance(y, &mu);
            if !next.is_finite() {
                return Err(CvError::fit("deviance diverged"));
            }
            let change = (next - deviance).abs() / (next.abs() + 0.1);
            deviance = next;
            if change < self.tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            tracing::warn!(
                iterations,
                deviance,
                "Logistic regression did not converge; fitted probabilities may be 0 or 1"
            );
        }

        Ok(GlmFit::new(
            GlmFamily::Binomial,
            beta,
            iterations,
            converged,
            encoder,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Coordinate, Dataset, Observation, PredictorValue};

    fn dataset(points: &[(f64, Response)]) -> Dataset {
        let obs = points
            .iter()
            .enumerate()
            .map(|(i, (x, r))| {
                Observation::new(
                    i.to_string(),
                    Coordinate::new(i as f64, 0.0),
                    vec![PredictorValue::Numeric(*x)],
                    *r,
                )
            })
            .collect();
        Dataset::new(vec!["slope".into()], obs).unwrap()
    }

    #[test]
    fn test_linear_exact_fit() {
        let pts: Vec<(f64, Response)> = (0..10)
            .map(|i| (i as f64, Response::Continuous(3.0 + 2.0 * i as f64)))
            .collect();
        let ds = dataset(&pts);
        let idx: Vec<usize> = (0..10).collect();
        let view = ds.view(&idx);
        let glm = Glm::linear();
        let fit = glm.fit(&view).unwrap();
        assert!((fit.coefficients[0] - 3.0).abs() < 1e-9);
        assert!((fit.coefficients[1] - 2.0).abs() < 1e-9);
        let preds = glm.predict(&fit, &view).unwrap();
        assert!((preds[4] - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_logistic_recovers_direction() {
        // Overlapping classes: positives more likely at high slope.
        let pts: Vec<(f64, Response)> = (0..40)
            .map(|i| {
                let x = i as f64 / 4.0;
                let positive = if i % 5 == 0 { i < 20 } else { i >= 20 };
                (x, Response::Binary(positive))
            })
            .collect();
        let ds = dataset(&pts);
        let idx: Vec<usize> = (0..40).collect();
        let view = ds.view(&idx);
        let glm = Glm::logistic();
        let fit = glm.fit(&view).unwrap();
        assert!(fit.converged);
        assert!(fit.coefficients[1] > 0.0);
        let preds = glm.predict(&fit, &view).unwrap();
        assert!(preds.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(preds[39] > preds[0]);
    }

    #[test]
    fn test_logistic_single_class_fails() {
        let pts: Vec<(f64, Response)> = (0..10)
            .map(|i| (i as f64, Response::Binary(true)))
            .collect();
        let ds = dataset(&pts);
        let idx: Vec<usize> = (0..10).collect();
        let err = Glm::logistic().fit(&ds.view(&idx)).unwrap_err();
        assert!(matches!(err, CvError::FitFailure(_)));
    }

    #[test]
    fn test_constant_predictor_is_singular() {
        let pts: Vec<(f64, Response)> = (0..10)
            .map(|i| (1.0, Response::Continuous(i as f64)))
            .collect();
        let ds = dataset(&pts);
        let idx: Vec<usize> = (0..10).collect();
        let err = Glm::linear().fit(&ds.view(&idx)).unwrap_err();
        assert!(matches!(err, CvError::FitFailure(_)));
    }

    #[test]
    fn test_large_offset_predictor_is_not_singular() {
        // Northings around 9.56e6 m with a 10 m spacing.
        let fit_with_offset = |offset: f64| {
            let pts: Vec<(f64, Response)> = (0..100)
                .map(|i| {
                    let positive = if i % 7 == 0 { i < 50 } else { i >= 50 };
                    (offset + 10.0 * i as f64, Response::Binary(positive))
                })
                .collect();
            let ds = dataset(&pts);
            let idx: Vec<usize> = (0..100).collect();
            let glm = Glm::logistic();
            let fit = glm.fit(&ds.view(&idx)).unwrap();
            let preds = glm.predict(&fit, &ds.view(&idx)).unwrap();
            (fit, preds)
        };

        let (plain, plain_preds) = fit_with_offset(0.0);
        let (shifted, shifted_preds) = fit_with_offset(9_560_000.0);
        assert!(shifted.converged);
        assert!((shifted.coefficients[1] - plain.coefficients[1]).abs() < 1e-8);
        for (a, b) in plain_preds.iter().zip(&shifted_preds) {
            assert!((a - b).abs() < 1e-8);
        }
    }

    #[test]
    fn test_linear_large_offset_raw_coefficients() {
        let pts: Vec<(f64, Response)> = (0..20)
            .map(|i| {
                let x = 9_560_000.0 + 5.0 * i as f64;
                (x, Response::Continuous(0.5 * (x - 9_560_000.0) + 1.0))
            })
            .collect();
        let ds = dataset(&pts);
        let idx: Vec<usize> = (0..20).collect();
        let fit = Glm::linear().fit(&ds.view(&idx)).unwrap();
        assert!((fit.coefficients[1] - 0.5).abs() < 1e-9);
        let preds = Glm::linear().predict(&fit, &ds.view(&idx)).unwrap();
        assert!((preds[19] - 48.5).abs() < 1e-6);
    }

    #[test]
    fn test_too_few_observations() {
        let pts = vec![(1.0, Response::Continuous(1.0))];
        let ds = dataset(&pts);
        let err = Glm::linear().fit(&ds.view(&[0])).unwrap_err();
        assert!(matches!(err, CvError::FitFailure(_)));
    }
}
