//! Penalised logistic regression fitted by accelerated proximal gradient

use crate::error::{ChurnError, Result};
use crate::model::Penalty;
use ndarray::{Array1, Array2, Zip};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hyperparameters of the logistic candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticParams {
    pub penalty: Penalty,
    /// Inverse regularisation strength
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
}

/// Fitted coefficients and intercept; the intercept is never penalised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub params: LogisticParams,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub iterations: usize,
}

fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
    z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

/// Soft-threshold operator for the L1 proximal step
fn soft_threshold(val: f64, threshold: f64) -> f64 {
    if val > threshold {
        val - threshold
    } else if val < -threshold {
        val + threshold
    } else {
        0.0
    }
}

impl LogisticModel {
    /// Minimise mean log-loss plus `λ·penalty(w)` with `λ = 1 / (C·n)`.
    pub fn fit(params: LogisticParams, x: &Array2<f64>, y: &Array1<usize>) -> Result<Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_samples == 0 || n_samples != y.len() {
            return Err(ChurnError::Training(format!(
                "logistic regression needs matching rows and labels (got {} and {})",
                n_samples,
                y.len()
            )));
        }
        if !(params.c > 0.0) {
            return Err(ChurnError::Training(format!("C must be positive, got {}", params.c)));
        }

        let targets = y.mapv(|label| label as f64);
        let lambda = 1.0 / (params.c * n_samples as f64);

        // Lipschitz bound of the log-loss gradient, intercept column included
        let max_row_norm = x
            .rows()
            .into_iter()
            .map(|row| row.dot(&row))
            .fold(0.0_f64, f64::max);
        let lipschitz = 0.25 * (max_row_norm + 1.0);
        let step = 1.0 / lipschitz;

        let mut weights = Array1::<f64>::zeros(n_features);
        let mut bias = 0.0;
        let mut momentum_w = weights.clone();
        let mut momentum_b = bias;
        let mut t = 1.0_f64;
        let mut iterations = 0;

        for iter in 0..params.max_iter {
            iterations = iter + 1;
            let predictions = sigmoid(&(x.dot(&momentum_w) + momentum_b));
            let errors = &predictions - &targets;
            let grad_w = x.t().dot(&errors) / n_samples as f64;
            let grad_b = errors.mean().unwrap_or(0.0);

            let candidate = &momentum_w - &(step * &grad_w);
            let next_w = match params.penalty {
                Penalty::L1 => candidate.mapv(|v| soft_threshold(v, step * lambda)),
                Penalty::L2 => candidate / (1.0 + step * lambda),
            };
            let next_b = momentum_b - step * grad_b;

            let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
            let blend = (t - 1.0) / t_next;

            let mut delta = (next_b - bias).abs();
            Zip::from(&next_w).and(&weights).for_each(|a, b| delta = delta.max((a - b).abs()));

            momentum_w = &next_w + &(blend * (&next_w - &weights));
            momentum_b = next_b + blend * (next_b - bias);
            weights = next_w;
            bias = next_b;
            t = t_next;

            if delta < params.tol {
                break;
            }
        }

        if !bias.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(ChurnError::Computation("logistic regression diverged".to_string()));
        }

        debug!(penalty = ?params.penalty, c = params.c, iterations, "Logistic regression fitted");
        Ok(Self {
            params,
            coefficients: weights.to_vec(),
            intercept: bias,
            iterations,
        })
    }

    /// Churn probability for each row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.coefficients.len() {
            return Err(ChurnError::Schema(format!(
                "logistic model expects {} features, got {}",
                self.coefficients.len(),
                x.ncols()
            )));
        }
        let coefficients = Array1::from(self.coefficients.clone());
        Ok(sigmoid(&(x.dot(&coefficients) + self.intercept)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn params(penalty: Penalty, c: f64) -> LogisticParams {
        LogisticParams {
            penalty,
            c,
            max_iter: 500,
            tol: 1e-6,
        }
    }

    fn binary_data() -> (Array2<f64>, Array1<usize>) {
        let x = array![
            [0.0, 1.0],
            [0.0, 0.0],
            [1.0, 1.0],
            [0.0, 1.0],
            [1.0, 0.0],
            [1.0, 1.0],
            [1.0, 0.0],
            [0.0, 0.0]
        ];
        let y = array![0, 0, 1, 0, 1, 1, 1, 0];
        (x, y)
    }

    #[test]
    fn test_soft_threshold() {
        assert_eq!(soft_threshold(3.0, 1.0), 2.0);
        assert_eq!(soft_threshold(-3.0, 1.0), -2.0);
        assert_eq!(soft_threshold(0.5, 1.0), 0.0);
    }

    #[test]
    fn test_logistic_learns_signal() {
        let (x, y) = binary_data();
        let model = LogisticModel::fit(params(Penalty::L2, 10.0), &x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap();

        assert!(model.coefficients[0] > 0.0);
        assert!(proba[2] > 0.5);
        assert!(proba[1] < 0.5);
    }

    #[test]
    fn test_strong_l1_zeroes_coefficients() {
        let (x, y) = binary_data();
        let model = LogisticModel::fit(params(Penalty::L1, 0.001), &x, &y).unwrap();
        assert!(model.coefficients.iter().all(|w| *w == 0.0));

        let proba = model.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (p - 0.5).abs() < 1e-3));
    }

    #[test]
    fn test_rejects_wrong_width() {
        let (x, y) = binary_data();
        let model = LogisticModel::fit(params(Penalty::L1, 1.0), &x, &y).unwrap();
        assert!(model.predict_proba(&array![[1.0]]).is_err());
    }
}
