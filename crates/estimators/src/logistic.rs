//! Multinomial logistic regression
//!
//! Softmax regression fitted by full-batch gradient descent on standardized
//! features, with an L2 penalty of strength `1 / C`.

use common::{Error, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::spec::LogisticRegressionParams;

/// Fitted logistic regression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    /// Per-feature mean used for standardization
    pub means: Array1<f64>,
    /// Per-feature scale used for standardization
    pub scales: Array1<f64>,
    /// Coefficients, `n_features x n_classes`
    pub coefficients: Array2<f64>,
    /// Per-class bias
    pub intercepts: Array1<f64>,
    /// Iterations actually run
    pub n_iter: usize,
}

impl LogisticModel {
    /// Fits on `x` with class indices `y` in `0..n_classes`
    pub fn fit(
        x: &Array2<f64>,
        y: &[usize],
        n_classes: usize,
        params: &LogisticRegressionParams,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let (n_samples, n_features) = x.dim();
        if n_samples == 0 || n_samples != y.len() {
            return Err(Error::TrainingFailure("no training rows".to_string()));
        }

        let means = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
        let scales = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        let xs = (x - &means) / &scales;

        let mut targets = Array2::<f64>::zeros((n_samples, n_classes));
        for (i, &class) in y.iter().enumerate() {
            targets[[i, class]] = 1.0;
        }

        let mut coefficients = Array2::<f64>::zeros((n_features, n_classes));
        let mut intercepts = Array1::<f64>::zeros(n_classes);
        let n = n_samples as f64;
        let penalty = 1.0 / (params.c * n);
        let mut n_iter = 0;

        for iter in 0..params.max_iter {
            if cancel.is_cancelled() {
                return Err(Error::TrainingFailure("training cancelled".to_string()));
            }
            n_iter = iter + 1;

            let probabilities = softmax(&(xs.dot(&coefficients) + &intercepts));
            let residual = probabilities - &targets;

            let grad_w = xs.t().dot(&residual) / n + &coefficients * penalty;
            coefficients.scaled_add(-params.learning_rate, &grad_w);

            let mut max_grad = grad_w.iter().fold(0.0_f64, |m, g| m.max(g.abs()));
            if params.fit_intercept {
                let grad_b = residual.sum_axis(Axis(0)) / n;
                intercepts.scaled_add(-params.learning_rate, &grad_b);
                max_grad = grad_b.iter().fold(max_grad, |m, g| m.max(g.abs()));
            }

            if !max_grad.is_finite() {
                return Err(Error::TrainingFailure(
                    "gradient diverged; lower learning_rate".to_string(),
                ));
            }
            if max_grad < params.tol {
                break;
            }
        }

        debug!(n_iter, n_samples, n_features, n_classes, "Logistic regression converged");

        Ok(Self {
            means,
            scales,
            coefficients,
            intercepts,
            n_iter,
        })
    }

    /// Most likely class index per row
    pub fn predict(&self, x: &Array2<f64>) -> Vec<usize> {
        let xs = (x - &self.means) / &self.scales;
        let scores = xs.dot(&self.coefficients) + &self.intercepts;
        scores
            .rows()
            .into_iter()
            .map(|row| argmax(row.iter().copied()))
            .collect()
    }
}

/// Row-wise softmax, shifted by the row maximum for stability
fn softmax(scores: &Array2<f64>) -> Array2<f64> {
    let mut out = scores.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
    out
}

/// Index of the largest value, first one on ties
pub(crate) fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn params() -> LogisticRegressionParams {
        LogisticRegressionParams {
            c: 1.0,
            max_iter: 200,
            learning_rate: 0.5,
            tol: 1e-6,
            fit_intercept: true,
            random_state: 0,
        }
    }

    #[test]
    fn test_separable_two_class() {
        let x = array![[0.0, 0.1], [0.2, 0.0], [0.1, 0.3], [5.0, 5.2], [5.3, 4.9], [4.8, 5.1]];
        let y = vec![0, 0, 0, 1, 1, 1];
        let model = LogisticModel::fit(&x, &y, 2, &params(), &CancellationToken::new()).unwrap();
        assert_eq!(model.predict(&x), y);
        assert_eq!(model.predict(&array![[0.0, 0.0], [6.0, 6.0]]), vec![0, 1]);
    }

    #[test]
    fn test_three_classes() {
        let x = array![[0.0], [0.1], [5.0], [5.1], [10.0], [10.1]];
        let y = vec![0, 0, 1, 1, 2, 2];
        let mut p = params();
        p.max_iter = 2000;
        p.c = 100.0;
        let model = LogisticModel::fit(&x, &y, 3, &p, &CancellationToken::new()).unwrap();
        assert_eq!(model.predict(&x), y);
    }

    #[test]
    fn test_constant_feature_does_not_break_scaling() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 9.0], [1.0, 10.0]];
        let y = vec![0, 0, 1, 1];
        let model = LogisticModel::fit(&x, &y, 2, &params(), &CancellationToken::new()).unwrap();
        assert_eq!(model.scales[0], 1.0);
        assert_eq!(model.predict(&x), y);
    }

    #[test]
    fn test_cancelled_fit() {
        let token = CancellationToken::new();
        token.cancel();
        let x = array![[0.0], [1.0]];
        let result = LogisticModel::fit(&x, &[0, 1], 2, &params(), &token);
        assert!(matches!(result, Err(Error::TrainingFailure(_))));
    }

    #[test]
    fn test_argmax_prefers_first_on_ties() {
        assert_eq!(argmax([1.0, 3.0, 3.0].into_iter()), 1);
        assert_eq!(argmax(std::iter::empty()), 0);
    }
}
