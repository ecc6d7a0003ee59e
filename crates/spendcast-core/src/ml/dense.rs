//! Single-hidden-layer feed-forward regressor
//!
//! ReLU hidden layer, linear output, MSE loss with L2 weight penalty,
//! trained with Adam. Targets are normalized internally; the normalization
//! is fixed the first time the model is fit so later fine-tuning on a
//! user's much smaller history shifts weights, not the output scale.

use ndarray::{Array, Array1, Array2, Axis, Dimension, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{FeatureRow, Regressor};
use crate::error::{Error, Result};
use crate::models::FEATURE_COUNT;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-8;

#[derive(Debug, Clone)]
struct AdamState {
    step: i32,
    m_w1: Array2<f64>,
    v_w1: Array2<f64>,
    m_b1: Array1<f64>,
    v_b1: Array1<f64>,
    m_w2: Array1<f64>,
    v_w2: Array1<f64>,
    m_b2: f64,
    v_b2: f64,
}

impl AdamState {
    fn new(hidden: usize) -> Self {
        Self {
            step: 0,
            m_w1: Array2::zeros((hidden, FEATURE_COUNT)),
            v_w1: Array2::zeros((hidden, FEATURE_COUNT)),
            m_b1: Array1::zeros(hidden),
            v_b1: Array1::zeros(hidden),
            m_w2: Array1::zeros(hidden),
            v_w2: Array1::zeros(hidden),
            m_b2: 0.0,
            v_b2: 0.0,
        }
    }
}

fn adam_update<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    lr_t: f64,
) {
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + EPSILON);
        });
}

/// Dense network regressor persisted as a JSON artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseRegressor {
    /// Hidden weights, shape (hidden, features)
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array1<f64>,
    b2: f64,
    target_mean: f64,
    target_std: f64,
    target_fitted: bool,
    learning_rate: f64,
    l2: f64,
    seed: u64,
    epochs_trained: u64,
    #[serde(skip)]
    adam: Option<AdamState>,
}

impl DenseRegressor {
    pub fn new(hidden_units: usize, learning_rate: f64, seed: u64) -> Self {
        let hidden = hidden_units.max(1);
        let mut rng = StdRng::seed_from_u64(seed);

        // He-uniform initialization
        let limit1 = (6.0 / FEATURE_COUNT as f64).sqrt();
        let limit2 = (6.0 / hidden as f64).sqrt();
        let w1 = Array2::from_shape_fn((hidden, FEATURE_COUNT), |_| {
            rng.gen_range(-limit1..limit1)
        });
        let w2 = Array1::from_shape_fn(hidden, |_| rng.gen_range(-limit2..limit2));

        Self {
            w1,
            b1: Array1::zeros(hidden),
            w2,
            b2: 0.0,
            target_mean: 0.0,
            target_std: 1.0,
            target_fitted: false,
            learning_rate,
            l2: 1e-3,
            seed,
            epochs_trained: 0,
            adam: None,
        }
    }

    pub fn with_l2(mut self, l2: f64) -> Self {
        self.l2 = l2;
        self
    }

    pub fn hidden_units(&self) -> usize {
        self.b1.len()
    }

    pub fn epochs_trained(&self) -> u64 {
        self.epochs_trained
    }

    fn check_shapes(&self) -> Result<()> {
        let hidden = self.b1.len();
        if self.w1.dim() != (hidden, FEATURE_COUNT) || self.w2.len() != hidden {
            return Err(Error::Model(format!(
                "Inconsistent regressor shapes: w1={:?} b1={} w2={}",
                self.w1.dim(),
                hidden,
                self.w2.len()
            )));
        }
        Ok(())
    }

    fn batch_step(&mut self, xb: &Array2<f64>, yb: &Array1<f64>) -> f64 {
        let n = xb.nrows() as f64;

        // Forward
        let pre = xb.dot(&self.w1.t()) + &self.b1;
        let hidden = pre.mapv(|v| v.max(0.0));
        let out = hidden.dot(&self.w2).mapv(|v| v + self.b2);
        let diff = &out - yb;
        let loss = diff.mapv(|d| d * d).sum() / n;

        // Backward
        let d_out = diff.mapv(|d| 2.0 * d / n);
        let grad_w2 = hidden.t().dot(&d_out) + &self.w2.mapv(|w| 2.0 * self.l2 * w);
        let grad_b2 = d_out.sum();

        let mut d_hidden = &d_out.view().insert_axis(Axis(1)) * &self.w2;
        Zip::from(&mut d_hidden).and(&pre).for_each(|g, &p| {
            if p <= 0.0 {
                *g = 0.0;
            }
        });
        let grad_w1 = d_hidden.t().dot(xb) + &self.w1.mapv(|w| 2.0 * self.l2 * w);
        let grad_b1 = d_hidden.sum_axis(Axis(0));

        let hidden_units = self.b1.len();
        let adam = self
            .adam
            .get_or_insert_with(|| AdamState::new(hidden_units));
        adam.step += 1;
        let lr_t = self.learning_rate * (1.0 - BETA2.powi(adam.step)).sqrt()
            / (1.0 - BETA1.powi(adam.step));

        adam_update(&mut self.w1, &grad_w1, &mut adam.m_w1, &mut adam.v_w1, lr_t);
        adam_update(&mut self.b1, &grad_b1, &mut adam.m_b1, &mut adam.v_b1, lr_t);
        adam_update(&mut self.w2, &grad_w2, &mut adam.m_w2, &mut adam.v_w2, lr_t);

        adam.m_b2 = BETA1 * adam.m_b2 + (1.0 - BETA1) * grad_b2;
        adam.v_b2 = BETA2 * adam.v_b2 + (1.0 - BETA2) * grad_b2 * grad_b2;
        self.b2 -= lr_t * adam.m_b2 / (adam.v_b2.sqrt() + EPSILON);

        loss
    }
}

impl Default for DenseRegressor {
    fn default() -> Self {
        Self::new(32, 0.001, 42)
    }
}

impl Regressor for DenseRegressor {
    fn predict(&self, row: &FeatureRow) -> Result<f64> {
        self.check_shapes()?;
        if row.iter().any(|v| !v.is_finite()) {
            return Err(Error::Model(format!("Non-finite feature row: {:?}", row)));
        }

        let mut out = self.b2;
        for (j, w2) in self.w2.iter().enumerate() {
            let mut activation = self.b1[j];
            for (k, x) in row.iter().enumerate() {
                activation += self.w1[[j, k]] * x;
            }
            out += activation.max(0.0) * w2;
        }

        Ok(out * self.target_std + self.target_mean)
    }

    fn prepare(&mut self, _x: &[FeatureRow], y: &[f64]) -> Result<()> {
        self.check_shapes()?;
        if !self.target_fitted && !y.is_empty() {
            let n = y.len() as f64;
            let mean = y.iter().sum::<f64>() / n;
            let var = y.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            self.target_mean = mean;
            self.target_std = if std > f64::EPSILON { std } else { 1.0 };
            self.target_fitted = true;
        }
        // Optimizer state is per fit
        self.adam = None;
        Ok(())
    }

    fn train_epoch(&mut self, x: &[FeatureRow], y: &[f64], batch_size: usize) -> Result<f64> {
        if x.is_empty() || x.len() != y.len() {
            return Err(Error::Training(format!(
                "Invalid epoch input: {} rows, {} targets",
                x.len(),
                y.len()
            )));
        }

        let mut order: Vec<usize> = (0..x.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.epochs_trained));
        order.shuffle(&mut rng);

        let batch_size = batch_size.max(1);
        let mut total_loss = 0.0;
        for chunk in order.chunks(batch_size) {
            let xb = Array2::from_shape_fn((chunk.len(), FEATURE_COUNT), |(i, k)| x[chunk[i]][k]);
            let yb = Array1::from_shape_fn(chunk.len(), |i| {
                (y[chunk[i]] - self.target_mean) / self.target_std
            });
            total_loss += self.batch_step(&xb, &yb) * chunk.len() as f64;
        }

        self.epochs_trained += 1;
        // Report loss in target units so it is comparable with validation MSE
        Ok(total_loss / x.len() as f64 * self.target_std * self.target_std)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{fit, FitOptions};

    fn linear_data(n: usize) -> (Vec<FeatureRow>, Vec<f64>) {
        let x: Vec<FeatureRow> = (0..n)
            .map(|i| {
                let t = (i as f64 / n as f64) * 2.0 - 1.0;
                [t, -t, 0.5 * t, 0.0]
            })
            .collect();
        let y = x.iter().map(|r| 5000.0 + 1000.0 * r[0]).collect();
        (x, y)
    }

    #[test]
    fn test_deterministic_initialization() {
        let a = DenseRegressor::new(8, 0.01, 7);
        let b = DenseRegressor::new(8, 0.01, 7);
        let row = [0.1, -0.2, 0.3, 0.4];
        assert_eq!(a.predict(&row).unwrap(), b.predict(&row).unwrap());
    }

    #[test]
    fn test_fit_reduces_loss() {
        let (x, y) = linear_data(64);
        let mut model = DenseRegressor::new(16, 0.01, 1);
        let options = FitOptions {
            epochs: 200,
            patience: 200,
            ..Default::default()
        };

        let history = fit(&mut model, &x, &y, &options).unwrap();
        let first = history.train_loss[0];
        let last = *history.train_loss.last().unwrap();
        assert!(last < first, "loss did not decrease: {} -> {}", first, last);

        // Output is on the target scale
        let pred = model.predict(&[0.0, 0.0, 0.0, 0.0]).unwrap();
        assert!((pred - 5000.0).abs() < 1000.0);
    }

    #[test]
    fn test_target_normalization_fixed_after_first_fit() {
        let (x, y) = linear_data(16);
        let mut model = DenseRegressor::new(4, 0.01, 3);
        model.prepare(&x, &y).unwrap();
        let (mean, std) = (model.target_mean, model.target_std);

        let shifted: Vec<f64> = y.iter().map(|t| t * 10.0).collect();
        model.prepare(&x, &shifted).unwrap();
        assert_eq!(model.target_mean, mean);
        assert_eq!(model.target_std, std);
    }

    #[test]
    fn test_json_roundtrip_preserves_predictions() {
        let (x, y) = linear_data(16);
        let mut model = DenseRegressor::new(4, 0.01, 5);
        fit(&mut model, &x, &y, &FitOptions::default()).unwrap();

        let json = serde_json::to_string(&model).unwrap();
        let restored: DenseRegressor = serde_json::from_str(&json).unwrap();
        let row = [0.25, -0.25, 0.1, 0.0];
        assert!((model.predict(&row).unwrap() - restored.predict(&row).unwrap()).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_non_finite_row() {
        let model = DenseRegressor::default();
        assert!(model.predict(&[f64::NAN, 0.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn test_corrupt_shapes_detected() {
        let mut model = DenseRegressor::new(4, 0.01, 5);
        model.w2 = Array1::zeros(3);
        assert!(matches!(
            model.predict(&[0.0; FEATURE_COUNT]),
            Err(Error::Model(_))
        ));
    }
}
