//! Standard (z-score) feature scaler

use serde::{Deserialize, Serialize};

use super::{FeatureRow, FeatureScaler};
use crate::error::{Error, Result};
use crate::models::FEATURE_COUNT;

/// Per-feature standardization fitted once on the base training data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: FeatureRow,
    pub scale: FeatureRow,
}

impl StandardScaler {
    /// Fit means and population standard deviations; constant columns get unit scale
    pub fn fit(rows: &[FeatureRow]) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::InsufficientTrainingData(
                "Cannot fit scaler on zero rows".to_string(),
            ));
        }

        let n = rows.len() as f64;
        let mut mean = [0.0; FEATURE_COUNT];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v / n;
            }
        }

        let mut scale = [0.0; FEATURE_COUNT];
        for row in rows {
            for k in 0..FEATURE_COUNT {
                scale[k] += (row[k] - mean[k]).powi(2) / n;
            }
        }
        for s in scale.iter_mut() {
            *s = s.sqrt();
            if *s <= f64::EPSILON || !s.is_finite() {
                *s = 1.0;
            }
        }

        Ok(Self { mean, scale })
    }

    /// Identity transform
    pub fn identity() -> Self {
        Self {
            mean: [0.0; FEATURE_COUNT],
            scale: [1.0; FEATURE_COUNT],
        }
    }

    fn check(&self) -> Result<()> {
        if self.scale.iter().any(|s| *s == 0.0 || !s.is_finite())
            || self.mean.iter().any(|m| !m.is_finite())
        {
            return Err(Error::Model(format!(
                "Scaler has unusable parameters: mean={:?} scale={:?}",
                self.mean, self.scale
            )));
        }
        Ok(())
    }
}

impl FeatureScaler for StandardScaler {
    fn transform(&self, row: &FeatureRow) -> Result<FeatureRow> {
        self.check()?;
        let mut out = [0.0; FEATURE_COUNT];
        for k in 0..FEATURE_COUNT {
            out[k] = (row[k] - self.mean[k]) / self.scale[k];
        }
        Ok(out)
    }

    fn inverse_transform(&self, row: &FeatureRow) -> Result<FeatureRow> {
        self.check()?;
        let mut out = [0.0; FEATURE_COUNT];
        for k in 0..FEATURE_COUNT {
            out[k] = row[k] * self.scale[k] + self.mean[k];
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_standardizes_columns() {
        let rows = vec![[1.0, 10.0, 1.0, 5.0], [3.0, 30.0, 1.0, 5.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        assert_eq!(scaler.mean, [2.0, 20.0, 1.0, 5.0]);
        assert_eq!(scaler.scale, [1.0, 10.0, 1.0, 1.0]);

        let scaled = scaler.transform(&rows[1]).unwrap();
        assert_eq!(scaled, [1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_inverse_transform() {
        let rows = vec![[100.0, 20.0, 3.0, 80.0], [300.0, 60.0, 9.0, 240.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        let row = [250.0, 33.0, 7.0, 217.0];
        let back = scaler
            .inverse_transform(&scaler.transform(&row).unwrap())
            .unwrap();
        for k in 0..FEATURE_COUNT {
            assert!((back[k] - row[k]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fit_requires_rows() {
        assert!(StandardScaler::fit(&[]).is_err());
    }

    #[test]
    fn test_zero_scale_rejected_at_transform() {
        let scaler = StandardScaler {
            mean: [0.0; FEATURE_COUNT],
            scale: [1.0, 0.0, 1.0, 1.0],
        };
        assert!(scaler.transform(&[1.0; FEATURE_COUNT]).is_err());
    }
}
