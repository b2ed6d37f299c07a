//! Standardisation scaler.

use serde::{Deserialize, Serialize};

use crate::error::ValuationError;

/// Per-column z-score transform fitted on a training split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    /// Population standard deviation; constant columns store `1.0`.
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, ValuationError> {
        let Some(first) = rows.first() else {
            return Err(ValuationError::InvalidInput(
                "cannot fit a scaler on zero rows".to_string(),
            ));
        };
        let p = first.len();
        if rows.iter().any(|r| r.len() != p) {
            return Err(ValuationError::FeatureMismatch(
                "ragged rows while fitting scaler".to_string(),
            ));
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; p];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut scale = vec![0.0; p];
        for row in rows {
            for ((s, v), m) in scale.iter_mut().zip(row).zip(&mean) {
                *s += (v - m).powi(2);
            }
        }
        for s in &mut scale {
            let sd = (*s / n).sqrt();
            *s = if sd > 0.0 && sd.is_finite() { sd } else { 1.0 };
        }

        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, ValuationError> {
        if row.len() != self.mean.len() {
            return Err(ValuationError::FeatureMismatch(format!(
                "scaler expects {} columns, got {}",
                self.mean.len(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ValuationError> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardises_columns_and_guards_constant_ones() {
        let rows = vec![vec![1.0, 7.0], vec![3.0, 7.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        assert_eq!(scaler.mean, vec![2.0, 7.0]);
        assert_eq!(scaler.scale, vec![1.0, 1.0]);

        let t = scaler.transform(&rows).unwrap();
        assert_eq!(t[0], vec![-1.0, 0.0]);
        assert_eq!(t[1], vec![1.0, 0.0]);
    }

    #[test]
    fn wrong_width_is_rejected() {
        let scaler = StandardScaler::fit(&[vec![1.0, 2.0]]).unwrap();
        assert!(matches!(
            scaler.transform_row(&[1.0]),
            Err(ValuationError::FeatureMismatch(_))
        ));
    }
}
