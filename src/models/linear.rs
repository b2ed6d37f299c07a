//! Ridge regression baseline on standardised features.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::Dataset;
use crate::domain::HyperParams;
use crate::error::ValuationError;
use crate::math::solve_ridge;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeModel {
    intercept: f64,
    coefficients: Vec<f64>,
}

impl RidgeModel {
    pub fn fit(train: Dataset<'_>, params: &HyperParams) -> Result<Self, ValuationError> {
        train.validate()?;
        let n = train.len();
        let p = train.n_features();

        let mut x = DMatrix::<f64>::zeros(n, p + 1);
        for (i, row) in train.x.iter().enumerate() {
            x[(i, 0)] = 1.0;
            for (j, v) in row.iter().enumerate() {
                x[(i, j + 1)] = *v;
            }
        }
        let y = DVector::from_column_slice(train.y);

        let beta = solve_ridge(&x, &y, params.reg_lambda.max(0.0)).ok_or_else(|| {
            ValuationError::NoViableModel("ridge system is too ill-conditioned".to_string())
        })?;

        Ok(Self {
            intercept: beta[0],
            coefficients: beta.iter().skip(1).copied().collect(),
        })
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(b, v)| b * v)
                .sum::<f64>()
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    /// Absolute coefficients, normalised to unit sum.
    pub fn importances(&self) -> Vec<f64> {
        let mut imp: Vec<f64> = self.coefficients.iter().map(|c| c.abs()).collect();
        super::boosting::normalize(&mut imp);
        imp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_linear_relationship() {
        let x: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64 / 10.0 - 1.5, (i % 3) as f64]).collect();
        let y: Vec<f64> = x.iter().map(|r| 250_000.0 + 30_000.0 * r[0]).collect();
        let params = HyperParams {
            reg_lambda: 1e-6,
            ..HyperParams::default()
        };
        let model = RidgeModel::fit(Dataset::new(&x, &y), &params).unwrap();
        assert!((model.predict_row(&[0.5, 1.0]) - 265_000.0).abs() < 1.0);
        let imp = model.importances();
        assert!(imp[0] > 0.99);
    }
}
