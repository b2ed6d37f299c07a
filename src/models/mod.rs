//! Regression models.
//!
//! - [`tree`]: histogram regression trees shared by the ensembles
//! - [`boosting`]: L1 gradient boosting with early stopping
//! - [`forest`]: bagged trees
//! - [`linear`]: ridge baseline
//! - [`scaler`]: standardisation fitted on the training split
//!
//! Fitted models are stored as the [`FittedModel`] enum so they serialise into the
//! artifact bundle with a `family` tag; callers use them through [`Regressor`].

pub mod boosting;
pub mod forest;
pub mod linear;
pub mod scaler;
pub mod tree;

use serde::{Deserialize, Serialize};

pub use boosting::GradientBoostingModel;
pub use forest::RandomForestModel;
pub use linear::RidgeModel;
pub use scaler::StandardScaler;

use crate::domain::{HyperparameterConfig, ModelFamily};
use crate::error::ValuationError;

/// Borrowed design matrix plus target.
#[derive(Debug, Clone, Copy)]
pub struct Dataset<'a> {
    pub x: &'a [Vec<f64>],
    pub y: &'a [f64],
}

impl<'a> Dataset<'a> {
    pub fn new(x: &'a [Vec<f64>], y: &'a [f64]) -> Self {
        Self { x, y }
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.x.first().map_or(0, Vec::len)
    }

    fn validate(&self) -> Result<(), ValuationError> {
        if self.is_empty() {
            return Err(ValuationError::InvalidInput("empty training set".to_string()));
        }
        if self.x.len() != self.y.len() {
            return Err(ValuationError::FeatureMismatch(format!(
                "{} feature rows for {} targets",
                self.x.len(),
                self.y.len()
            )));
        }
        let p = self.n_features();
        if p == 0 || self.x.iter().any(|r| r.len() != p) {
            return Err(ValuationError::FeatureMismatch(
                "design matrix rows have inconsistent widths".to_string(),
            ));
        }
        if self.y.iter().any(|v| !v.is_finite()) || self.x.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ValuationError::InvalidInput(
                "training data contains non-finite values".to_string(),
            ));
        }
        Ok(())
    }
}

/// Common interface over the fitted model families.
pub trait Regressor {
    fn predict_row(&self, row: &[f64]) -> f64;

    fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_row(r)).collect()
    }

    /// Unit-sum importance per input column.
    fn feature_importances(&self) -> Vec<f64>;

    /// Estimator count, used to prefer the simpler of two tied candidates.
    fn n_estimators(&self) -> usize;

    fn n_features(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum FittedModel {
    GradientBoosting(GradientBoostingModel),
    RandomForest(RandomForestModel),
    Ridge(RidgeModel),
}

impl FittedModel {
    pub fn family(&self) -> ModelFamily {
        match self {
            FittedModel::GradientBoosting(_) => ModelFamily::GradientBoosting,
            FittedModel::RandomForest(_) => ModelFamily::RandomForest,
            FittedModel::Ridge(_) => ModelFamily::Ridge,
        }
    }

    /// Every split must reference a column inside the model's declared width.
    pub fn is_consistent(&self) -> bool {
        let n = self.n_features();
        let trees = match self {
            FittedModel::GradientBoosting(m) => m.trees(),
            FittedModel::RandomForest(m) => m.trees(),
            FittedModel::Ridge(_) => return true,
        };
        trees
            .iter()
            .filter_map(|t| t.max_feature_index())
            .all(|f| f < n)
    }
}

impl Regressor for FittedModel {
    fn predict_row(&self, row: &[f64]) -> f64 {
        match self {
            FittedModel::GradientBoosting(m) => m.predict_row(row),
            FittedModel::RandomForest(m) => m.predict_row(row),
            FittedModel::Ridge(m) => m.predict_row(row),
        }
    }

    fn feature_importances(&self) -> Vec<f64> {
        match self {
            FittedModel::GradientBoosting(m) => m.importances().to_vec(),
            FittedModel::RandomForest(m) => m.importances().to_vec(),
            FittedModel::Ridge(m) => m.importances(),
        }
    }

    fn n_estimators(&self) -> usize {
        match self {
            FittedModel::GradientBoosting(m) => m.n_trees(),
            FittedModel::RandomForest(m) => m.n_trees(),
            FittedModel::Ridge(_) => 1,
        }
    }

    fn n_features(&self) -> usize {
        match self {
            FittedModel::GradientBoosting(m) => m.n_features(),
            FittedModel::RandomForest(m) => m.n_features(),
            FittedModel::Ridge(m) => m.n_features(),
        }
    }
}

/// Fit one grid configuration.
///
/// `eval` is only used by gradient boosting, for early stopping.
pub fn fit_model(
    config: &HyperparameterConfig,
    train: Dataset<'_>,
    eval: Option<Dataset<'_>>,
    seed: u64,
) -> Result<FittedModel, ValuationError> {
    Ok(match config.family {
        ModelFamily::GradientBoosting => FittedModel::GradientBoosting(GradientBoostingModel::fit(
            train,
            eval,
            &config.params,
            seed,
        )?),
        ModelFamily::RandomForest => {
            FittedModel::RandomForest(RandomForestModel::fit(train, &config.params, seed)?)
        }
        ModelFamily::Ridge => FittedModel::Ridge(RidgeModel::fit(train, &config.params)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HyperParams;

    #[test]
    fn fitted_model_round_trips_through_json_with_family_tag() {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..20).map(|i| 1000.0 * i as f64).collect();
        let config = HyperparameterConfig {
            name: "ridge".to_string(),
            family: ModelFamily::Ridge,
            params: HyperParams {
                reg_lambda: 1.0,
                ..HyperParams::default()
            },
        };
        let model = fit_model(&config, Dataset::new(&x, &y), None, 42).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        assert!(json.contains("\"family\":\"ridge\""));
        let back: FittedModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back.family(), ModelFamily::Ridge);
        assert_eq!(back.n_estimators(), 1);
        assert!(back.is_consistent());
    }

    #[test]
    fn empty_training_set_is_rejected() {
        let config = HyperparameterConfig {
            name: "A".to_string(),
            family: ModelFamily::GradientBoosting,
            params: HyperParams::default(),
        };
        let err = fit_model(&config, Dataset::new(&[], &[]), None, 1).unwrap_err();
        assert!(matches!(err, ValuationError::InvalidInput(_)));
    }
}
