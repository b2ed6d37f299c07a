//! Candidate hyperparameter grid.
//!
//! Boosting configurations, from conservative to aggressive:
//!
//! | name | trees | depth | lr   | leaves | subsample | colsample | λ    | min leaf |
//! |------|-------|-------|------|--------|-----------|-----------|------|----------|
//! | A    | 500   | 6     | 0.05 | 31     | 0.80      | 0.80      | 0.10 | 20       |
//! | B    | 2000  | 6     | 0.02 | 31     | 0.80      | 0.80      | 0.10 | 15       |
//! | C    | 1000  | 8     | 0.03 | 50     | 0.85      | 0.85      | 0.05 | 10       |
//! | D    | 3000  | 10    | 0.01 | 80     | 0.80      | 0.70      | 0.01 | 5        |
//! | E    | 1500  | 5     | 0.03 | 25     | 0.75      | 0.75      | 0.50 | 20       |
//!
//! All boosting configurations stop early after 30 rounds without held-out improvement.

use crate::domain::{
    DEFAULT_EARLY_STOPPING_PATIENCE, FeatureSetKind, HyperParams, HyperparameterConfig, ModelFamily,
};
use crate::error::ValuationError;

/// One `(feature set, configuration)` cell.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub feature_set: FeatureSetKind,
    pub config: HyperparameterConfig,
}

#[allow(clippy::too_many_arguments)]
fn boosting(
    name: &str,
    n_estimators: usize,
    max_depth: usize,
    learning_rate: f64,
    max_leaves: usize,
    subsample: f64,
    colsample: f64,
    reg_lambda: f64,
    min_samples_leaf: usize,
) -> HyperparameterConfig {
    HyperparameterConfig {
        name: name.to_string(),
        family: ModelFamily::GradientBoosting,
        params: HyperParams {
            n_estimators,
            learning_rate,
            max_depth,
            max_leaves,
            min_samples_leaf,
            subsample,
            colsample,
            reg_lambda,
            early_stopping_rounds: Some(DEFAULT_EARLY_STOPPING_PATIENCE),
        },
    }
}

fn forest(name: &str, n_estimators: usize, max_depth: usize, min_samples_leaf: usize, colsample: f64) -> HyperparameterConfig {
    HyperparameterConfig {
        name: name.to_string(),
        family: ModelFamily::RandomForest,
        params: HyperParams {
            n_estimators,
            learning_rate: 1.0,
            max_depth,
            max_leaves: usize::MAX,
            min_samples_leaf,
            subsample: 1.0,
            colsample,
            reg_lambda: 0.0,
            early_stopping_rounds: None,
        },
    }
}

/// Configurations for one family, in grid order.
pub fn family_configs(family: ModelFamily) -> Vec<HyperparameterConfig> {
    match family {
        ModelFamily::GradientBoosting => vec![
            boosting("A", 500, 6, 0.05, 31, 0.8, 0.8, 0.1, 20),
            boosting("B", 2000, 6, 0.02, 31, 0.8, 0.8, 0.1, 15),
            boosting("C", 1000, 8, 0.03, 50, 0.85, 0.85, 0.05, 10),
            boosting("D", 3000, 10, 0.01, 80, 0.8, 0.7, 0.01, 5),
            boosting("E", 1500, 5, 0.03, 25, 0.75, 0.75, 0.5, 20),
        ],
        ModelFamily::RandomForest => vec![
            forest("RF-500", 500, 12, 3, 1.0),
            forest("RF-300-sqrt", 300, 16, 2, 0.33),
        ],
        ModelFamily::Ridge => vec![HyperparameterConfig {
            name: "ridge".to_string(),
            family: ModelFamily::Ridge,
            params: HyperParams {
                n_estimators: 1,
                reg_lambda: 1.0,
                early_stopping_rounds: None,
                ..HyperParams::default()
            },
        }],
    }
}

/// Cross product of feature sets and family configurations, feature set outermost.
pub fn build_grid(
    feature_sets: &[FeatureSetKind],
    families: &[ModelFamily],
) -> Result<Vec<GridCell>, ValuationError> {
    if feature_sets.is_empty() {
        return Err(ValuationError::InvalidInput("no feature sets selected".to_string()));
    }
    if families.is_empty() {
        return Err(ValuationError::InvalidInput("no model families selected".to_string()));
    }

    let configs: Vec<HyperparameterConfig> = families.iter().flat_map(|&f| family_configs(f)).collect();
    Ok(feature_sets
        .iter()
        .flat_map(|&fs| {
            configs.iter().map(move |c| GridCell {
                feature_set: fs,
                config: c.clone(),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grid_shape() {
        let grid = build_grid(
            &FeatureSetKind::ALL,
            &[ModelFamily::GradientBoosting, ModelFamily::RandomForest, ModelFamily::Ridge],
        )
        .unwrap();
        assert_eq!(grid.len(), 4 * (5 + 2 + 1));
        assert_eq!(grid[0].feature_set, FeatureSetKind::Base);
        assert_eq!(grid[0].config.name, "A");
        assert_eq!(grid[7].config.name, "ridge");
        assert_eq!(grid[8].feature_set, FeatureSetKind::GeoExpanded);
    }

    #[test]
    fn boosting_table_values() {
        let d = &family_configs(ModelFamily::GradientBoosting)[3];
        assert_eq!(d.name, "D");
        assert_eq!(d.params.n_estimators, 3000);
        assert_eq!(d.params.max_leaves, 80);
        assert_eq!(d.params.colsample, 0.7);
        assert_eq!(d.params.early_stopping_rounds, Some(30));
    }

    #[test]
    fn empty_selection_is_invalid() {
        assert!(build_grid(&[], &[ModelFamily::Ridge]).is_err());
        assert!(build_grid(&[FeatureSetKind::Base], &[]).is_err());
    }
}
