//! Random forest regressor: bootstrap rows per tree, random feature subset per split.
//!
//! Trees are grown in parallel, each from its own seed (`seed + tree index`), and
//! collected in index order, so the fitted forest does not depend on thread scheduling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::Dataset;
use super::boosting::normalize;
use super::tree::{BinnedFeatures, GrowParams, RegressionTree};
use crate::domain::HyperParams;
use crate::error::ValuationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestModel {
    trees: Vec<RegressionTree>,
    importances: Vec<f64>,
    n_features: usize,
}

impl RandomForestModel {
    pub fn fit(train: Dataset<'_>, params: &HyperParams, seed: u64) -> Result<Self, ValuationError> {
        train.validate()?;
        if params.n_estimators == 0 {
            return Err(ValuationError::InvalidInput(
                "random forest needs at least one tree".to_string(),
            ));
        }

        let n = train.len();
        let n_features = train.n_features();
        let bins = BinnedFeatures::new(train.x);
        let all_features: Vec<usize> = (0..n_features).collect();
        let grow = GrowParams {
            max_depth: params.max_depth,
            max_leaves: usize::MAX,
            min_samples_leaf: params.min_samples_leaf,
            max_features: ((n_features as f64 * params.colsample).ceil() as usize).clamp(1, n_features),
        };
        let y = train.y;

        let grown: Vec<(RegressionTree, Vec<f64>)> = (0..params.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
                let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut importances = vec![0.0; n_features];
                let tree = RegressionTree::grow(
                    &bins,
                    y,
                    rows,
                    &all_features,
                    &grow,
                    &mut rng,
                    &mut importances,
                    |leaf_rows| {
                        if leaf_rows.is_empty() {
                            return 0.0;
                        }
                        leaf_rows.iter().map(|&i| y[i]).sum::<f64>() / leaf_rows.len() as f64
                    },
                );
                normalize(&mut importances);
                (tree, importances)
            })
            .collect();

        let mut importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(grown.len());
        for (tree, imp) in grown {
            for (acc, v) in importances.iter_mut().zip(&imp) {
                *acc += v;
            }
            trees.push(tree);
        }
        normalize(&mut importances);

        Ok(Self {
            trees,
            importances,
            n_features,
        })
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return f64::NAN;
        }
        self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn importances(&self) -> &[f64] {
        &self.importances
    }

    pub(crate) fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::mean_absolute_error;

    #[test]
    fn fits_and_is_reproducible() {
        let x: Vec<Vec<f64>> = (0..120).map(|i| vec![(i % 6) as f64, (i % 4) as f64]).collect();
        let y: Vec<f64> = x.iter().map(|r| 200_000.0 + 25_000.0 * r[0]).collect();
        let params = HyperParams {
            n_estimators: 25,
            max_depth: 6,
            min_samples_leaf: 2,
            colsample: 1.0,
            ..HyperParams::default()
        };

        let a = RandomForestModel::fit(Dataset::new(&x, &y), &params, 11).unwrap();
        let b = RandomForestModel::fit(Dataset::new(&x, &y), &params, 11).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.n_trees(), 25);

        let pred: Vec<f64> = x.iter().map(|r| a.predict_row(r)).collect();
        assert!(mean_absolute_error(&y, &pred) < 5_000.0);
        assert!(a.importances()[0] > a.importances()[1]);
    }
}
