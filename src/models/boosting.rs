//! L1 gradient boosting.
//!
//! Each round fits a tree to the sign of the current residuals (the negative
//! gradient of absolute error), then replaces the leaf values with the median
//! residual of the rows in each leaf, shrunk by `n / (n + reg_lambda)`.
//! Rows and columns are subsampled per tree. With an evaluation set, boosting
//! stops once held-out MAE has not improved for `early_stopping_rounds` rounds
//! and the ensemble is truncated to its best round.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Dataset;
use super::tree::{BinnedFeatures, GrowParams, RegressionTree};
use crate::domain::HyperParams;
use crate::error::ValuationError;
use crate::math::{mean_absolute_error, median};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingModel {
    init: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
    importances: Vec<f64>,
    n_features: usize,
}

impl GradientBoostingModel {
    pub fn fit(
        train: Dataset<'_>,
        eval: Option<Dataset<'_>>,
        params: &HyperParams,
        seed: u64,
    ) -> Result<Self, ValuationError> {
        train.validate()?;
        if !(params.learning_rate > 0.0 && params.learning_rate.is_finite()) {
            return Err(ValuationError::InvalidInput(format!(
                "learning rate must be positive, got {}",
                params.learning_rate
            )));
        }

        let n = train.len();
        let n_features = train.n_features();
        let bins = BinnedFeatures::new(train.x);
        let init = median(train.y);
        let lr = params.learning_rate;
        let lambda = params.reg_lambda.max(0.0);

        let row_take = ((n as f64 * params.subsample).ceil() as usize).clamp(1, n);
        let col_take = ((n_features as f64 * params.colsample).ceil() as usize).clamp(1, n_features);
        let grow = GrowParams {
            max_depth: params.max_depth,
            max_leaves: params.max_leaves.max(2),
            min_samples_leaf: params.min_samples_leaf,
            max_features: usize::MAX,
        };

        let all_rows: Vec<usize> = (0..n).collect();
        let all_features: Vec<usize> = (0..n_features).collect();
        let mut rng = StdRng::seed_from_u64(seed);

        let mut pred = vec![init; n];
        let mut eval_pred = eval.map(|e| vec![init; e.len()]);
        let mut trees: Vec<RegressionTree> = Vec::with_capacity(params.n_estimators);
        let mut importances = vec![0.0; n_features];
        let mut best_mae = f64::INFINITY;
        let mut best_len = 0usize;
        let mut best_importances = importances.clone();

        for _ in 0..params.n_estimators {
            let residuals: Vec<f64> = train.y.iter().zip(&pred).map(|(y, p)| y - p).collect();
            let gradient: Vec<f64> = residuals
                .iter()
                .map(|r| {
                    if *r > 0.0 {
                        1.0
                    } else if *r < 0.0 {
                        -1.0
                    } else {
                        0.0
                    }
                })
                .collect();

            let rows = sample_sorted(&all_rows, row_take, &mut rng);
            let features = sample_sorted(&all_features, col_take, &mut rng);

            let tree = RegressionTree::grow(
                &bins,
                &gradient,
                rows,
                &features,
                &grow,
                &mut rng,
                &mut importances,
                |leaf_rows| {
                    if leaf_rows.is_empty() {
                        return 0.0;
                    }
                    let values: Vec<f64> = leaf_rows.iter().map(|&i| residuals[i]).collect();
                    let k = leaf_rows.len() as f64;
                    median(&values) * k / (k + lambda)
                },
            );

            for (p, row) in pred.iter_mut().zip(train.x) {
                *p += lr * tree.predict_row(row);
            }
            trees.push(tree);

            if let (Some(e), Some(ep)) = (eval, eval_pred.as_mut()) {
                let Some(tree) = trees.last() else { break };
                for (p, row) in ep.iter_mut().zip(e.x) {
                    *p += lr * tree.predict_row(row);
                }
                let mae = mean_absolute_error(e.y, ep);
                if mae < best_mae {
                    best_mae = mae;
                    best_len = trees.len();
                    best_importances.clone_from(&importances);
                } else if let Some(patience) = params.early_stopping_rounds {
                    if trees.len() - best_len >= patience {
                        debug!(
                            rounds = trees.len(),
                            best_round = best_len,
                            best_mae,
                            "early stopping"
                        );
                        break;
                    }
                }
            }
        }

        if eval.is_some() && best_len > 0 {
            trees.truncate(best_len);
            importances = best_importances;
        }
        normalize(&mut importances);

        Ok(Self {
            init,
            learning_rate: lr,
            trees,
            importances,
            n_features,
        })
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.init
            + self.learning_rate * self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
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

/// Draw `take` of `items` without replacement, returned in ascending order.
pub(crate) fn sample_sorted(items: &[usize], take: usize, rng: &mut StdRng) -> Vec<usize> {
    if take >= items.len() {
        return items.to_vec();
    }
    let mut chosen: Vec<usize> = items.choose_multiple(rng, take).copied().collect();
    chosen.sort_unstable();
    chosen
}

/// Scale to unit sum (left untouched when everything is zero).
pub(crate) fn normalize(values: &mut [f64]) {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter_mut().for_each(|v| *v /= total);
    }
}
