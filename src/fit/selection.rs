//! Model selection over the `(feature set, configuration)` grid.
//!
//! For every cell:
//! 1. build the feature matrix for the cell's schema (once per schema)
//! 2. fit a standardisation scaler on the training rows only
//! 3. fit the configured model family
//! 4. score train and held-out rows
//!
//! Selection rules:
//! 1. Lowest held-out MAE wins
//! 2. Candidates within a relative `tie_epsilon` of the best MAE count as tied
//! 3. Among tied candidates prefer fewer estimators, then earlier grid position
//!
//! Cells run in parallel but are collected in grid order, so the leaderboard and
//! the winner are a pure function of the records and the seed. Candidate models
//! are dropped after scoring; the winner is refit (deterministically) at the end.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{EvalMetrics, FeatureSetKind, ModelFamily, NormalizedTransaction, TrainConfig};
use crate::error::ValuationError;
use crate::features::{self, FeatureContext};
use crate::fit::grid::{GridCell, build_grid};
use crate::fit::split::{TrainTestSplit, train_test_split};
use crate::math::{mean_absolute_error, median_absolute_error, r_squared};
use crate::models::{Dataset, FittedModel, Regressor, StandardScaler, fit_model};

/// A fully fitted candidate, ready to persist.
#[derive(Debug, Clone)]
pub struct TrainedCandidate {
    pub feature_set: FeatureSetKind,
    pub hyperparam_name: String,
    pub model: FittedModel,
    pub scaler: StandardScaler,
    pub feature_columns: Vec<String>,
    pub metrics: EvalMetrics,
}

/// One ranked row of the leaderboard.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub feature_set: FeatureSetKind,
    pub hyperparam_name: String,
    pub family: ModelFamily,
    pub n_estimators: usize,
    pub metrics: EvalMetrics,
    /// Position in the grid (tie-break of last resort).
    pub grid_index: usize,
}

/// A grid cell that failed, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCell {
    pub feature_set: FeatureSetKind,
    pub hyperparam_name: String,
    pub reason: String,
}

/// Output of training + selection.
#[derive(Debug, Clone)]
pub struct Selection {
    pub best: TrainedCandidate,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub skipped: Vec<SkippedCell>,
    /// Held-out record indices (into the records passed to [`select_best`]).
    pub test_indices: Vec<usize>,
}

struct CellScore {
    metrics: EvalMetrics,
    n_estimators: usize,
}

struct Prepared<'a> {
    split: &'a TrainTestSplit,
    matrices: &'a HashMap<FeatureSetKind, Vec<Vec<f64>>>,
    y_train: Vec<f64>,
    y_test: Vec<f64>,
    seed: u64,
}

/// Train every grid cell and pick the winner.
pub fn select_best(
    records: &[NormalizedTransaction],
    config: &TrainConfig,
) -> Result<Selection, ValuationError> {
    if !(config.tie_epsilon.is_finite() && config.tie_epsilon >= 0.0) {
        return Err(ValuationError::InvalidInput(format!(
            "tie epsilon must be a non-negative number, got {}",
            config.tie_epsilon
        )));
    }
    if !config.reference_point.is_finite() {
        return Err(ValuationError::InvalidInput(
            "reference point must have finite coordinates".to_string(),
        ));
    }

    let grid = build_grid(&config.feature_sets, &config.families)?;
    let split = train_test_split(records.len(), config.test_fraction, config.seed)?;
    let ctx = FeatureContext {
        reference_point: config.reference_point,
    };

    let mut matrices = HashMap::new();
    for &fs in &config.feature_sets {
        matrices
            .entry(fs)
            .or_insert_with(|| features::build_matrix(records, fs, &ctx));
    }

    let target: Vec<f64> = records.iter().map(|r| r.adjusted_price).collect();
    let prepared = Prepared {
        split: &split,
        matrices: &matrices,
        y_train: split.train.iter().map(|&i| target[i]).collect(),
        y_test: split.test.iter().map(|&i| target[i]).collect(),
        seed: config.seed,
    };

    info!(
        cells = grid.len(),
        n_train = split.train.len(),
        n_test = split.test.len(),
        seed = config.seed,
        "training candidate grid"
    );

    let outcomes: Vec<Result<CellScore, ValuationError>> = grid
        .par_iter()
        .map(|cell| score_cell(&prepared, cell))
        .collect();

    let mut board = Vec::new();
    let mut skipped = Vec::new();
    for (grid_index, (cell, outcome)) in grid.iter().zip(outcomes).enumerate() {
        match outcome {
            Ok(score) => {
                debug!(
                    feature_set = cell.feature_set.name(),
                    config = %cell.config.name,
                    test_mae = score.metrics.test_mae,
                    test_r2 = score.metrics.test_r2,
                    n_estimators = score.n_estimators,
                    "scored candidate"
                );
                board.push(LeaderboardEntry {
                    rank: 0,
                    feature_set: cell.feature_set,
                    hyperparam_name: cell.config.name.clone(),
                    family: cell.config.family,
                    n_estimators: score.n_estimators,
                    metrics: score.metrics,
                    grid_index,
                });
            }
            Err(err) => {
                warn!(
                    feature_set = cell.feature_set.name(),
                    config = %cell.config.name,
                    error = %err,
                    "skipping candidate"
                );
                skipped.push(SkippedCell {
                    feature_set: cell.feature_set,
                    hyperparam_name: cell.config.name.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    if board.is_empty() {
        let first = skipped
            .first()
            .map(|s| format!(" (first failure: {})", s.reason))
            .unwrap_or_default();
        return Err(ValuationError::NoViableModel(format!(
            "all {} grid cells failed{first}",
            grid.len()
        )));
    }

    rank_leaderboard(&mut board, config.tie_epsilon);

    let winner = &board[0];
    let cell = &grid[winner.grid_index];
    info!(
        feature_set = cell.feature_set.name(),
        config = %cell.config.name,
        family = cell.config.family.display_name(),
        test_mae = winner.metrics.test_mae,
        "selected best candidate; refitting"
    );
    let best = fit_candidate(&prepared, cell)?;

    Ok(Selection {
        best,
        leaderboard: board,
        skipped,
        test_indices: split.test.clone(),
    })
}

/// Sort by held-out MAE, then move the tie-break winner to the top and assign ranks.
fn rank_leaderboard(board: &mut [LeaderboardEntry], tie_epsilon: f64) {
    board.sort_by(|a, b| {
        a.metrics
            .test_mae
            .total_cmp(&b.metrics.test_mae)
            .then(a.n_estimators.cmp(&b.n_estimators))
            .then(a.grid_index.cmp(&b.grid_index))
    });

    let best_mae = board[0].metrics.test_mae;
    let tolerance = tie_epsilon * best_mae.abs();
    let winner = board
        .iter()
        .enumerate()
        .take_while(|(_, e)| e.metrics.test_mae - best_mae <= tolerance)
        .min_by_key(|(_, e)| (e.n_estimators, e.grid_index))
        .map_or(0, |(i, _)| i);
    board[..=winner].rotate_right(1);

    for (i, entry) in board.iter_mut().enumerate() {
        entry.rank = i + 1;
    }
}

fn rows(matrix: &[Vec<f64>], idx: &[usize]) -> Vec<Vec<f64>> {
    idx.iter().map(|&i| matrix[i].clone()).collect()
}

/// Scale, fit and score one cell; returns the fitted pieces too.
fn train_cell(
    p: &Prepared<'_>,
    cell: &GridCell,
) -> Result<(FittedModel, StandardScaler, EvalMetrics), ValuationError> {
    let matrix = p.matrices.get(&cell.feature_set).ok_or_else(|| {
        ValuationError::InvalidInput(format!("feature set {} was not built", cell.feature_set.name()))
    })?;

    let raw_train = rows(matrix, &p.split.train);
    let scaler = StandardScaler::fit(&raw_train)?;
    let x_train = scaler.transform(&raw_train)?;
    let x_test = scaler.transform(&rows(matrix, &p.split.test))?;

    let model = fit_model(
        &cell.config,
        Dataset::new(&x_train, &p.y_train),
        Some(Dataset::new(&x_test, &p.y_test)),
        p.seed,
    )?;

    let train_pred = model.predict(&x_train);
    let test_pred = model.predict(&x_test);
    if train_pred.iter().chain(&test_pred).any(|v| !v.is_finite()) {
        return Err(ValuationError::PredictionError(
            "model produced non-finite predictions".to_string(),
        ));
    }

    let metrics = EvalMetrics {
        test_mae: mean_absolute_error(&p.y_test, &test_pred),
        test_median_ae: median_absolute_error(&p.y_test, &test_pred),
        test_r2: r_squared(&p.y_test, &test_pred),
        train_mae: mean_absolute_error(&p.y_train, &train_pred),
        train_r2: r_squared(&p.y_train, &train_pred),
        n_train: p.y_train.len(),
        n_test: p.y_test.len(),
    };
    Ok((model, scaler, metrics))
}

fn score_cell(p: &Prepared<'_>, cell: &GridCell) -> Result<CellScore, ValuationError> {
    let (model, _, metrics) = train_cell(p, cell)?;
    Ok(CellScore {
        n_estimators: model.n_estimators(),
        metrics,
    })
}

fn fit_candidate(p: &Prepared<'_>, cell: &GridCell) -> Result<TrainedCandidate, ValuationError> {
    let (model, scaler, metrics) = train_cell(p, cell)?;
    Ok(TrainedCandidate {
        feature_set: cell.feature_set,
        hyperparam_name: cell.config.name.clone(),
        model,
        scaler,
        feature_columns: features::column_names(cell.feature_set),
        metrics,
    })
}
