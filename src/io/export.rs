//! CSV exports: the training leaderboard and generated sample listings.
//!
//! Both are meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::data::sample::SampleListing;
use crate::error::ValuationError;
use crate::fit::LeaderboardEntry;

#[derive(Debug, Serialize)]
struct LeaderboardRow<'a> {
    rank: usize,
    feature_set: &'a str,
    hyperparams: &'a str,
    family: &'a str,
    n_estimators: usize,
    test_mae: f64,
    test_median_ae: f64,
    test_r2: f64,
    train_mae: f64,
    train_r2: f64,
    n_train: usize,
    n_test: usize,
}

/// Write the ranked leaderboard to `path`.
pub fn write_leaderboard_csv(path: &Path, entries: &[LeaderboardEntry]) -> Result<(), ValuationError> {
    let file = create(path)?;
    write_leaderboard(file, entries)
}

pub fn write_leaderboard<W: Write>(out: W, entries: &[LeaderboardEntry]) -> Result<(), ValuationError> {
    let mut writer = csv::Writer::from_writer(out);
    for e in entries {
        writer
            .serialize(LeaderboardRow {
                rank: e.rank,
                feature_set: e.feature_set.name(),
                hyperparams: &e.hyperparam_name,
                family: e.family.display_name(),
                n_estimators: e.n_estimators,
                test_mae: e.metrics.test_mae,
                test_median_ae: e.metrics.test_median_ae,
                test_r2: e.metrics.test_r2,
                train_mae: e.metrics.train_mae,
                train_r2: e.metrics.train_r2,
                n_train: e.metrics.n_train,
                n_test: e.metrics.n_test,
            })
            .map_err(|e| ValuationError::Io(format!("failed to write leaderboard row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| ValuationError::Io(format!("failed to flush leaderboard CSV: {e}")))
}

/// Write generated listings in the listings ingest layout.
pub fn write_listings_csv(path: &Path, listings: &[SampleListing]) -> Result<(), ValuationError> {
    let file = create(path)?;
    write_listings(file, listings)
}

pub fn write_listings<W: Write>(out: W, listings: &[SampleListing]) -> Result<(), ValuationError> {
    let mut writer = csv::Writer::from_writer(out);
    for l in listings {
        writer
            .serialize(l)
            .map_err(|e| ValuationError::Io(format!("failed to write listing row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| ValuationError::Io(format!("failed to flush listings CSV: {e}")))
}

fn create(path: &Path) -> Result<File, ValuationError> {
    File::create(path).map_err(|e| {
        ValuationError::InvalidInput(format!("failed to create '{}': {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::{SampleConfig, generate_sample};
    use crate::domain::{EvalMetrics, FeatureSetKind, InputLayout, ModelFamily};
    use crate::io::ingest::read_transactions;

    #[test]
    fn leaderboard_has_header_and_rows() {
        let entry = LeaderboardEntry {
            rank: 1,
            feature_set: FeatureSetKind::GeoExpanded,
            hyperparam_name: "B".to_string(),
            family: ModelFamily::GradientBoosting,
            n_estimators: 412,
            metrics: EvalMetrics {
                test_mae: 41_000.5,
                test_median_ae: 30_000.0,
                test_r2: 0.71,
                train_mae: 35_000.0,
                train_r2: 0.8,
                n_train: 80,
                n_test: 20,
            },
            grid_index: 6,
        };
        let mut buf = Vec::new();
        write_leaderboard(&mut buf, &[entry]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("rank,feature_set,hyperparams,family"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("1,geo_expanded,B,Gradient Boosting (L1),412,41000.5"));
    }

    #[test]
    fn generated_listings_read_back_as_listings() {
        let cfg = SampleConfig::new(20, 3, chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        let sample = generate_sample(&cfg).unwrap();
        let mut buf = Vec::new();
        write_listings(&mut buf, &sample.listings).unwrap();

        let data = read_transactions(buf.as_slice(), InputLayout::Auto).unwrap();
        assert_eq!(data.layout, InputLayout::Listings);
        assert_eq!(data.rows.len(), 20);
        assert!(data.row_errors.is_empty());
        assert_eq!(data.rows[0].price, Some(sample.listings[0].price));
    }
}
