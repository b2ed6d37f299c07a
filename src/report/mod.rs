//! Reporting utilities: held-out predictions and formatted terminal output.

pub mod format;

pub use format::*;

use crate::domain::{Coordinates, NormalizedTransaction, PropertyType};
use crate::error::ValuationError;
use crate::features::{self, FeatureContext, FeatureInput};
use crate::fit::Selection;
use crate::models::Regressor;

/// Number of held-out rows shown after training.
pub const DEFAULT_SAMPLE_PREDICTIONS: usize = 15;

/// The winning model's estimate for one held-out record.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldoutPrediction {
    pub postcode: String,
    pub property_type: PropertyType,
    pub bedrooms: u32,
    pub bathrooms: u32,
    /// Inflation-adjusted price.
    pub actual: f64,
    pub predicted: f64,
}

impl HoldoutPrediction {
    pub fn error(&self) -> f64 {
        self.predicted - self.actual
    }

    pub fn pct_error(&self) -> f64 {
        if self.actual == 0.0 {
            f64::NAN
        } else {
            100.0 * self.error() / self.actual
        }
    }
}

/// Predictions from the selected model on the first `limit` test rows.
pub fn holdout_predictions(
    records: &[NormalizedTransaction],
    selection: &Selection,
    reference_point: Coordinates,
    limit: usize,
) -> Result<Vec<HoldoutPrediction>, ValuationError> {
    let best = &selection.best;
    let ctx = FeatureContext { reference_point };
    let mut out = Vec::with_capacity(limit.min(selection.test_indices.len()));
    for &i in selection.test_indices.iter().take(limit) {
        let tx = records.get(i).ok_or_else(|| {
            ValuationError::InvalidInput(format!("test index {i} outside {} records", records.len()))
        })?;
        let row = features::build(&FeatureInput::from_transaction(tx), best.feature_set, &ctx);
        row.ensure_matches(&best.feature_columns)?;
        let scaled = best.scaler.transform_row(&row.values)?;
        let predicted = best.model.predict_row(&scaled);
        if !predicted.is_finite() {
            return Err(ValuationError::PredictionError(
                "non-finite prediction on a held-out row".to_string(),
            ));
        }
        out.push(HoldoutPrediction {
            postcode: tx.record.postcode.clone(),
            property_type: tx.record.property_type,
            bedrooms: tx.record.bedrooms,
            bathrooms: tx.record.bathrooms,
            actual: tx.adjusted_price,
            predicted,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::select_best;
    use crate::fit::selection::tests::{quick_config, synthetic};

    #[test]
    fn holdout_rows_come_from_the_test_split() {
        let records = synthetic(120);
        let config = quick_config();
        let selection = select_best(&records, &config).unwrap();
        let preds = holdout_predictions(&records, &selection, config.reference_point, 15).unwrap();
        assert_eq!(preds.len(), 15);
        for (p, &i) in preds.iter().zip(&selection.test_indices) {
            assert_eq!(p.actual, records[i].adjusted_price);
            assert!(p.predicted.is_finite());
        }

        let all = holdout_predictions(&records, &selection, config.reference_point, 1_000).unwrap();
        assert_eq!(all.len(), selection.test_indices.len());
    }

    #[test]
    fn percentage_error() {
        let p = HoldoutPrediction {
            postcode: "PO1 1AA".to_string(),
            property_type: PropertyType::Flat,
            bedrooms: 1,
            bathrooms: 1,
            actual: 200_000.0,
            predicted: 220_000.0,
        };
        assert_eq!(p.error(), 20_000.0);
        assert!((p.pct_error() - 10.0).abs() < 1e-12);
    }
}
