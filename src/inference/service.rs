//! The loaded-model valuation service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{InferenceConfig, ValuationQuery, ValuationResult};
use crate::error::ValuationError;
use crate::features::{self, FeatureContext, FeatureInput, FeatureVector};
use crate::io::artifact::{ArtifactBundle, ArtifactMetadata, ArtifactStore};
use crate::models::Regressor;

const FALLBACK_MODEL_TYPE: &str = "none (fallback estimate)";

/// Health probe payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model_loaded: bool,
    pub model_type: String,
    pub timestamp: DateTime<Utc>,
}

/// One column's share of the model's importance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Immutable after construction; share it with `Arc` and swap the whole
/// service to pick up a new artifact.
#[derive(Debug, Clone)]
pub struct ValuationService {
    bundle: Option<ArtifactBundle>,
    config: InferenceConfig,
}

impl ValuationService {
    /// A `None` bundle gives the degraded service. A bundle that fails
    /// validation is rejected.
    pub fn new(bundle: Option<ArtifactBundle>, config: InferenceConfig) -> Result<Self, ValuationError> {
        if let Some(b) = &bundle {
            b.validate()?;
        }
        Ok(Self { bundle, config })
    }

    /// Load the current artifact; any failure degrades to the fallback estimator.
    pub fn from_store(store: &ArtifactStore, config: InferenceConfig) -> Self {
        match store.load() {
            Ok(bundle) => {
                info!(
                    family = bundle.metadata.family.display_name(),
                    feature_set = bundle.metadata.feature_set.name(),
                    hyperparams = %bundle.metadata.hyperparam_name,
                    trained_at = %bundle.metadata.trained_at,
                    "loaded model artifact"
                );
                Self {
                    bundle: Some(bundle),
                    config,
                }
            }
            Err(e) => {
                warn!(error = %e, root = %store.root().display(), "no usable model artifact; serving fallback estimates");
                Self { bundle: None, config }
            }
        }
    }

    /// A fresh service over whatever the store currently holds.
    pub fn reload(&self, store: &ArtifactStore) -> Self {
        Self::from_store(store, self.config.clone())
    }

    pub fn is_model_loaded(&self) -> bool {
        self.bundle.is_some()
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn metadata(&self) -> Option<&ArtifactMetadata> {
        self.bundle.as_ref().map(|b| &b.metadata)
    }

    pub fn model_type(&self) -> String {
        match &self.bundle {
            Some(b) => b.metadata.family.display_name().to_string(),
            None => FALLBACK_MODEL_TYPE.to_string(),
        }
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "ok".to_string(),
            model_loaded: self.is_model_loaded(),
            model_type: self.model_type(),
            timestamp: Utc::now(),
        }
    }

    /// Estimate a price band for `query`.
    pub fn predict(&self, query: &ValuationQuery) -> Result<ValuationResult, ValuationError> {
        validate_query(query)?;
        let Some(bundle) = &self.bundle else {
            return Ok(self.fallback_estimate());
        };
        let ctx = FeatureContext {
            reference_point: bundle.metadata.reference_point,
        };
        let input = FeatureInput::from_query(query, self.config.service_year);
        let row = features::build_for_columns(&input, &bundle.feature_columns, &ctx)?;
        self.predict_features(&row)
    }

    /// Run the model on an already-built row.
    ///
    /// The row must match the artifact's column list exactly; it is checked
    /// before the scaler or model sees it.
    pub fn predict_features(&self, row: &FeatureVector) -> Result<ValuationResult, ValuationError> {
        let Some(bundle) = &self.bundle else {
            return Ok(self.fallback_estimate());
        };
        row.ensure_matches(&bundle.feature_columns)?;
        if row.values.iter().any(|v| !v.is_finite()) {
            return Err(ValuationError::PredictionError(
                "feature row contains non-finite values".to_string(),
            ));
        }
        let scaled = bundle.scaler.transform_row(&row.values)?;
        let raw = bundle.model.predict_row(&scaled);
        if !raw.is_finite() {
            return Err(ValuationError::PredictionError(format!(
                "model produced a non-finite price ({raw})"
            )));
        }

        let cfg = &self.config;
        let price = raw.clamp(cfg.clamp_min, cfg.clamp_max);
        let variance = price * cfg.variance_pct;
        Ok(ValuationResult {
            min_value: whole(price - variance)?,
            avg_value: whole(price)?,
            max_value: whole(price + variance)?,
            predicted_rent: whole(price / cfg.rent_divisor)?,
            model_loaded: true,
        })
    }

    /// Importances of the loaded model, largest first.
    pub fn feature_importances(&self) -> Result<Vec<FeatureImportance>, ValuationError> {
        let bundle = self.bundle.as_ref().ok_or_else(|| {
            ValuationError::ArtifactMissing("feature importances need a trained model".to_string())
        })?;
        let mut out: Vec<FeatureImportance> = bundle
            .feature_columns
            .iter()
            .zip(bundle.model.feature_importances())
            .map(|(name, importance)| FeatureImportance {
                feature: name.clone(),
                importance,
            })
            .collect();
        out.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        Ok(out)
    }

    fn fallback_estimate(&self) -> ValuationResult {
        let cfg = &self.config;
        let v = cfg.fallback_value;
        let spread = v * cfg.fallback_spread_pct;
        ValuationResult {
            min_value: (v - spread).trunc() as i64,
            avg_value: v.trunc() as i64,
            max_value: (v + spread).trunc() as i64,
            predicted_rent: cfg.fallback_rent.trunc() as i64,
            model_loaded: false,
        }
    }
}

fn validate_query(query: &ValuationQuery) -> Result<(), ValuationError> {
    if query.bedrooms < 1 || query.bathrooms < 1 {
        return Err(ValuationError::InvalidInput(
            "bedrooms and bathrooms must be at least 1".to_string(),
        ));
    }
    if !query.location.is_finite() {
        return Err(ValuationError::InvalidInput(
            "location coordinates must be finite".to_string(),
        ));
    }
    Ok(())
}

/// Drops the fractional part; whole pounds are never rounded up.
fn whole(v: f64) -> Result<i64, ValuationError> {
    if v.is_finite() {
        Ok(v.trunc() as i64)
    } else {
        Err(ValuationError::PredictionError(format!("non-finite output ({v})")))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::{
        Coordinates, DEFAULT_REFERENCE_POINT, EvalMetrics, FeatureSetKind, HyperParams,
        HyperparameterConfig, ModelFamily, PropertyType,
    };
    use crate::io::artifact::FORMAT_VERSION;
    use crate::models::{Dataset, StandardScaler, fit_model};

    /// A ridge bundle over the base schema whose prediction is ~`value` everywhere.
    pub(crate) fn constant_bundle(value: f64) -> ArtifactBundle {
        let columns = features::column_names(FeatureSetKind::Base);
        let rows: Vec<Vec<f64>> = (0..30)
            .map(|i| {
                let t = i as f64;
                vec![
                    1.0 + (i % 4) as f64,
                    1.0 + (i % 2) as f64,
                    f64::from(i % 3 == 0),
                    f64::from(i % 3 == 1),
                    f64::from(i % 3 == 2),
                    0.0,
                    50.7 + t * 0.01,
                    -1.1 + t * 0.005,
                ]
            })
            .collect();
        let y = vec![value; rows.len()];
        let scaler = StandardScaler::fit(&rows).unwrap();
        let scaled = scaler.transform(&rows).unwrap();
        let config = HyperparameterConfig {
            name: "ridge".to_string(),
            family: ModelFamily::Ridge,
            params: HyperParams {
                reg_lambda: 1.0,
                ..HyperParams::default()
            },
        };
        let model = fit_model(&config, Dataset::new(&scaled, &y), None, 1).unwrap();
        ArtifactBundle {
            model,
            scaler,
            feature_columns: columns,
            metadata: ArtifactMetadata {
                format_version: FORMAT_VERSION,
                trained_at: Utc::now(),
                feature_set: FeatureSetKind::Base,
                hyperparam_name: "ridge".to_string(),
                family: ModelFamily::Ridge,
                metrics: EvalMetrics {
                    test_mae: 0.0,
                    test_median_ae: 0.0,
                    test_r2: 0.0,
                    train_mae: 0.0,
                    train_r2: 0.0,
                    n_train: 30,
                    n_test: 0,
                },
                reference_point: DEFAULT_REFERENCE_POINT,
            },
        }
    }

    pub(crate) fn query(beds: u32, baths: u32) -> ValuationQuery {
        ValuationQuery {
            bedrooms: beds,
            bathrooms: baths,
            property_type: PropertyType::SemiDetached,
            location: Coordinates::new(50.79, -1.08),
        }
    }

    fn service(value: f64) -> ValuationService {
        ValuationService::new(Some(constant_bundle(value)), InferenceConfig::default()).unwrap()
    }

    #[test]
    fn prediction_band_and_rent() {
        let r = service(250_000.3).predict(&query(3, 1)).unwrap();
        assert!(r.model_loaded);
        assert_eq!(r.avg_value, 250_000);
        assert_eq!(r.min_value, 225_000);
        assert_eq!(r.max_value, 275_000);
        assert_eq!(r.predicted_rent, 1_250);
    }

    #[test]
    fn fractional_outputs_are_truncated() {
        let r = service(250_000.6).predict(&query(3, 1)).unwrap();
        assert_eq!(r.avg_value, 250_000);
        assert_eq!(r.min_value, 225_000);
        assert_eq!(r.max_value, 275_000);
        assert_eq!(r.predicted_rent, 1_250);

        let r = service(99_999.9).predict(&query(2, 1)).unwrap();
        assert_eq!(r.avg_value, 99_999);
        assert_eq!(r.max_value, 109_999);
        assert_eq!(r.predicted_rent, 499);
    }

    #[test]
    fn predictions_are_clamped() {
        let high = service(10_000_000.0).predict(&query(3, 2)).unwrap();
        assert_eq!(high.avg_value, 5_000_000);
        let low = service(1_000.0).predict(&query(3, 2)).unwrap();
        assert_eq!(low.avg_value, 30_000);
        assert_eq!(low.min_value, 27_000);
    }

    #[test]
    fn degraded_mode_without_artifact() {
        let svc = ValuationService::new(None, InferenceConfig::default()).unwrap();
        let r = svc.predict(&query(3, 2)).unwrap();
        assert!(!r.model_loaded);
        assert_eq!(r.avg_value, 300_000);
        assert_eq!(r.min_value, 240_000);
        assert_eq!(r.max_value, 360_000);
        assert_eq!(r.predicted_rent, 1_000);
        assert!(!svc.health().model_loaded);
        assert!(matches!(
            svc.feature_importances(),
            Err(ValuationError::ArtifactMissing(_))
        ));
    }

    #[test]
    fn zero_bedrooms_is_invalid() {
        let err = service(250_000.0).predict(&query(0, 1)).unwrap_err();
        assert!(matches!(err, ValuationError::InvalidInput(_)));
    }

    #[test]
    fn mismatched_row_is_rejected_before_the_model_runs() {
        let svc = service(250_000.0);
        let ctx = FeatureContext {
            reference_point: DEFAULT_REFERENCE_POINT,
        };
        let input = FeatureInput::from_query(&query(3, 1), 2026);
        let wide = features::build(&input, FeatureSetKind::GeoExpanded, &ctx);
        assert!(matches!(
            svc.predict_features(&wide),
            Err(ValuationError::FeatureMismatch(_))
        ));
    }

    #[test]
    fn corrupt_bundle_is_rejected_at_construction() {
        let mut bundle = constant_bundle(1.0);
        bundle.feature_columns.pop();
        assert!(ValuationService::new(Some(bundle), InferenceConfig::default()).is_err());
    }

    #[test]
    fn importances_follow_column_names() {
        let imps = service(200_000.0).feature_importances().unwrap();
        assert_eq!(imps.len(), 8);
        assert!(imps.windows(2).all(|w| w[0].importance >= w[1].importance));
    }

    #[test]
    fn concurrent_predictions_share_one_service() {
        let svc = Arc::new(service(250_000.5));
        let handles: Vec<_> = (1..=4)
            .map(|beds| {
                let svc = Arc::clone(&svc);
                std::thread::spawn(move || svc.predict(&query(beds, 1)).map(|r| r.avg_value))
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap().unwrap(), 250_000);
        }
    }
}
