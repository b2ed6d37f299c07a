//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during cleaning and training
//! - persisted inside the model artifact bundle
//! - exchanged as JSON at the inference boundary

use chrono::{Datelike, Months, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Plausible sale price band for training records (inclusive).
pub const DEFAULT_PRICE_MIN: f64 = 50_000.0;
pub const DEFAULT_PRICE_MAX: f64 = 10_000_000.0;

/// Compound annual growth used to bring historical prices to the target epoch.
pub const DEFAULT_ANNUAL_INFLATION: f64 = 0.03;

/// Prices are adjusted to January 1st of this year.
pub const DEFAULT_TARGET_YEAR: i32 = 2026;

/// Day-count basis for fractional years.
pub const DAYS_PER_YEAR: f64 = 365.25;

/// Reference point for the `dist_ref` feature (Portsmouth city centre).
///
/// The training corpus was collected around this point; deployments covering a
/// different region should override it at training time.
pub const DEFAULT_REFERENCE_POINT: Coordinates = Coordinates {
    latitude: 50.7989,
    longitude: -1.0912,
};

/// Coordinate substituted when a legacy `address_id` cannot be found (central London).
pub const DEFAULT_FALLBACK_LOCATION: Coordinates = Coordinates {
    latitude: 51.5074,
    longitude: -0.1278,
};

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_EARLY_STOPPING_PATIENCE: usize = 30;

/// Inference output band.
pub const DEFAULT_CLAMP_MIN: f64 = 30_000.0;
pub const DEFAULT_CLAMP_MAX: f64 = 5_000_000.0;
pub const DEFAULT_VARIANCE_PCT: f64 = 0.10;
/// Monthly rent is approximated as `value / divisor`.
pub const DEFAULT_RENT_DIVISOR: f64 = 200.0;

/// Degraded-mode estimate used when no model is loaded.
pub const FALLBACK_BASE_VALUE: f64 = 300_000.0;
pub const FALLBACK_BASE_RENT: f64 = 1_000.0;
pub const FALLBACK_SPREAD_PCT: f64 = 0.20;

/// Residential property type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Detached,
    SemiDetached,
    Terraced,
    Flat,
    Other,
}

impl PropertyType {
    pub const ALL: [PropertyType; 5] = [
        PropertyType::Detached,
        PropertyType::SemiDetached,
        PropertyType::Terraced,
        PropertyType::Flat,
        PropertyType::Other,
    ];

    /// Land Registry single-letter code (`D`, `S`, `T`, `F`, `O`).
    pub fn from_code(code: &str) -> PropertyType {
        match code.trim().to_ascii_uppercase().as_str() {
            "D" => PropertyType::Detached,
            "S" => PropertyType::SemiDetached,
            "T" => PropertyType::Terraced,
            "F" => PropertyType::Flat,
            _ => PropertyType::Other,
        }
    }

    /// Free-text listing label ("Semi-Detached House", "Apartment", ...).
    ///
    /// `semi` is checked before `detach` so semi-detached homes are not counted
    /// as detached.
    pub fn from_label(label: &str) -> PropertyType {
        let l = label.trim().to_ascii_lowercase();
        if l.contains("semi") {
            PropertyType::SemiDetached
        } else if l.contains("detach") {
            PropertyType::Detached
        } else if l.contains("terrace") {
            PropertyType::Terraced
        } else if l.contains("flat") || l.contains("apartment") || l.contains("maisonette") {
            PropertyType::Flat
        } else {
            PropertyType::Other
        }
    }

    /// Label used in responses.
    pub fn label(self) -> &'static str {
        match self {
            PropertyType::Detached => "detached",
            PropertyType::SemiDetached => "semi-detached",
            PropertyType::Terraced => "terraced",
            PropertyType::Flat => "flat",
            PropertyType::Other => "other",
        }
    }
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// A raw transaction row as read from the input file.
///
/// Everything is optional: the normalizer decides what is usable.
#[derive(Debug, Clone, Default)]
pub struct RawTransaction {
    pub id: Option<String>,
    pub price: Option<f64>,
    pub sale_date: Option<String>,
    pub postcode: Option<String>,
    pub property_type: Option<PropertyType>,
    pub locality: Option<String>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub location: Option<Coordinates>,
}

/// A cleaned sale transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub postcode: String,
    pub property_type: PropertyType,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub sale_price: f64,
    pub sale_date: NaiveDate,
}

/// A cleaned record plus its inflation-adjusted price (the training target).
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTransaction {
    pub record: TransactionRecord,
    pub adjusted_price: f64,
    pub years_since_sale: f64,
}

/// Which named feature schema to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSetKind {
    /// Structure, property-type flags and raw coordinates.
    Base,
    /// `base` plus polynomial and distance-to-reference location terms.
    GeoExpanded,
    /// `geo_expanded` plus room interaction terms.
    Interactions,
    /// `interactions` plus sale year and years since sale.
    Temporal,
}

impl FeatureSetKind {
    pub const ALL: [FeatureSetKind; 4] = [
        FeatureSetKind::Base,
        FeatureSetKind::GeoExpanded,
        FeatureSetKind::Interactions,
        FeatureSetKind::Temporal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FeatureSetKind::Base => "base",
            FeatureSetKind::GeoExpanded => "geo_expanded",
            FeatureSetKind::Interactions => "interactions",
            FeatureSetKind::Temporal => "temporal",
        }
    }
}

/// Trainable regression model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// L1 gradient-boosted regression trees.
    GradientBoosting,
    /// Bagged regression trees.
    RandomForest,
    /// L2-regularised linear baseline.
    Ridge,
}

impl ModelFamily {
    /// Human-readable label for terminal output and the health probe.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelFamily::GradientBoosting => "Gradient Boosting (L1)",
            ModelFamily::RandomForest => "Random Forest",
            ModelFamily::Ridge => "Ridge Regression",
        }
    }
}

/// Model tunables. Not every family reads every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Upper bound on leaves per tree (growth stops once reached).
    pub max_leaves: usize,
    pub min_samples_leaf: usize,
    /// Row subsample ratio per tree.
    pub subsample: f64,
    /// Fraction of features considered per tree (boosting) or per split (forest).
    pub colsample: f64,
    /// L2 regularization (leaf shrinkage for trees, penalty for ridge).
    pub reg_lambda: f64,
    /// Rounds without held-out improvement before boosting stops.
    pub early_stopping_rounds: Option<usize>,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            n_estimators: 500,
            learning_rate: 0.05,
            max_depth: 6,
            max_leaves: 31,
            min_samples_leaf: 20,
            subsample: 0.8,
            colsample: 0.8,
            reg_lambda: 0.1,
            early_stopping_rounds: Some(DEFAULT_EARLY_STOPPING_PATIENCE),
        }
    }
}

/// A named candidate configuration in the selection grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterConfig {
    pub name: String,
    pub family: ModelFamily,
    pub params: HyperParams,
}

/// Held-out and in-sample error metrics for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub test_mae: f64,
    pub test_median_ae: f64,
    pub test_r2: f64,
    pub train_mae: f64,
    pub train_r2: f64,
    pub n_train: usize,
    pub n_test: usize,
}

/// Input file layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum InputLayout {
    /// Detect from the first row.
    Auto,
    /// Headerless HM Land Registry price-paid export (positional columns).
    LandRegistry,
    /// Headed sold-listings export with structure and coordinates.
    Listings,
}

/// Date-recency window used while cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecencyWindow {
    Years(u32),
    Unbounded,
}

impl RecencyWindow {
    /// Earliest sale date admitted by this window, relative to `reference`.
    pub fn cutoff(self, reference: NaiveDate) -> Option<NaiveDate> {
        match self {
            RecencyWindow::Years(years) => {
                reference.checked_sub_months(Months::new(years.saturating_mul(12)))
            }
            RecencyWindow::Unbounded => None,
        }
    }
}

impl std::fmt::Display for RecencyWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecencyWindow::Years(y) => write!(f, "{y}-year"),
            RecencyWindow::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Record Normalizer settings.
#[derive(Debug, Clone)]
pub struct NormalizeConfig {
    pub price_min: f64,
    pub price_max: f64,
    pub annual_rate: f64,
    pub target_year: i32,
    /// "Today" for the recency ladder.
    pub reference_date: NaiveDate,
    /// Tried in order; the first window leaving any record wins.
    pub recency_ladder: Vec<RecencyWindow>,
}

impl NormalizeConfig {
    pub fn with_reference_date(reference_date: NaiveDate) -> Self {
        Self {
            price_min: DEFAULT_PRICE_MIN,
            price_max: DEFAULT_PRICE_MAX,
            annual_rate: DEFAULT_ANNUAL_INFLATION,
            target_year: DEFAULT_TARGET_YEAR,
            reference_date,
            recency_ladder: vec![
                RecencyWindow::Years(10),
                RecencyWindow::Years(20),
                RecencyWindow::Unbounded,
            ],
        }
    }

    /// January 1st of the target year.
    pub fn target_epoch(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.target_year, 1, 1)
    }
}

/// Trainer/Selector settings.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub seed: u64,
    pub test_fraction: f64,
    pub feature_sets: Vec<FeatureSetKind>,
    pub families: Vec<ModelFamily>,
    pub reference_point: Coordinates,
    /// Relative MAE difference below which two candidates count as tied.
    pub tie_epsilon: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            test_fraction: DEFAULT_TEST_FRACTION,
            feature_sets: FeatureSetKind::ALL.to_vec(),
            families: vec![
                ModelFamily::GradientBoosting,
                ModelFamily::RandomForest,
                ModelFamily::Ridge,
            ],
            reference_point: DEFAULT_REFERENCE_POINT,
            tie_epsilon: 1e-9,
        }
    }
}

/// Inference Service settings.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub clamp_min: f64,
    pub clamp_max: f64,
    pub variance_pct: f64,
    pub rent_divisor: f64,
    pub fallback_value: f64,
    pub fallback_rent: f64,
    pub fallback_spread_pct: f64,
    /// Substituted for `sale_year` when a model uses temporal features.
    pub service_year: i32,
    pub fallback_location: Coordinates,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            clamp_min: DEFAULT_CLAMP_MIN,
            clamp_max: DEFAULT_CLAMP_MAX,
            variance_pct: DEFAULT_VARIANCE_PCT,
            rent_divisor: DEFAULT_RENT_DIVISOR,
            fallback_value: FALLBACK_BASE_VALUE,
            fallback_rent: FALLBACK_BASE_RENT,
            fallback_spread_pct: FALLBACK_SPREAD_PCT,
            service_year: chrono::Local::now().year(),
            fallback_location: DEFAULT_FALLBACK_LOCATION,
        }
    }
}

/// Structural query with resolved coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuationQuery {
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub property_type: PropertyType,
    pub location: Coordinates,
}

/// Bounded price estimate in whole currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub min_value: i64,
    pub avg_value: i64,
    pub max_value: i64,
    pub predicted_rent: i64,
    pub model_loaded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semi_detached_label_is_not_detached() {
        assert_eq!(
            PropertyType::from_label("Semi-Detached House"),
            PropertyType::SemiDetached
        );
        assert_eq!(PropertyType::from_label("Detached"), PropertyType::Detached);
        assert_eq!(PropertyType::from_label("Maisonette"), PropertyType::Flat);
        assert_eq!(PropertyType::from_label("End of Terrace"), PropertyType::Terraced);
        assert_eq!(PropertyType::from_label("Bungalow"), PropertyType::Other);
    }

    #[test]
    fn land_registry_codes() {
        assert_eq!(PropertyType::from_code("d"), PropertyType::Detached);
        assert_eq!(PropertyType::from_code("F"), PropertyType::Flat);
        assert_eq!(PropertyType::from_code("O"), PropertyType::Other);
    }

    #[test]
    fn recency_cutoff() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let cutoff = RecencyWindow::Years(10).cutoff(today).unwrap();
        assert_eq!(cutoff, NaiveDate::from_ymd_opt(2016, 1, 1).unwrap());
        // Ten years spanning three leap days is 3653 days, not 3650.
        assert_eq!((today - cutoff).num_days(), 3653);
        assert_eq!(RecencyWindow::Unbounded.cutoff(today), None);

        let leap = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(
            RecencyWindow::Years(1).cutoff(leap),
            NaiveDate::from_ymd_opt(2023, 2, 28)
        );
    }
}
