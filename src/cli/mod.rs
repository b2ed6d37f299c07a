//! Command-line parsing for the house valuer.
//!
//! Argument parsing and command dispatch stay separate from the pipeline and
//! modeling code.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::domain::{
    DEFAULT_ANNUAL_INFLATION, DEFAULT_PRICE_MAX, DEFAULT_PRICE_MIN, DEFAULT_REFERENCE_POINT,
    DEFAULT_SEED, DEFAULT_TARGET_YEAR, DEFAULT_TEST_FRACTION, FeatureSetKind, InputLayout,
    ModelFamily,
};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "hv", version, about = "Residential property valuation: train, select and serve price models")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Clean a transactions CSV, train the candidate grid and save the winner.
    Train(TrainArgs),
    /// Value one property with the current model (JSON on stdout).
    Value(ValueArgs),
    /// Report whether a model is loaded (JSON on stdout).
    Health(StoreArgs),
    /// Show the current model's feature importances.
    Importance(ImportanceArgs),
    /// Search the address directory.
    Search(SearchArgs),
    /// Write a synthetic sold-listings CSV.
    Sample(SampleArgs),
}

/// Where the model artifact lives.
#[derive(Debug, Args, Clone)]
pub struct StoreArgs {
    /// Artifact root directory (default: `HV_ARTIFACT_DIR`, else `./artifacts`).
    #[arg(long, value_name = "DIR")]
    pub artifact_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct TrainArgs {
    /// Transactions CSV (Land Registry price-paid or sold listings).
    #[arg(short = 'i', long, value_name = "CSV")]
    pub input: PathBuf,

    /// Input layout; `auto` inspects the first row.
    #[arg(long, value_enum, default_value_t = InputLayout::Auto)]
    pub layout: InputLayout,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Seed for the train/test split and model randomness.
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Fraction of records held out for scoring.
    #[arg(long, default_value_t = DEFAULT_TEST_FRACTION)]
    pub test_fraction: f64,

    /// Feature sets to try (repeatable; default: all).
    #[arg(long = "feature-set", value_enum)]
    pub feature_sets: Vec<FeatureSetKind>,

    /// Model families to try (repeatable; default: all).
    #[arg(long = "family", value_enum)]
    pub families: Vec<ModelFamily>,

    /// Latitude of the `dist_ref` reference point.
    #[arg(long, default_value_t = DEFAULT_REFERENCE_POINT.latitude, allow_negative_numbers = true)]
    pub reference_lat: f64,

    /// Longitude of the `dist_ref` reference point.
    #[arg(long, default_value_t = DEFAULT_REFERENCE_POINT.longitude, allow_negative_numbers = true)]
    pub reference_lon: f64,

    /// Annual house price inflation used to adjust historical prices.
    #[arg(long, default_value_t = DEFAULT_ANNUAL_INFLATION)]
    pub inflation_rate: f64,

    /// Prices are adjusted to January 1st of this year.
    #[arg(long, default_value_t = DEFAULT_TARGET_YEAR)]
    pub target_year: i32,

    #[arg(long, default_value_t = DEFAULT_PRICE_MIN)]
    pub price_min: f64,

    #[arg(long, default_value_t = DEFAULT_PRICE_MAX)]
    pub price_max: f64,

    /// "Today" for the recency window (default: the local date).
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub reference_date: Option<NaiveDate>,

    /// Leaderboard rows to print (0 = all).
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Held-out sample predictions to print.
    #[arg(long, default_value_t = crate::report::DEFAULT_SAMPLE_PREDICTIONS)]
    pub samples: usize,

    /// Export the full leaderboard to CSV.
    #[arg(long, value_name = "CSV")]
    pub export_leaderboard: Option<PathBuf>,

    /// Train and report without replacing the current artifact.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ValueArgs {
    /// UK postcode (takes precedence over `--address-id`).
    #[arg(long)]
    pub postcode: Option<String>,

    /// Legacy address id from the address directory.
    #[arg(long)]
    pub address_id: Option<u64>,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub beds: i64,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub baths: i64,

    /// `detached`, `semi-detached`, `terraced`, `flat`, ...
    #[arg(long)]
    pub property_type: Option<String>,

    /// Read the whole request as JSON from a file (`-` for stdin) instead of flags.
    #[arg(long, value_name = "JSON", conflicts_with_all = ["postcode", "address_id", "beds", "baths", "property_type"])]
    pub request: Option<PathBuf>,

    /// Address directory CSV used for `address_id` lookups.
    #[arg(long, value_name = "CSV")]
    pub addresses: Option<PathBuf>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Args, Clone)]
pub struct ImportanceArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Print JSON instead of bars.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SearchArgs {
    /// Substring of an address or postcode.
    pub query: String,

    /// Address directory CSV.
    #[arg(long, value_name = "CSV")]
    pub addresses: PathBuf,

    #[arg(long, default_value_t = crate::data::addresses::MAX_SEARCH_RESULTS)]
    pub limit: usize,
}

#[derive(Debug, Args, Clone)]
pub struct SampleArgs {
    /// Output CSV path.
    #[arg(short = 'o', long, value_name = "CSV")]
    pub output: PathBuf,

    /// Number of listings.
    #[arg(short = 'n', long, default_value_t = 2_000)]
    pub count: usize,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    #[arg(long, default_value_t = DEFAULT_REFERENCE_POINT.latitude, allow_negative_numbers = true)]
    pub centre_lat: f64,

    #[arg(long, default_value_t = DEFAULT_REFERENCE_POINT.longitude, allow_negative_numbers = true)]
    pub centre_lon: f64,

    /// Postcode area letters for generated postcodes.
    #[arg(long, default_value = "PO")]
    pub area: String,

    /// Latest sale date (default: the local date).
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub last_sale: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_train_with_repeated_selections() {
        let cli = Cli::parse_from([
            "hv",
            "train",
            "--input",
            "data.csv",
            "--family",
            "ridge",
            "--family",
            "random-forest",
            "--feature-set",
            "geo-expanded",
            "--reference-lon",
            "-0.1278",
        ]);
        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        assert_eq!(args.families, vec![ModelFamily::Ridge, ModelFamily::RandomForest]);
        assert_eq!(args.feature_sets, vec![FeatureSetKind::GeoExpanded]);
        assert_eq!(args.reference_lon, -0.1278);
        assert_eq!(args.layout, InputLayout::Auto);
        assert!(!args.dry_run);
    }

    #[test]
    fn value_request_conflicts_with_flags() {
        let err = Cli::try_parse_from(["hv", "value", "--request", "-", "--beds", "3"]);
        assert!(err.is_err());
        let ok = Cli::try_parse_from(["hv", "value", "--postcode", "PO1 3AX", "--beds", "3", "--baths", "1"]);
        assert!(ok.is_ok());
    }
}
