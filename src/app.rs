//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that
//! parses arguments, builds configuration and prints results. Reports go to
//! stdout; logs go to stderr.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use clap::Parser;
use tracing::info;

use crate::cli::{Command, ImportanceArgs, SampleArgs, SearchArgs, StoreArgs, TrainArgs, ValueArgs};
use crate::data::{AddressDirectory, CsvAddressDirectory, PostcodesIoClient, SampleConfig};
use crate::domain::{Coordinates, InferenceConfig, NormalizeConfig, TrainConfig};
use crate::error::{AppError, ValuationError};
use crate::inference::{ValuationRequest, ValuationService};
use crate::io::artifact::ArtifactStore;

pub mod pipeline;

/// Entry point for the `hv` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Train(args) => handle_train(args),
        Command::Value(args) => handle_value(args),
        Command::Health(args) => handle_health(args),
        Command::Importance(args) => handle_importance(args),
        Command::Search(args) => handle_search(args),
        Command::Sample(args) => handle_sample(args),
    }
}

fn handle_train(args: TrainArgs) -> Result<(), AppError> {
    let job = train_job_from_args(&args)?;
    let run = pipeline::run_train(&job)?;

    println!("{}", crate::report::format_clean_summary(&run.ingest, &run.clean));
    println!("{}", crate::report::format_leaderboard(&run.selection, args.top));

    let service = ValuationService::new(Some(run.bundle.clone()), InferenceConfig::default())?;
    println!("{}", crate::report::format_importances(&service.feature_importances()?));
    if !run.holdout.is_empty() {
        println!("{}", crate::report::format_holdout(&run.holdout));
    }

    if let Some(path) = &args.export_leaderboard {
        crate::io::export::write_leaderboard_csv(path, &run.selection.leaderboard)?;
        info!(path = %path.display(), "wrote leaderboard CSV");
    }
    match &run.saved_to {
        Some(dir) => println!("Model saved to {}", dir.display()),
        None => println!("Dry run: model not saved."),
    }
    Ok(())
}

pub fn train_job_from_args(args: &TrainArgs) -> Result<pipeline::TrainJob, AppError> {
    let reference_date = args
        .reference_date
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let mut normalize = NormalizeConfig::with_reference_date(reference_date);
    normalize.price_min = args.price_min;
    normalize.price_max = args.price_max;
    normalize.annual_rate = args.inflation_rate;
    normalize.target_year = args.target_year;

    let defaults = TrainConfig::default();
    let reference_point = Coordinates::new(args.reference_lat, args.reference_lon);
    if !reference_point.is_finite() {
        return Err(AppError::new(2, "Reference point must be finite."));
    }
    let train = TrainConfig {
        seed: args.seed,
        test_fraction: args.test_fraction,
        feature_sets: if args.feature_sets.is_empty() {
            defaults.feature_sets.clone()
        } else {
            dedup(&args.feature_sets)
        },
        families: if args.families.is_empty() {
            defaults.families.clone()
        } else {
            dedup(&args.families)
        },
        reference_point,
        ..defaults
    };

    Ok(pipeline::TrainJob {
        input: args.input.clone(),
        layout: args.layout,
        normalize,
        train,
        store: if args.dry_run { None } else { Some(store_from_args(&args.store)) },
        sample_predictions: args.samples,
    })
}

fn handle_value(args: ValueArgs) -> Result<(), AppError> {
    let request = match &args.request {
        Some(path) => read_request(path)?,
        None => ValuationRequest {
            postcode: args.postcode.clone(),
            address_id: args.address_id,
            beds: args.beds,
            baths: args.baths,
            property_type: args.property_type.clone(),
        },
    };

    let service = ValuationService::from_store(&store_from_args(&args.store), InferenceConfig::default());
    let resolver = PostcodesIoClient::from_env()?;
    let directory = match &args.addresses {
        Some(path) => Some(CsvAddressDirectory::load(path)?),
        None => None,
    };
    let directory_ref = directory.as_ref().map(|d| d as &dyn AddressDirectory);

    let response = service.handle(&request, &resolver, directory_ref)?;
    print_json(&response)
}

fn handle_health(args: StoreArgs) -> Result<(), AppError> {
    let service = ValuationService::from_store(&store_from_args(&args), InferenceConfig::default());
    print_json(&service.health())
}

fn handle_importance(args: ImportanceArgs) -> Result<(), AppError> {
    let service = ValuationService::from_store(&store_from_args(&args.store), InferenceConfig::default());
    let importances = service.feature_importances()?;
    if args.json {
        return print_json(&importances);
    }
    if let Some(meta) = service.metadata() {
        println!(
            "Model: {} / {} / {} (trained {})",
            meta.family.display_name(),
            meta.feature_set.name(),
            meta.hyperparam_name,
            meta.trained_at.format("%Y-%m-%d %H:%M UTC")
        );
    }
    print!("{}", crate::report::format_importances(&importances));
    Ok(())
}

fn handle_search(args: SearchArgs) -> Result<(), AppError> {
    let directory = CsvAddressDirectory::load(&args.addresses)?;
    let hits = directory.search(&args.query, args.limit);
    print!("{}", crate::report::format_search_results(&hits));
    Ok(())
}

fn handle_sample(args: SampleArgs) -> Result<(), AppError> {
    let last_sale = args
        .last_sale
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let mut config = SampleConfig::new(args.count, args.seed, last_sale);
    config.centre = Coordinates::new(args.centre_lat, args.centre_lon);
    config.area = args.area.trim().to_ascii_uppercase();

    let sample = crate::data::generate_sample(&config)?;
    crate::io::export::write_listings_csv(&args.output, &sample.listings)?;
    let s = &sample.stats;
    println!(
        "Wrote {} listings to {} (prices {}..{}, sold {}..{})",
        s.n_listings,
        args.output.display(),
        crate::report::fmt_money(s.price_min),
        crate::report::fmt_money(s.price_max),
        s.first_sale,
        s.last_sale
    );
    Ok(())
}

fn store_from_args(args: &StoreArgs) -> ArtifactStore {
    match &args.artifact_dir {
        Some(dir) => ArtifactStore::new(dir.clone()),
        None => ArtifactStore::from_env(),
    }
}

fn read_request(path: &Path) -> Result<ValuationRequest, AppError> {
    let mut raw = String::new();
    if path.as_os_str() == "-" {
        std::io::stdin()
            .read_to_string(&mut raw)
            .map_err(|e| AppError::new(2, format!("Failed to read request from stdin: {e}")))?;
    } else {
        File::open(path)
            .and_then(|mut f| f.read_to_string(&mut raw))
            .map_err(|e| AppError::new(2, format!("Failed to read request '{}': {e}", path.display())))?;
    }
    serde_json::from_str(&raw)
        .map_err(|e| ValuationError::InvalidInput(format!("malformed request JSON: {e}")).into())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::new(4, format!("Failed to serialize output: {e}")))?;
    println!("{text}");
    Ok(())
}

fn dedup<T: PartialEq + Copy>(items: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for &item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FeatureSetKind, ModelFamily};

    #[test]
    fn train_args_map_to_job() {
        let cli = crate::cli::Cli::parse_from([
            "hv",
            "train",
            "-i",
            "x.csv",
            "--family",
            "ridge",
            "--family",
            "ridge",
            "--reference-date",
            "2025-01-01",
            "--target-year",
            "2025",
            "--dry-run",
        ]);
        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        let job = train_job_from_args(&args).unwrap();
        assert_eq!(job.train.families, vec![ModelFamily::Ridge]);
        assert_eq!(job.train.feature_sets, FeatureSetKind::ALL.to_vec());
        assert!(job.store.is_none());
        assert_eq!(job.normalize.target_year, 2025);
        assert_eq!(
            job.normalize.target_epoch(),
            chrono::NaiveDate::from_ymd_opt(2025, 1, 1)
        );
        assert_eq!(
            job.normalize.reference_date,
            chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
    }
}
