//! The training pipeline behind `hv train`.
//!
//! ingest -> clean -> select -> persist -> held-out report
//!
//! Presentation stays in `app`; this module only computes.

use std::path::PathBuf;

use tracing::info;

use crate::domain::{InputLayout, NormalizeConfig, NormalizedTransaction, TrainConfig};
use crate::error::{AppError, ValuationError};
use crate::fit::{Selection, select_best};
use crate::io::artifact::{ArtifactBundle, ArtifactStore};
use crate::io::ingest::{IngestedData, load_transactions};
use crate::normalize::{CleanOutcome, clean};
use crate::report::{HoldoutPrediction, holdout_predictions};

/// Everything a training run needs.
#[derive(Debug, Clone)]
pub struct TrainJob {
    pub input: PathBuf,
    pub layout: InputLayout,
    pub normalize: NormalizeConfig,
    pub train: TrainConfig,
    /// `None` trains without persisting.
    pub store: Option<ArtifactStore>,
    pub sample_predictions: usize,
}

/// All computed outputs of one training run.
#[derive(Debug, Clone)]
pub struct TrainOutput {
    pub ingest: IngestedData,
    pub clean: CleanOutcome,
    pub selection: Selection,
    pub bundle: ArtifactBundle,
    /// Directory the bundle was written to, when persisted.
    pub saved_to: Option<PathBuf>,
    pub holdout: Vec<HoldoutPrediction>,
}

pub fn run_train(job: &TrainJob) -> Result<TrainOutput, AppError> {
    let ingest = load_transactions(&job.input, job.layout)?;
    let output = train_on_rows(job, ingest)?;
    Ok(output)
}

/// Run everything after ingest. Split out so callers with in-memory rows
/// (tests, generated samples) skip the file.
pub fn train_on_rows(job: &TrainJob, ingest: IngestedData) -> Result<TrainOutput, ValuationError> {
    let cleaned = clean(&ingest.rows, &job.normalize)?;
    let (selection, bundle) = train_records(&cleaned.records, &job.train)?;

    let saved_to = match &job.store {
        Some(store) => Some(store.save(&bundle)?),
        None => {
            info!("dry run; artifact not saved");
            None
        }
    };

    let holdout = holdout_predictions(
        &cleaned.records,
        &selection,
        job.train.reference_point,
        job.sample_predictions,
    )?;

    Ok(TrainOutput {
        ingest,
        clean: cleaned,
        selection,
        bundle,
        saved_to,
        holdout,
    })
}

/// Select the best candidate and package it for the artifact store.
pub fn train_records(
    records: &[NormalizedTransaction],
    config: &TrainConfig,
) -> Result<(Selection, ArtifactBundle), ValuationError> {
    let selection = select_best(records, config)?;
    let bundle = ArtifactBundle::from_candidate(&selection.best, config.reference_point);
    Ok((selection, bundle))
}
