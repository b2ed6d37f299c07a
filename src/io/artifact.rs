//! Model artifact store.
//!
//! A bundle is three JSON blobs in `<root>/current/`:
//!
//! - `model.json`: fitted model plus metadata (format version, trained-at, feature set,
//!   configuration name, family, held-out metrics, distance reference point)
//! - `scaler.json`: standardisation parameters
//! - `feature_columns.json`: ordered column names the model expects
//!
//! `save` writes a complete staging directory and then swaps it in with directory
//! renames, so a reader never sees a mix of old and new blobs. If a save dies
//! between the renames, `load` falls back to the replaced bundle and the next
//! successful save removes it.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{Coordinates, EvalMetrics, FeatureSetKind, ModelFamily};
use crate::error::ValuationError;
use crate::features;
use crate::fit::TrainedCandidate;
use crate::models::{FittedModel, Regressor, StandardScaler};

pub const FORMAT_VERSION: u32 = 1;

pub const MODEL_FILE: &str = "model.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const COLUMNS_FILE: &str = "feature_columns.json";
const CURRENT_DIR: &str = "current";

/// Default root when `HV_ARTIFACT_DIR` is unset.
pub const DEFAULT_ARTIFACT_DIR: &str = "artifacts";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("no model artifact found under {}", .0.display())]
    NotFound(PathBuf),

    #[error("{0}")]
    Corrupt(String),

    #[error("artifact i/o failed: {0}")]
    Io(String),
}

impl From<ArtifactError> for ValuationError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::NotFound(_) => ValuationError::ArtifactMissing(err.to_string()),
            ArtifactError::Corrupt(msg) => ValuationError::CorruptArtifact(msg),
            ArtifactError::Io(msg) => ValuationError::Io(msg),
        }
    }
}

/// Provenance stored alongside the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    pub feature_set: FeatureSetKind,
    pub hyperparam_name: String,
    pub family: ModelFamily,
    pub metrics: EvalMetrics,
    pub reference_point: Coordinates,
}

#[derive(Serialize, Deserialize)]
struct ModelBlob {
    metadata: ArtifactMetadata,
    model: FittedModel,
}

/// Everything inference needs from a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactBundle {
    pub model: FittedModel,
    pub scaler: StandardScaler,
    pub feature_columns: Vec<String>,
    pub metadata: ArtifactMetadata,
}

impl ArtifactBundle {
    pub fn from_candidate(candidate: &TrainedCandidate, reference_point: Coordinates) -> Self {
        Self {
            model: candidate.model.clone(),
            scaler: candidate.scaler.clone(),
            feature_columns: candidate.feature_columns.clone(),
            metadata: ArtifactMetadata {
                format_version: FORMAT_VERSION,
                trained_at: Utc::now(),
                feature_set: candidate.feature_set,
                hyperparam_name: candidate.hyperparam_name.clone(),
                family: candidate.model.family(),
                metrics: candidate.metrics.clone(),
                reference_point,
            },
        }
    }

    /// Model, scaler and column list must agree on width and column names.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.metadata.format_version != FORMAT_VERSION {
            return Err(ArtifactError::Corrupt(format!(
                "unsupported artifact format version {} (expected {FORMAT_VERSION})",
                self.metadata.format_version
            )));
        }
        let n = self.feature_columns.len();
        if self.scaler.n_features() != n || self.scaler.scale.len() != n {
            return Err(ArtifactError::Corrupt(format!(
                "scaler has {} columns but feature_columns lists {n}",
                self.scaler.n_features()
            )));
        }
        if self.model.n_features() != n || !self.model.is_consistent() {
            return Err(ArtifactError::Corrupt(format!(
                "model expects {} columns but feature_columns lists {n}",
                self.model.n_features()
            )));
        }
        if self.model.family() != self.metadata.family {
            return Err(ArtifactError::Corrupt(
                "model family disagrees with metadata".to_string(),
            ));
        }
        let known = features::column_names(FeatureSetKind::Temporal);
        if let Some(unknown) = self.feature_columns.iter().find(|c| !known.contains(c)) {
            return Err(ArtifactError::Corrupt(format!(
                "unknown feature column '{unknown}'"
            )));
        }
        Ok(())
    }
}

/// Filesystem-backed store with "latest artifact wins" semantics.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root from `HV_ARTIFACT_DIR` (a `.env` file is honoured), else `./artifacts`.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let root = std::env::var("HV_ARTIFACT_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ARTIFACT_DIR.to_string());
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current_dir(&self) -> PathBuf {
        self.root.join(CURRENT_DIR)
    }

    /// Persist `bundle` as the current artifact. Returns the bundle directory.
    pub fn save(&self, bundle: &ArtifactBundle) -> Result<PathBuf, ArtifactError> {
        bundle.validate()?;
        fs::create_dir_all(&self.root).map_err(|e| io_err(&self.root, e))?;

        let stamp = format!(
            "{}-{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        let staging = self.root.join(format!(".staging-{stamp}"));
        fs::create_dir(&staging).map_err(|e| io_err(&staging, e))?;

        let written = write_json(&staging.join(MODEL_FILE), &ModelBlob {
            metadata: bundle.metadata.clone(),
            model: bundle.model.clone(),
        })
        .and_then(|_| write_json(&staging.join(SCALER_FILE), &bundle.scaler))
        .and_then(|_| write_json(&staging.join(COLUMNS_FILE), &bundle.feature_columns));
        if let Err(err) = written {
            let _ = fs::remove_dir_all(&staging);
            return Err(err);
        }

        let current = self.current_dir();
        let previous = self.root.join(format!(".previous-{stamp}"));
        let had_previous = current.exists();
        if had_previous {
            fs::rename(&current, &previous).map_err(|e| io_err(&current, e))?;
        }
        if let Err(e) = fs::rename(&staging, &current) {
            if had_previous {
                let _ = fs::rename(&previous, &current);
            }
            let _ = fs::remove_dir_all(&staging);
            return Err(io_err(&current, e));
        }
        for stale in self.stranded_previous() {
            if let Err(e) = fs::remove_dir_all(&stale) {
                warn!(path = %stale.display(), error = %e, "could not remove replaced artifact");
            }
        }

        info!(
            path = %current.display(),
            family = bundle.metadata.family.display_name(),
            feature_set = bundle.metadata.feature_set.name(),
            config = %bundle.metadata.hyperparam_name,
            "saved model artifact"
        );
        Ok(current)
    }

    /// Load the current bundle.
    ///
    /// When `current` is absent but a replaced bundle survives in `.previous-*`
    /// (a save interrupted between its two renames), the newest one is served.
    pub fn load(&self) -> Result<ArtifactBundle, ArtifactError> {
        let current = self.current_dir();
        if !current.exists() {
            if let Some(previous) = self.newest_previous() {
                warn!(path = %previous.display(), "no current artifact; loading the replaced bundle");
                return load_dir(&previous);
            }
        }
        load_dir(&current)
    }

    /// Leftover `.previous-*` directories, newest first.
    fn stranded_previous(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut found: Vec<(i64, PathBuf)> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                let stamp = name.strip_prefix(".previous-")?;
                // `<pid>-<nanos>`
                let nanos = stamp.rsplit('-').next()?.parse::<i64>().ok()?;
                Some((nanos, e.path()))
            })
            .collect();
        found.sort_by(|a, b| b.0.cmp(&a.0));
        found.into_iter().map(|(_, p)| p).collect()
    }

    fn newest_previous(&self) -> Option<PathBuf> {
        self.stranded_previous().into_iter().next()
    }
}

fn load_dir(dir: &Path) -> Result<ArtifactBundle, ArtifactError> {
    let files = [MODEL_FILE, SCALER_FILE, COLUMNS_FILE];
    let missing: Vec<&str> = files
        .iter()
        .copied()
        .filter(|f| !dir.join(f).is_file())
        .collect();
    if missing.len() == files.len() {
        return Err(ArtifactError::NotFound(dir.to_path_buf()));
    }
    if !missing.is_empty() {
        return Err(ArtifactError::Corrupt(format!(
            "incomplete artifact in {}: missing {}",
            dir.display(),
            missing.join(", ")
        )));
    }

    let blob: ModelBlob = read_json(&dir.join(MODEL_FILE))?;
    let scaler: StandardScaler = read_json(&dir.join(SCALER_FILE))?;
    let feature_columns: Vec<String> = read_json(&dir.join(COLUMNS_FILE))?;

    let bundle = ArtifactBundle {
        model: blob.model,
        scaler,
        feature_columns,
        metadata: blob.metadata,
    };
    bundle.validate()?;
    Ok(bundle)
}

fn io_err(path: &Path, e: std::io::Error) -> ArtifactError {
    ArtifactError::Io(format!("{}: {e}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let file = File::create(path).map_err(|e| io_err(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)
        .map_err(|e| ArtifactError::Io(format!("{}: {e}", path.display())))?;
    writer.flush().map_err(|e| io_err(path, e))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| io_err(path, e))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        ArtifactError::Corrupt(format!("{name} is not valid: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DEFAULT_REFERENCE_POINT, HyperParams, HyperparameterConfig};
    use crate::models::{Dataset, fit_model};

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hv-artifact-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn bundle(lambda: f64) -> ArtifactBundle {
        let columns = features::column_names(FeatureSetKind::Base);
        let x: Vec<Vec<f64>> = (0..30)
            .map(|i| (0..columns.len()).map(|j| ((i * (j + 3)) % 7) as f64 / 3.0).collect())
            .collect();
        let y: Vec<f64> = x.iter().map(|r| 200_000.0 + 10_000.0 * r[0] - 3_000.0 * r[6]).collect();
        let scaler = StandardScaler::fit(&x).unwrap();
        let xs = scaler.transform(&x).unwrap();
        let config = HyperparameterConfig {
            name: "ridge".to_string(),
            family: ModelFamily::Ridge,
            params: HyperParams {
                reg_lambda: lambda,
                ..HyperParams::default()
            },
        };
        let model = fit_model(&config, Dataset::new(&xs, &y), None, 42).unwrap();
        let candidate = TrainedCandidate {
            feature_set: FeatureSetKind::Base,
            hyperparam_name: config.name.clone(),
            model,
            scaler,
            feature_columns: columns,
            metrics: EvalMetrics {
                test_mae: 1.0,
                test_median_ae: 1.0,
                test_r2: 0.9,
                train_mae: 1.0,
                train_r2: 0.9,
                n_train: 24,
                n_test: 6,
            },
        };
        ArtifactBundle::from_candidate(&candidate, DEFAULT_REFERENCE_POINT)
    }

    #[test]
    fn round_trip_is_bit_identical() {
        let store = ArtifactStore::new(temp_root("roundtrip"));
        let saved = bundle(1.0);
        store.save(&saved).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.feature_columns, saved.feature_columns);
        for (a, b) in loaded.scaler.mean.iter().zip(&saved.scaler.mean) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        for (a, b) in loaded.scaler.scale.iter().zip(&saved.scaler.scale) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(loaded, saved);

        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn latest_save_wins() {
        let store = ArtifactStore::new(temp_root("latest"));
        store.save(&bundle(1.0)).unwrap();
        let second = bundle(50.0);
        store.save(&second).unwrap();
        assert_eq!(store.load().unwrap().model, second.model);

        let leftovers = fs::read_dir(store.root()).unwrap().count();
        assert_eq!(leftovers, 1);
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn interrupted_swap_serves_the_replaced_bundle() {
        let store = ArtifactStore::new(temp_root("interrupted"));
        let first = bundle(1.0);
        store.save(&first).unwrap();

        // A save that died after moving `current` aside.
        let stranded = store.root().join(".previous-1-100");
        fs::rename(store.current_dir(), &stranded).unwrap();
        fs::create_dir(store.root().join(".previous-1-50")).unwrap();
        assert_eq!(store.load().unwrap(), first);

        let second = bundle(50.0);
        store.save(&second).unwrap();
        assert_eq!(store.load().unwrap().model, second.model);
        assert!(!stranded.exists());
        assert_eq!(fs::read_dir(store.root()).unwrap().count(), 1);
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn missing_and_partial_artifacts() {
        let store = ArtifactStore::new(temp_root("partial"));
        assert!(matches!(store.load(), Err(ArtifactError::NotFound(_))));

        store.save(&bundle(1.0)).unwrap();
        fs::remove_file(store.current_dir().join(SCALER_FILE)).unwrap();
        match store.load() {
            Err(ArtifactError::Corrupt(msg)) => assert!(msg.contains(SCALER_FILE)),
            other => panic!("expected corrupt artifact, got {other:?}"),
        }
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn unparseable_and_inconsistent_blobs_are_corrupt() {
        let store = ArtifactStore::new(temp_root("garbage"));
        store.save(&bundle(1.0)).unwrap();

        fs::write(store.current_dir().join(COLUMNS_FILE), "[\"bedrooms\"]").unwrap();
        assert!(matches!(store.load(), Err(ArtifactError::Corrupt(_))));

        fs::write(store.current_dir().join(COLUMNS_FILE), "not json").unwrap();
        match store.load() {
            Err(ArtifactError::Corrupt(msg)) => assert!(msg.contains(COLUMNS_FILE)),
            other => panic!("expected corrupt artifact, got {other:?}"),
        }
        let _ = fs::remove_dir_all(store.root());
    }
}
