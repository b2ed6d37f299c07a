//! Input/output helpers.
//!
//! - CSV ingest (`ingest`)
//! - model artifact persistence (`artifact`)
//! - CSV exports (`export`)

pub mod artifact;
pub mod export;
pub mod ingest;

pub use artifact::{ArtifactBundle, ArtifactError, ArtifactMetadata, ArtifactStore};
pub use export::*;
pub use ingest::*;
