//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - configuration enums and defaults (`FeatureSetKind`, `ModelFamily`, `InputLayout`)
//! - raw and cleaned transaction records (`RawTransaction`, `TransactionRecord`)
//! - query/result types for the inference boundary (`ValuationQuery`, `ValuationResult`)

pub mod types;

pub use types::*;
