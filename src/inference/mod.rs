//! Inference Service.
//!
//! [`ValuationService`] owns an optional artifact bundle. With a bundle it runs
//! features → scaler → model and post-processes the price into a band; without
//! one it returns a fixed fallback estimate flagged `model_loaded = false`.

pub mod request;
pub mod service;

pub use request::{ValuationRequest, ValuationResponse};
pub use service::{FeatureImportance, HealthStatus, ValuationService};
