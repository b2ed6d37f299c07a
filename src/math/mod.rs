//! Numeric utilities: least squares solves and regression error metrics.

pub mod metrics;
pub mod ols;

pub use metrics::*;
pub use ols::*;
