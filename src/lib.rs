//! `house-valuer` library crate.
//!
//! The binary (`hv`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the inference service can be embedded behind any transport
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod features;
pub mod fit;
pub mod inference;
pub mod io;
pub mod math;
pub mod models;
pub mod normalize;
pub mod report;
