//! Model Trainer/Selector.
//!
//! Responsibilities:
//!
//! - build the `(feature set, configuration)` grid
//! - split records into seeded train/test partitions
//! - fit and score every cell (parallel)
//! - rank candidates and refit the winner

pub mod grid;
pub mod selection;
pub mod split;

pub use grid::*;
pub use selection::*;
pub use split::*;
