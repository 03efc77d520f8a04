//! Data structures and sampling utilities
//!
//! - `dataset` - samples and validated training datasets
//! - `sampling` - bootstrap and weighted resampling, robust statistics
//! - `synthetic` - seeded synthetic market stream

mod dataset;
pub mod sampling;
mod synthetic;

pub use dataset::{Sample, TrainingDataset};
pub use synthetic::SyntheticMarket;
