//! Online adaptation
//!
//! - `buffer` - bounded, thread-safe FIFO of recent samples
//! - `config` - online learning settings
//! - `controller` - update gating, learning-rate schedule, drift detection

mod buffer;
mod config;
mod controller;

pub use buffer::OnlineLearningBuffer;
pub use config::OnlineLearningConfig;
pub use controller::{
    scheduled_rate, ControllerState, OnlineAdaptationController, OnlineLearningStats,
    PerformanceRecord, UpdateReport,
};
