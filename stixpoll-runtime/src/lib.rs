//! stixpoll runtime
//!
//! Ties sources to the watermark scheduler:
//! - `SourceConfig` loaded from TOML
//! - The `PollSource` capability and its TAXII implementation
//! - Window planning and the `PollRun` scheduler
//! - `PollState` checkpoint files

pub mod checkpoint;
pub mod config;
pub mod scheduler;
pub mod source;
pub mod window;

pub use checkpoint::{CheckpointError, PollState};
pub use config::{ConfigError, Endpoint, SourceConfig};
pub use scheduler::{PollRun, RunSettings};
pub use source::{PollSource, TaxiiSource, WindowPoll};
pub use window::{plan_windows, run_begin};

use thiserror::Error;

/// Errors from setting up or finishing a run
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Taxii(#[from] stixpoll_net::TaxiiError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Current time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
