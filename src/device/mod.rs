pub mod catalog;
pub mod manager;
pub mod models;
pub mod sequencer;

pub use catalog::{CatalogEntry, ResponseRule, CATALOG};
pub use manager::BenchManager;
pub use models::*;
pub use sequencer::TestSequencer;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("invalid test identifier")]
    InvalidTestId(String),

    #[error("Device not connected")]
    NotConnected,

    #[error("Invalid device configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    #[error("Serial communication error: {0}")]
    SerialError(#[from] crate::serial::SerialError),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
