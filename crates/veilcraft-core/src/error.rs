//! Error types for VeilCraft.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Computation error: {0}")]
    Computation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable error kind tag for the calling layer's response envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Computation(_) => "COMPUTATION_ERROR",
            Error::Json(_) => "VALIDATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
