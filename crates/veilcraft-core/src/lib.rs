//! VeilCraft Core — error taxonomy, privacy configuration, role enumerations.

pub mod config;
pub mod error;

pub use config::{AnonymizationLevel, ConfigUpdate, PrivacyConfig, UserRole};
pub use error::{Error, Result};
