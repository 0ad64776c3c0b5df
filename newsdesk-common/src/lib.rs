//! Newsdesk Common - Shared configuration, validation, and logging.
//!
//! This crate provides:
//! - Configuration types and loading (`~/.newsdesk/config.json` + `NEWSDESK_*` env)
//! - Configuration validation
//! - Logging setup for services embedding the entity/trend core

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod logging;
pub mod validation;

pub use config::{
    BucketGranularity, CacheConfig, Config, ObservabilityConfig, ProfileConfig,
    ResolutionConfig, StorageConfig, TimeUnit, TrendConfig,
};
pub use logging::LogFormat;
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, ResolutionConfig, TrendConfig};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
