//! Configuration validation.
//!
//! Checks that configured thresholds and window sizes are within usable ranges
//! before any resolver or detector is built from them.

use thiserror::Error;

use crate::config::{
    CacheConfig, Config, ObservabilityConfig, ProfileConfig, ResolutionConfig, TrendConfig,
};
use crate::logging::LogFormat;

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Longest current-plus-baseline span, roughly a century.
pub const MAX_ANALYSIS_DAYS: i64 = 36_500;

/// Longest cache entry lifetime: one year.
pub const MAX_CACHE_TTL_SECS: u64 = 31_536_000;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let sections: [&dyn Validate; 5] = [
            &self.resolution,
            &self.trends,
            &self.cache,
            &self.profiles,
            &self.observability,
        ];

        let mut errors: Vec<ValidationError> =
            sections.iter().filter_map(|s| s.validate().err()).collect();

        if self.storage.db_path.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "storage.db_path".into(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

fn unit_interval(field: &str, value: f64, inclusive_zero: bool) -> ValidationResult<()> {
    let lower_ok = if inclusive_zero { value >= 0.0 } else { value > 0.0 };
    if value.is_finite() && lower_ok && value <= 1.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: format!(
                "must be in {}0, 1], got {value}",
                if inclusive_zero { "[" } else { "(" }
            ),
        })
    }
}

impl Validate for ResolutionConfig {
    fn validate(&self) -> ValidationResult<()> {
        unit_interval(
            "resolution.similarity_threshold",
            self.similarity_threshold,
            false,
        )?;
        unit_interval(
            "resolution.min_extractor_confidence",
            self.min_extractor_confidence,
            true,
        )
    }
}

impl Validate for TrendConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.current_periods == 0 {
            return Err(ValidationError::InvalidValue {
                field: "trends.current_periods".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.baseline_periods == 0 {
            return Err(ValidationError::InvalidValue {
                field: "trends.baseline_periods".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.top_n == 0 {
            return Err(ValidationError::InvalidValue {
                field: "trends.top_n".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if !self.significance_z.is_finite() || self.significance_z <= 0.0 {
            return Err(ValidationError::InvalidValue {
                field: "trends.significance_z".into(),
                reason: "must be a positive number".into(),
            });
        }

        if self.consistent_cov_threshold >= self.spiky_cov_threshold {
            return Err(ValidationError::Conflict {
                reason: format!(
                    "trends.consistent_cov_threshold ({}) must be below \
                     trends.spiky_cov_threshold ({})",
                    self.consistent_cov_threshold, self.spiky_cov_threshold
                ),
            });
        }

        // Current window plus baseline windows, in days
        let span_days = self
            .unit
            .days_per_period()
            .saturating_mul(i64::from(self.current_periods))
            .saturating_mul(i64::from(self.baseline_periods) + 1);
        if span_days > MAX_ANALYSIS_DAYS {
            return Err(ValidationError::InvalidValue {
                field: "trends.baseline_periods".into(),
                reason: format!(
                    "current and baseline windows span {span_days} days, \
                     at most {MAX_ANALYSIS_DAYS} are supported"
                ),
            });
        }

        unit_interval("trends.confirmed_confidence", self.confirmed_confidence, false)
    }
}

impl Validate for CacheConfig {
    fn validate(&self) -> ValidationResult<()> {
        match self.ttl_secs {
            Some(0) => {
                return Err(ValidationError::InvalidValue {
                    field: "cache.ttl_secs".into(),
                    reason: "must be greater than 0 when set; omit it to disable expiry".into(),
                });
            }
            Some(ttl) if ttl > MAX_CACHE_TTL_SECS => {
                return Err(ValidationError::InvalidValue {
                    field: "cache.ttl_secs".into(),
                    reason: format!("must be at most {MAX_CACHE_TTL_SECS}"),
                });
            }
            _ => {}
        }

        if self.max_entries == 0 {
            return Err(ValidationError::InvalidValue {
                field: "cache.max_entries".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ProfileConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.max_context_samples == 0 {
            return Err(ValidationError::InvalidValue {
                field: "profiles.max_context_samples".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        if LogFormat::parse(&self.log_format).is_none() {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: "must be one of: json, pretty".into(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeUnit;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_similarity_threshold() {
        let mut config = Config::default();
        config.resolution.similarity_threshold = 1.5;
        let result = config.validate();
        assert!(result.is_err());
        if let Err(ValidationError::InvalidValue { field, .. }) = result {
            assert_eq!(field, "resolution.similarity_threshold");
        }
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = Config::default();
        config.resolution.similarity_threshold = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_cov_thresholds() {
        let mut config = Config::default();
        config.trends.consistent_cov_threshold = 2.0;
        let result = config.validate();
        assert!(matches!(result, Err(ValidationError::Conflict { .. })));
    }

    #[test]
    fn test_multiple_errors_collected() {
        let mut config = Config::default();
        config.trends.current_periods = 0;
        config.observability.log_format = "xml".into();
        config.cache.ttl_secs = Some(0);
        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_analysis_span_bounded() {
        let mut config = Config::default();
        config.trends.unit = TimeUnit::Year;
        config.trends.current_periods = u32::MAX;
        config.trends.baseline_periods = u32::MAX;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidValue { field, .. }) if field == "trends.baseline_periods"
        ));

        config.trends.current_periods = 1;
        config.trends.baseline_periods = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_bounds() {
        let mut config = Config::default();
        config.cache.ttl_secs = Some(u64::MAX);
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidValue { field, .. }) if field == "cache.ttl_secs"
        ));

        config.cache.ttl_secs = Some(MAX_CACHE_TTL_SECS);
        config.cache.max_entries = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidValue { field, .. }) if field == "cache.max_entries"
        ));
    }

    #[test]
    fn test_empty_db_path() {
        let mut config = Config::default();
        config.storage.db_path = "  ".into();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingField { .. })
        ));
    }
}
