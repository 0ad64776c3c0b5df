//! Configuration management for Newsdesk services.
//!
//! Services share a configuration file at `~/.newsdesk/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (NEWSDESK_* prefix), when applied via `load_with_env`
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `NEWSDESK_SIMILARITY_THRESHOLD` → resolution.similarity_threshold
//! - `NEWSDESK_MIN_MENTIONS` → trends.min_mentions_for_trend
//! - `NEWSDESK_BUCKET` → trends.time_bucket_granularity
//! - `NEWSDESK_CACHE_TTL_SECS` → cache.ttl_secs
//! - `NEWSDESK_CACHE_MAX_ENTRIES` → cache.max_entries
//! - `NEWSDESK_DB_PATH` → storage.db_path
//! - `NEWSDESK_LOG_LEVEL` → observability.log_level
//! - `NEWSDESK_LOG_FORMAT` → observability.log_format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".newsdesk"),
        |dirs| dirs.home_dir().join(".newsdesk"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Time units
// ============================================================================

/// Calendar unit used to size analysis windows.
///
/// Months, quarters and years are fixed-length approximations
/// (30, 90 and 365 days).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeUnit {
    /// Parse from string (e.g., "day", "WEEK", "d", "q").
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "day" | "days" | "d" => Some(Self::Day),
            "week" | "weeks" | "w" => Some(Self::Week),
            "month" | "months" | "m" => Some(Self::Month),
            "quarter" | "quarters" | "q" => Some(Self::Quarter),
            "year" | "years" | "y" => Some(Self::Year),
            _ => None,
        }
    }

    /// Number of days covered by one period of this unit.
    pub const fn days_per_period(&self) -> i64 {
        match self {
            Self::Day => 1,
            Self::Week => 7,
            Self::Month => 30,
            Self::Quarter => 90,
            Self::Year => 365,
        }
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Day => write!(f, "day"),
            Self::Week => write!(f, "week"),
            Self::Month => write!(f, "month"),
            Self::Quarter => write!(f, "quarter"),
            Self::Year => write!(f, "year"),
        }
    }
}

/// Bucket size for per-period mention counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BucketGranularity {
    #[default]
    Day,
    Week,
    Month,
}

impl BucketGranularity {
    /// Parse from string ("day", "week", "month").
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "day" | "daily" => Some(Self::Day),
            "week" | "weekly" => Some(Self::Week),
            "month" | "monthly" => Some(Self::Month),
            _ => None,
        }
    }
}

impl std::fmt::Display for BucketGranularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Day => write!(f, "day"),
            Self::Week => write!(f, "week"),
            Self::Month => write!(f, "month"),
        }
    }
}

// ============================================================================
// Resolution Configuration
// ============================================================================

/// Entity resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Minimum similarity (exclusive) for a fuzzy match against an existing identity.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Mentions whose extractor confidence is below this are skipped.
    #[serde(default)]
    pub min_extractor_confidence: f64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            min_extractor_confidence: 0.0,
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.85
}

// ============================================================================
// Trend Configuration
// ============================================================================

/// Trend detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Minimum mentions in the current window before an entity is considered.
    #[serde(default = "default_min_mentions")]
    pub min_mentions_for_trend: u64,

    /// Bucket size for frequency tables.
    #[serde(default)]
    pub time_bucket_granularity: BucketGranularity,

    /// Unit of the current/baseline windows.
    #[serde(default = "default_trend_unit")]
    pub unit: TimeUnit,

    /// Length of the current window, in `unit`s.
    #[serde(default = "default_current_periods")]
    pub current_periods: u32,

    /// Baseline length as a multiple of the current window.
    #[serde(default = "default_baseline_periods")]
    pub baseline_periods: u32,

    /// Maximum number of entities per frequency table.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// z-score above which a change counts as significant.
    #[serde(default = "default_significance_z")]
    pub significance_z: f64,

    /// Coefficient of variation above which a series is spiky.
    #[serde(default = "default_spiky_cov")]
    pub spiky_cov_threshold: f64,

    /// Coefficient of variation below which a series is consistent.
    #[serde(default = "default_consistent_cov")]
    pub consistent_cov_threshold: f64,

    /// Confidence at or above which a trend is CONFIRMED rather than POTENTIAL.
    #[serde(default = "default_confirmed_confidence")]
    pub confirmed_confidence: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            min_mentions_for_trend: default_min_mentions(),
            time_bucket_granularity: BucketGranularity::default(),
            unit: default_trend_unit(),
            current_periods: default_current_periods(),
            baseline_periods: default_baseline_periods(),
            top_n: default_top_n(),
            significance_z: default_significance_z(),
            spiky_cov_threshold: default_spiky_cov(),
            consistent_cov_threshold: default_consistent_cov(),
            confirmed_confidence: default_confirmed_confidence(),
        }
    }
}

fn default_min_mentions() -> u64 {
    3
}

fn default_trend_unit() -> TimeUnit {
    TimeUnit::Day
}

fn default_current_periods() -> u32 {
    7
}

fn default_baseline_periods() -> u32 {
    4
}

fn default_top_n() -> usize {
    100
}

fn default_significance_z() -> f64 {
    1.65
}

fn default_spiky_cov() -> f64 {
    1.0
}

fn default_consistent_cov() -> f64 {
    0.3
}

fn default_confirmed_confidence() -> f64 {
    0.99
}

// ============================================================================
// Cache / Profile / Storage / Observability
// ============================================================================

/// Frequency cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry lifetime in seconds. `None` keeps entries until evicted or cleared.
    #[serde(default)]
    pub ttl_secs: Option<u64>,

    /// Tables kept before the least recently used one is evicted.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: None,
            max_entries: default_cache_max_entries(),
        }
    }
}

fn default_cache_max_entries() -> usize {
    64
}

/// Entity profile settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Most recent context sentences kept per profile.
    #[serde(default = "default_max_context_samples")]
    pub max_context_samples: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            max_context_samples: default_max_context_samples(),
        }
    }
}

fn default_max_context_samples() -> usize {
    50
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path (`~` is expanded).
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Database path with `~` expanded.
    pub fn resolved_db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.db_path).into_owned())
    }
}

fn default_db_path() -> String {
    "~/.newsdesk/newsdesk.db".to_string()
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// JSON Schema reference
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default)]
    pub resolution: ResolutionConfig,

    #[serde(default)]
    pub trends: TrendConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub profiles: ProfileConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("NEWSDESK_SIMILARITY_THRESHOLD") {
            match v.parse() {
                Ok(t) => self.resolution.similarity_threshold = t,
                Err(_) => {
                    tracing::warn!(value = %v, "Ignoring invalid NEWSDESK_SIMILARITY_THRESHOLD")
                }
            }
        }
        if let Some(v) = lookup("NEWSDESK_MIN_MENTIONS") {
            match v.parse() {
                Ok(n) => self.trends.min_mentions_for_trend = n,
                Err(_) => {
                    tracing::warn!(value = %v, "Ignoring invalid NEWSDESK_MIN_MENTIONS")
                }
            }
        }
        if let Some(v) = lookup("NEWSDESK_BUCKET") {
            match BucketGranularity::parse(&v) {
                Some(g) => self.trends.time_bucket_granularity = g,
                None => tracing::warn!(value = %v, "Ignoring invalid NEWSDESK_BUCKET"),
            }
        }
        if let Some(v) = lookup("NEWSDESK_CACHE_TTL_SECS") {
            match v.parse() {
                Ok(ttl) => self.cache.ttl_secs = Some(ttl),
                Err(_) => {
                    tracing::warn!(value = %v, "Ignoring invalid NEWSDESK_CACHE_TTL_SECS")
                }
            }
        }
        if let Some(v) = lookup("NEWSDESK_CACHE_MAX_ENTRIES") {
            match v.parse() {
                Ok(max) => self.cache.max_entries = max,
                Err(_) => {
                    tracing::warn!(value = %v, "Ignoring invalid NEWSDESK_CACHE_MAX_ENTRIES")
                }
            }
        }
        if let Some(v) = lookup("NEWSDESK_DB_PATH") {
            self.storage.db_path = v;
        }
        if let Some(v) = lookup("NEWSDESK_LOG_LEVEL") {
            self.observability.log_level = v;
        }
        if let Some(v) = lookup("NEWSDESK_LOG_FORMAT") {
            self.observability.log_format = v;
        }
    }

    /// Save configuration to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}
