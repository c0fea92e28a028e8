//! Task configuration
//!
//! Values come from built-in defaults, an optional TOML file, then the
//! `QUORUM_*` environment variables, in that order of precedence (lowest
//! first). Every source goes through [`QuorumConfig::validate`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consensus::{ConsensusEngine, DEFAULT_MATCH_THRESHOLD, DEFAULT_STRONG_MATCH_THRESHOLD};
use crate::state::{MAX_SAMPLES, MIN_SAMPLES};

/// Default number of samples per task
pub const DEFAULT_SAMPLES: usize = 3;

/// Default per-call timeout in milliseconds
pub const DEFAULT_PER_CALL_TIMEOUT_MS: u64 = 30_000;

/// Lower bound of the derived soft deadline, in seconds
pub const MIN_SOFT_DEADLINE_SECONDS: u64 = 8;

/// Derived soft deadline per sample, in seconds
pub const SOFT_DEADLINE_SECONDS_PER_SAMPLE: u64 = 3;

/// Default live channel capacity
pub const DEFAULT_LIVE_CAPACITY: usize = 64;

/// Error type for configuration loading and validation
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("samples must be between 1 and 5, got {0}")]
    InvalidSamples(usize),

    #[error("{name} must be in (0, 1], got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("strong_match_threshold ({strong}) is below match_threshold ({base})")]
    ThresholdOrder { base: f64, strong: f64 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuorumConfig {
    /// Samples per task (k)
    pub samples: usize,
    pub per_call_timeout_ms: u64,
    /// Unset means `max(8, 3 * samples)`
    pub soft_deadline_seconds: Option<u64>,
    pub match_threshold: f64,
    pub strong_match_threshold: f64,
    /// Bounded capacity of the live update channel
    pub live_capacity: usize,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            per_call_timeout_ms: DEFAULT_PER_CALL_TIMEOUT_MS,
            soft_deadline_seconds: None,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            strong_match_threshold: DEFAULT_STRONG_MATCH_THRESHOLD,
            live_capacity: DEFAULT_LIVE_CAPACITY,
        }
    }
}

impl QuorumConfig {
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `QUORUM_*` environment overrides
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.with_overrides_from(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn with_overrides_from<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "QUORUM_SAMPLES")? {
            self.samples = v;
        }
        if let Some(v) = parse_var(&lookup, "QUORUM_PER_CALL_TIMEOUT_MS")? {
            self.per_call_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "QUORUM_SOFT_DEADLINE_SECONDS")? {
            self.soft_deadline_seconds = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "QUORUM_MATCH_THRESHOLD")? {
            self.match_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "QUORUM_STRONG_MATCH_THRESHOLD")? {
            self.strong_match_threshold = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(MIN_SAMPLES..=MAX_SAMPLES).contains(&self.samples) {
            return Err(ConfigError::InvalidSamples(self.samples));
        }
        if self.per_call_timeout_ms == 0 {
            return Err(ConfigError::Zero("per_call_timeout_ms"));
        }
        if self.soft_deadline_seconds == Some(0) {
            return Err(ConfigError::Zero("soft_deadline_seconds"));
        }
        if self.live_capacity == 0 {
            return Err(ConfigError::Zero("live_capacity"));
        }
        for (name, value) in [
            ("match_threshold", self.match_threshold),
            ("strong_match_threshold", self.strong_match_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }
        if self.strong_match_threshold < self.match_threshold {
            return Err(ConfigError::ThresholdOrder {
                base: self.match_threshold,
                strong: self.strong_match_threshold,
            });
        }
        Ok(())
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }

    /// Soft deadline for the configured sample count
    pub fn soft_deadline(&self) -> Duration {
        self.soft_deadline_for(self.samples)
    }

    /// Soft deadline for a task of `k` samples
    pub fn soft_deadline_for(&self, k: usize) -> Duration {
        let seconds = self.soft_deadline_seconds.unwrap_or_else(|| {
            (SOFT_DEADLINE_SECONDS_PER_SAMPLE * k as u64).max(MIN_SOFT_DEADLINE_SECONDS)
        });
        Duration::from_secs(seconds)
    }

    pub fn engine(&self) -> ConsensusEngine {
        ConsensusEngine::new(self.match_threshold, self.strong_match_threshold)
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> ConfigResult<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value: raw }),
    }
}
