//! Scan configuration types.

use std::time::Duration;

use derive_builder::Builder;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Default maximum traversal depth.
pub const DEFAULT_MAX_DEPTH: u32 = 8;
/// Default number of filesystem operations allowed in flight.
pub const DEFAULT_CONCURRENCY: usize = 64;
/// Default depth at which the child cap starts to apply.
pub const DEFAULT_CAP_DEPTH: u32 = 2;
/// Default maximum explicit children per capped directory.
pub const DEFAULT_MAX_CHILDREN: usize = 30;
/// Default interval between snapshot ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);
/// Default ceiling for a single size estimation.
pub const DEFAULT_ESTIMATE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Configuration for scanning operations.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Depth at which directories stop being expanded and get estimated instead.
    #[builder(default = "DEFAULT_MAX_DEPTH")]
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Concurrency slots for readdir/stat/estimation calls.
    #[builder(default = "DEFAULT_CONCURRENCY")]
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Minimum depth at which the child cap is enforced.
    #[builder(default = "DEFAULT_CAP_DEPTH")]
    #[serde(default = "default_cap_depth")]
    pub cap_depth: u32,

    /// Maximum explicit children per capped directory.
    #[builder(default = "DEFAULT_MAX_CHILDREN")]
    #[serde(default = "default_max_children")]
    pub max_children: usize,

    /// Interval between snapshot ticks.
    #[builder(default = "DEFAULT_TICK_INTERVAL")]
    #[serde(default = "default_tick_interval", with = "millis")]
    pub tick_interval: Duration,

    /// Timeout for one fast size estimation.
    #[builder(default = "DEFAULT_ESTIMATE_TIMEOUT")]
    #[serde(default = "default_estimate_timeout", with = "millis")]
    pub estimate_timeout: Duration,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Entry names to skip (glob syntax).
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

fn default_max_depth() -> u32 {
    DEFAULT_MAX_DEPTH
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_cap_depth() -> u32 {
    DEFAULT_CAP_DEPTH
}

fn default_max_children() -> usize {
    DEFAULT_MAX_CHILDREN
}

fn default_tick_interval() -> Duration {
    DEFAULT_TICK_INTERVAL
}

fn default_estimate_timeout() -> Duration {
    DEFAULT_ESTIMATE_TIMEOUT
}

fn default_true() -> bool {
    true
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }
        if self.max_children == Some(0) {
            return Err("Max children must be at least 1".to_string());
        }
        if self.tick_interval.is_some_and(|d| d.is_zero()) {
            return Err("Tick interval cannot be zero".to_string());
        }
        if let Some(ref patterns) = self.ignore_patterns {
            for pattern in patterns {
                Glob::new(pattern).map_err(|e| format!("Bad ignore pattern {pattern:?}: {e}"))?;
            }
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a config with all defaults.
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            concurrency: DEFAULT_CONCURRENCY,
            cap_depth: DEFAULT_CAP_DEPTH,
            max_children: DEFAULT_MAX_CHILDREN,
            tick_interval: DEFAULT_TICK_INTERVAL,
            estimate_timeout: DEFAULT_ESTIMATE_TIMEOUT,
            include_hidden: true,
            ignore_patterns: Vec::new(),
        }
    }

    /// Same config with a different depth limit.
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Check values that serde can't, for configs not built through the builder.
    pub fn validate(&self) -> Result<(), ScanError> {
        let invalid = |message: &str| ScanError::InvalidConfig {
            message: message.to_string(),
        };
        if self.concurrency == 0 {
            return Err(invalid("Concurrency must be at least 1"));
        }
        if self.max_children == 0 {
            return Err(invalid("Max children must be at least 1"));
        }
        if self.tick_interval.is_zero() {
            return Err(invalid("Tick interval cannot be zero"));
        }
        EntryFilter::new(self).map(|_| ())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Name-based entry filter compiled from a [`ScanConfig`].
#[derive(Debug, Clone)]
pub struct EntryFilter {
    include_hidden: bool,
    ignore: GlobSet,
}

impl EntryFilter {
    /// Compile the hidden-file and ignore-pattern settings of `config`.
    pub fn new(config: &ScanConfig) -> Result<Self, ScanError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.ignore_patterns {
            let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidConfig {
                message: format!("Bad ignore pattern {pattern:?}: {e}"),
            })?;
            builder.add(glob);
        }
        let ignore = builder.build().map_err(|e| ScanError::InvalidConfig {
            message: e.to_string(),
        })?;
        Ok(Self {
            include_hidden: config.include_hidden,
            ignore,
        })
    }

    /// Check if an entry with this base name should be skipped.
    pub fn is_excluded(&self, name: &str) -> bool {
        (!self.include_hidden && name.starts_with('.')) || self.ignore.is_match(name)
    }
}
