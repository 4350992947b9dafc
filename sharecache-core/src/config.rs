//! Cache Configuration
//!
//! Configuration is loaded from defaults, environment variables, or a TOML
//! document. Environment values that fail to parse fall back to the default
//! for that field; call [`CacheConfig::validate`] before use.

use crate::error::ConfigError;
use crate::PartitionToken;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound on live registrations per process.
pub const MAX_REGISTRATIONS_LIMIT: usize = 0xFFFF;

/// Engine and store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    // ========================================================================
    // Store
    // ========================================================================
    /// Directory holding the LMDB environment.
    pub cache_dir: PathBuf,

    /// LMDB map size in megabytes.
    pub map_size_mb: usize,

    // ========================================================================
    // Access control
    // ========================================================================
    /// Refuse stores; finds still work.
    pub read_only: bool,

    /// Refuse both stores and finds.
    pub deny_access: bool,

    // ========================================================================
    // Registry
    // ========================================================================
    /// Maximum number of live registrations.
    pub max_registrations: usize,

    /// Partition used when a registration does not name one.
    pub default_partition: PartitionToken,

    /// Log each store/find at info level instead of debug.
    pub verbose: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("sharecache"),
            map_size_mb: 64,
            read_only: false,
            deny_access: false,
            max_registrations: MAX_REGISTRATIONS_LIMIT,
            default_partition: PartitionToken::default_partition(),
            verbose: false,
        }
    }
}

impl CacheConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from `SHARECACHE_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cache_dir = std::env::var("SHARECACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let map_size_mb = std::env::var("SHARECACHE_MAP_SIZE_MB")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.map_size_mb);

        let read_only = env_flag("SHARECACHE_READ_ONLY").unwrap_or(defaults.read_only);
        let deny_access = env_flag("SHARECACHE_DENY_ACCESS").unwrap_or(defaults.deny_access);
        let verbose = env_flag("SHARECACHE_VERBOSE").unwrap_or(defaults.verbose);

        let max_registrations = std::env::var("SHARECACHE_MAX_REGISTRATIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_registrations);

        let default_partition = std::env::var("SHARECACHE_DEFAULT_PARTITION")
            .map(PartitionToken::from)
            .unwrap_or(defaults.default_partition);

        Self {
            cache_dir,
            map_size_mb,
            read_only,
            deny_access,
            max_registrations,
            default_partition,
            verbose,
        }
    }

    /// Parse configuration from a TOML document. Missing keys take defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check field ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.map_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "map_size_mb".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.map_size_bytes().is_none() {
            return Err(ConfigError::InvalidValue {
                field: "map_size_mb".to_string(),
                value: self.map_size_mb.to_string(),
                reason: "exceeds the addressable size".to_string(),
            });
        }
        if self.max_registrations == 0 || self.max_registrations > MAX_REGISTRATIONS_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "max_registrations".to_string(),
                value: self.max_registrations.to_string(),
                reason: format!("must be between 1 and {}", MAX_REGISTRATIONS_LIMIT),
            });
        }
        Ok(())
    }

    /// Map size in bytes, or `None` if it does not fit in a `usize`.
    pub fn map_size_bytes(&self) -> Option<usize> {
        mb_to_bytes(self.map_size_mb)
    }

    /// Set the cache directory.
    pub fn with_cache_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cache_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the LMDB map size.
    pub fn with_map_size_mb(mut self, mb: usize) -> Self {
        self.map_size_mb = mb;
        self
    }

    /// Enable or disable read-only mode.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Enable or disable access denial.
    pub fn with_deny_access(mut self, deny: bool) -> Self {
        self.deny_access = deny;
        self
    }

    /// Set the registration limit.
    pub fn with_max_registrations(mut self, max: usize) -> Self {
        self.max_registrations = max;
        self
    }

    /// Set the default partition.
    pub fn with_default_partition(mut self, partition: impl Into<PartitionToken>) -> Self {
        self.default_partition = partition.into();
        self
    }

    /// Enable or disable verbose operation logging.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|s| s == "true" || s == "1")
}

/// Megabytes to bytes, `None` on overflow.
pub fn mb_to_bytes(mb: usize) -> Option<usize> {
    mb.checked_mul(1024 * 1024)
}
