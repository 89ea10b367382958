//! Store configuration
//!
//! Sizing of the read cache and of the blocks used for raw medium I/O.
//! Every size is fixed for the lifetime of a store session.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest accepted maximum cache size in bytes
pub const MINIMUM_CACHE_SIZE: usize = 32;

/// Smallest accepted read-write block size in bytes
pub const MINIMUM_READ_WRITE_BLOCK_SIZE: usize = 1;

/// Default maximum cache size (1 MiB)
pub const DEFAULT_MAX_CACHE_SIZE: usize = 1024 * 1024;

/// Default maximum read-write block size
pub const DEFAULT_MAX_READ_WRITE_BLOCK_SIZE: usize = 8192;

/// Default maximum size of a single cached region
pub const DEFAULT_MAX_CACHE_REGION_SIZE: usize = DEFAULT_MAX_READ_WRITE_BLOCK_SIZE;

/// Configuration of a [`MediumStore`](crate::MediumStore)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of cached bytes
    pub max_cache_size: usize,
    /// Maximum size of a single cached region
    pub max_cache_region_size: usize,
    /// Maximum number of bytes per raw read or write on the medium
    pub max_read_write_block_size: usize,
    /// Whether reads populate the cache at all
    pub caching_enabled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            max_cache_region_size: DEFAULT_MAX_CACHE_REGION_SIZE,
            max_read_write_block_size: DEFAULT_MAX_READ_WRITE_BLOCK_SIZE,
            caching_enabled: true,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with caching switched off
    pub fn uncached() -> Self {
        Self {
            caching_enabled: false,
            ..Self::default()
        }
    }

    /// Set the maximum cache size
    #[must_use]
    pub const fn with_max_cache_size(mut self, size: usize) -> Self {
        self.max_cache_size = size;
        self
    }

    /// Set the maximum size of a single cached region
    #[must_use]
    pub const fn with_max_cache_region_size(mut self, size: usize) -> Self {
        self.max_cache_region_size = size;
        self
    }

    /// Set the maximum read-write block size
    #[must_use]
    pub const fn with_max_read_write_block_size(mut self, size: usize) -> Self {
        self.max_read_write_block_size = size;
        self
    }

    /// Enable or disable caching
    #[must_use]
    pub const fn with_caching(mut self, enabled: bool) -> Self {
        self.caching_enabled = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_cache_region_size == 0 {
            return Err("max_cache_region_size must be greater than 0".to_string());
        }

        if self.max_read_write_block_size < MINIMUM_READ_WRITE_BLOCK_SIZE {
            return Err(format!(
                "max_read_write_block_size must be at least {MINIMUM_READ_WRITE_BLOCK_SIZE}"
            ));
        }

        if self.max_cache_size < MINIMUM_CACHE_SIZE {
            return Err(format!(
                "max_cache_size must be at least {MINIMUM_CACHE_SIZE}"
            ));
        }

        if self.max_cache_region_size > self.max_cache_size {
            return Err("max_cache_region_size must not exceed max_cache_size".to_string());
        }

        if self.max_cache_size < 2 * self.max_read_write_block_size {
            return Err(
                "max_cache_size must be at least twice max_read_write_block_size".to_string(),
            );
        }

        Ok(())
    }

    /// Parse a configuration from JSON, missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StoreError::InvalidConfiguration(e.to_string()))?;
        config.validate().map_err(StoreError::InvalidConfiguration)?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
