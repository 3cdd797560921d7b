//! Configuration for caches and buffering operators.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
mod buffer;
mod cache;
pub use buffer::*;
pub use cache::*;
#[cfg(test)]
mod config_test;

use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

const ENV_PREFIX: &str = "CHANGEFLOW";

/// Top-level configuration container.
///
/// Sources are merged in this order (later sources override earlier):
/// 1. Type defaults
/// 2. Configuration file named by `CONFIG_PATH`
/// 3. Environment variables with the `CHANGEFLOW__` prefix
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ChangeflowConfig {
    /// Storage and broadcast settings for observable caches
    #[serde(default)]
    pub cache: CacheConfig,
    /// Defaults for the buffer-if operator
    #[serde(default)]
    pub buffer: BufferConfig,
}

impl ChangeflowConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// # Note
    /// Validation is deferred so further overrides can be applied with
    /// `with_override_config()`. Call `validate()` once all overrides are in.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CHANGEFLOW__BUFFER__TIMEOUT_MS", "250");
    /// let cfg = ChangeflowConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies overrides from the file at `path` on top of this
    /// configuration, then re-applies environment variables.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated configuration
    pub fn validate(self) -> Result<Self> {
        self.cache.validate()?;
        self.buffer.validate()?;
        Ok(self)
    }
}
