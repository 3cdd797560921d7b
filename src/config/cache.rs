use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::Result;

/// Entries above which a pre-sized cache is probably a misconfiguration
const LARGE_CAPACITY_THRESHOLD: usize = 10_000_000;

/// Storage and broadcast settings for observable caches
///
/// ```toml
/// [cache]
/// initial_capacity = 1024
/// log_changesets = true
/// ```
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CacheConfig {
    /// Number of entries storage is pre-sized for.
    ///
    /// Default: 0 (grow on demand)
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,

    /// Emit a `trace` event summarizing every broadcast changeset
    ///
    /// Default: false
    #[serde(default)]
    pub log_changesets: bool,
}

fn default_initial_capacity() -> usize {
    0
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            initial_capacity: default_initial_capacity(),
            log_changesets: false,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_capacity > LARGE_CAPACITY_THRESHOLD {
            warn!(
                "cache.initial_capacity ({}) is very large; every cache will reserve this much up front",
                self.initial_capacity
            );
        }
        Ok(())
    }
}
