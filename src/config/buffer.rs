use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Longest pause a buffer may be configured to hold before a forced flush
const MAX_TIMEOUT_MS: u64 = 3_600_000;

/// Defaults for the buffer-if operator
///
/// ```toml
/// [buffer]
/// timeout_ms = 500     # force a flush after half a second of pause
/// initial_paused = false
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct BufferConfig {
    /// Forced flush after this many milliseconds of pause.
    ///
    /// Range: 0-3600000 (0 disables the timeout)
    /// Default: 0
    #[serde(default)]
    pub timeout_ms: u64,

    /// Whether a new subscription starts out paused
    ///
    /// Default: false
    #[serde(default)]
    pub initial_paused: bool,
}

impl BufferConfig {
    /// The configured timeout, `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms > MAX_TIMEOUT_MS {
            return Err(Error::Config(ConfigError::Message(format!(
                "buffer.timeout_ms must be at most {}, got {}",
                MAX_TIMEOUT_MS, self.timeout_ms
            ))));
        }
        Ok(())
    }
}
