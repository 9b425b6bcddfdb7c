//! Correlator configuration.
//!
//! A single option controls how long a request may stay unanswered. It can
//! be set through the builder or deserialized from JSON, where `timeout_ms`,
//! `timeout` and `requestTimeout` are accepted as names.
//!
//! ```
//! use replywire::CorrelatorConfig;
//!
//! let config = CorrelatorConfig::from_json(r#"{ "requestTimeout": 250 }"#).unwrap();
//! assert_eq!(config.timeout_ms, 250);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Per-connection correlator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Request timeout in milliseconds. `0` selects the default.
    #[serde(alias = "timeout", alias = "requestTimeout")]
    pub timeout_ms: u64,
}

impl CorrelatorConfig {
    /// Config with the given timeout in milliseconds.
    pub fn with_timeout_ms(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }

    /// Parse a JSON options object.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Effective timeout in milliseconds.
    pub fn effective_timeout_ms(&self) -> u64 {
        if self.timeout_ms == 0 {
            DEFAULT_TIMEOUT_MS
        } else {
            self.timeout_ms
        }
    }

    /// Effective timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.effective_timeout_ms())
    }
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}
