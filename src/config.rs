//! Engine configuration, loaded from TOML, following the same
//! `from_file`/`from_toml_str` pattern used for loading rule sets.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

fn default_capacity_cap() -> usize {
    100_000
}

/// Tunable limits for one [`crate::registry::Registry`] instance.
///
/// # Example `engine.toml`
///
/// ```toml
/// capacity_cap = 50000
/// default_timeout_ms = 50
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Maximum number of distinct compiled rule ids.
    #[serde(default = "default_capacity_cap")]
    pub capacity_cap: usize,

    /// Default per-evaluation wall-clock budget, applied when a caller
    /// doesn't supply its own. `None` means no default budget.
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            capacity_cap: default_capacity_cap(),
            default_timeout_ms: None,
        }
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse engine config TOML")
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}
