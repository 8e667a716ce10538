//! Runtime configuration.

use serde::{Deserialize, Serialize};

/// Default limit on nested evaluation depth.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Settings for a [`Runtime`](crate::reactive::Runtime).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```rust
/// use reflow_core::RuntimeConfig;
///
/// let config = RuntimeConfig::from_json(r#"{ "label": "sales-dashboard" }"#).unwrap();
/// assert_eq!(config.label, "sales-dashboard");
/// assert_eq!(config.max_depth, reflow_core::config::DEFAULT_MAX_DEPTH);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Name attached to log events from this runtime.
    pub label: String,

    /// How many evaluations may be nested inside one another.
    ///
    /// This bounds stack use, not graph depth: a top-level read that runs
    /// deeper evaluates the dirty cells below it deepest first and retries.
    /// `DepthExceeded` only reaches the caller when those cells cannot be
    /// found through recorded dependencies, such as untracked reads.
    pub max_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            label: "reflow".to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}
