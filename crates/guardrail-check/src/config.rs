//! Engine configuration.
//!
//! Reads from JSON (`serde_json`) or from environment variables:
//! - `GUARDRAIL_HANDLER_PACKAGES`: comma-separated packages searched for
//!   `<Annotation>Handler` classes (default: none)
//! - `GUARDRAIL_MAX_VALUE_LEN`: longest rendered value in a violation
//!   message (default: 200)

use serde::{Deserialize, Serialize};

pub const ENV_HANDLER_PACKAGES: &str = "GUARDRAIL_HANDLER_PACKAGES";
pub const ENV_MAX_VALUE_LEN: &str = "GUARDRAIL_MAX_VALUE_LEN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Extra packages searched, in order, for `<Annotation>Handler` classes
    /// after the annotation's own package.
    pub handler_packages: Vec<String>,
    /// Convert panics raised while constructing handlers into configuration
    /// errors (the slot is disabled) instead of unwinding into the caller.
    pub contain_handler_panics: bool,
    /// Rendered values longer than this many characters are truncated.
    pub max_value_len: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        GuardConfig {
            handler_packages: Vec::new(),
            contain_handler_panics: true,
            max_value_len: 200,
        }
    }
}

impl GuardConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Defaults overridden by whichever environment variables are set.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = GuardConfig::default();
        if let Some(packages) = lookup(ENV_HANDLER_PACKAGES) {
            config.handler_packages = packages
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(len) = lookup(ENV_MAX_VALUE_LEN).and_then(|v| v.trim().parse().ok()) {
            config.max_value_len = len;
        }
        config
    }
}
