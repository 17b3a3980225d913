//! Engine configuration.
//!
//! Loaded from a JSON document. Every field has a default, so `{}` is a
//! valid configuration with no inhibition rules and no persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SuppressError};
use crate::rules::{InhibitionRule, RuleSet};
use crate::silencer::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Configuration for [`SuppressionEngine`](crate::SuppressionEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deadline for suppression queries, in milliseconds.
    pub query_timeout_ms: u64,
    /// Deadline for administrative operations, in milliseconds.
    pub admin_timeout_ms: u64,
    /// Page size for silence listings when the caller gives none.
    pub default_page_size: usize,
    /// Largest page size a caller may request.
    pub max_page_size: usize,
    /// Directory for JSON state snapshots. State is kept in memory only when
    /// unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    /// Inhibition rules, in evaluation order.
    pub inhibit_rules: Vec<InhibitionRule>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 250,
            admin_timeout_ms: 2000,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            state_dir: None,
            inhibit_rules: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SuppressError::InvalidConfig {
            reason: format!("failed to read config file '{}': {e}", path.display()),
        })?;
        Self::from_json(&content)
    }

    /// Parses configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the values are invalid.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content).map_err(|e| SuppressError::InvalidConfig {
            reason: format!("invalid JSON: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration, including every inhibition rule.
    ///
    /// # Errors
    ///
    /// Returns `SuppressError::InvalidConfig` describing the first problem.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(SuppressError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if self.query_timeout_ms == 0 {
            return invalid("query_timeout_ms must be greater than 0");
        }
        if self.admin_timeout_ms == 0 {
            return invalid("admin_timeout_ms must be greater than 0");
        }
        if self.default_page_size == 0 {
            return invalid("default_page_size must be greater than 0");
        }
        if self.max_page_size < self.default_page_size {
            return invalid("max_page_size must be at least default_page_size");
        }

        self.rule_set().map(|_| ())
    }

    /// Builds the validated rule set.
    ///
    /// # Errors
    ///
    /// Returns `SuppressError::InvalidConfig` if a rule is invalid or names
    /// collide.
    pub fn rule_set(&self) -> Result<RuleSet> {
        RuleSet::new(self.inhibit_rules.clone())
    }

    /// The suppression query deadline.
    #[must_use]
    pub const fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// The administrative operation deadline.
    #[must_use]
    pub const fn admin_timeout(&self) -> Duration {
        Duration::from_millis(self.admin_timeout_ms)
    }
}
