//! Core alert types consumed by the suppression engine.
//!
//! Alerts are produced by the ingestion pipeline; the engine only reads them.
//! - [`AlertStatus`]: Whether an alert is firing or resolved
//! - [`Alert`]: A labelled alert instance with a stable fingerprint

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A label set.
pub type Labels = HashMap<String, String>;

/// Whether an alert is currently firing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// The alert is actively firing.
    #[default]
    Firing,
    /// The alert was firing but has been resolved.
    Resolved,
}

impl AlertStatus {
    /// Returns the status as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Firing => "firing",
            Self::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An alert as delivered by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Labels identifying the alert.
    pub labels: Labels,
    /// Stable identity derived from the label set.
    ///
    /// Filled in from `labels` when absent from the input.
    #[serde(default)]
    pub fingerprint: String,
    /// Firing or resolved.
    #[serde(default)]
    pub status: AlertStatus,
    /// When the alert started firing.
    #[serde(default = "Utc::now")]
    pub starts_at: DateTime<Utc>,
}

impl Alert {
    /// Creates a firing alert from a label set, starting now.
    #[must_use]
    pub fn new(labels: Labels) -> Self {
        let fingerprint = fingerprint(&labels);
        Self {
            labels,
            fingerprint,
            status: AlertStatus::Firing,
            starts_at: Utc::now(),
        }
    }

    /// Creates a firing alert from `(name, value)` pairs.
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Sets the status.
    #[must_use]
    pub const fn with_status(mut self, status: AlertStatus) -> Self {
        self.status = status;
        self
    }

    /// Marks the alert resolved.
    #[must_use]
    pub const fn resolved(self) -> Self {
        self.with_status(AlertStatus::Resolved)
    }

    /// Returns true if the alert is firing.
    #[must_use]
    pub fn is_firing(&self) -> bool {
        self.status == AlertStatus::Firing
    }

    /// Returns the value of a label, if present.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    /// Fills in the fingerprint when the producer left it blank.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.fingerprint.is_empty() {
            self.fingerprint = fingerprint(&self.labels);
        }
        self
    }
}

/// Computes the fingerprint of a label set.
///
/// Label pairs are hashed in sorted order so the result does not depend on
/// map iteration order, and is stable across processes and releases.
#[must_use]
pub fn fingerprint(labels: &Labels) -> String {
    let mut sorted: Vec<_> = labels.iter().collect();
    sorted.sort();

    let mut hasher = blake3::Hasher::new();
    for (name, value) in sorted {
        hasher.update(name.as_bytes());
        hasher.update(&[0xff]);
        hasher.update(value.as_bytes());
        hasher.update(&[0xfe]);
    }

    let hash = hasher.finalize();
    hash.to_hex().as_str()[..16].to_string()
}
