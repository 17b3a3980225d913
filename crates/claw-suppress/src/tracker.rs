//! Durable record of active inhibitions.
//!
//! Each [`InhibitionState`] says "target T is inhibited by source S under
//! rule R". At most one state exists per target (first match wins); the
//! tracker lets introspection answer "what is inhibited and why" without
//! re-running rule evaluation, and survives restarts when the store persists.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::store::StateStore;

/// One active suppression relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InhibitionState {
    /// Fingerprint of the inhibited alert.
    pub target_fingerprint: String,
    /// Fingerprint of the firing alert causing the inhibition.
    pub source_fingerprint: String,
    /// Name of the rule that matched.
    pub rule_name: String,
    /// When the inhibition was first recorded.
    pub inhibited_at: DateTime<Utc>,
}

impl InhibitionState {
    /// Creates a state stamped with the current time.
    pub fn new(
        target_fingerprint: impl Into<String>,
        source_fingerprint: impl Into<String>,
        rule_name: impl Into<String>,
    ) -> Self {
        Self {
            target_fingerprint: target_fingerprint.into(),
            source_fingerprint: source_fingerprint.into(),
            rule_name: rule_name.into(),
            inhibited_at: Utc::now(),
        }
    }

    /// Returns true if both states describe the same target/source/rule triple.
    #[must_use]
    pub fn same_relationship(&self, other: &Self) -> bool {
        self.target_fingerprint == other.target_fingerprint
            && self.source_fingerprint == other.source_fingerprint
            && self.rule_name == other.rule_name
    }
}

/// Records and answers queries about active inhibitions.
#[derive(Clone)]
pub struct SuppressionStateTracker {
    store: Arc<dyn StateStore>,
}

impl std::fmt::Debug for SuppressionStateTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuppressionStateTracker").finish_non_exhaustive()
    }
}

impl SuppressionStateTracker {
    /// Creates a tracker over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Records an inhibition.
    ///
    /// Re-recording the same triple is a no-op and keeps the original
    /// `inhibited_at`. A different triple for the same target replaces the
    /// previous one. Returns true if the stored state changed.
    pub async fn record_inhibition(&self, state: InhibitionState) -> Result<bool> {
        let target = state.target_fingerprint.clone();
        let source = state.source_fingerprint.clone();
        let rule = state.rule_name.clone();

        let changed = self.store.record_inhibition(state).await?;
        if changed {
            info!(target = %target, source = %source, rule = %rule, "recorded inhibition");
        } else {
            debug!(target = %target, "inhibition already recorded");
        }
        Ok(changed)
    }

    /// Removes the inhibition on `target_fingerprint`, returning it if present.
    pub async fn remove_inhibition(&self, target_fingerprint: &str) -> Result<Option<InhibitionState>> {
        let removed = self.store.remove_inhibition(target_fingerprint).await?;
        if let Some(state) = &removed {
            info!(
                target = %state.target_fingerprint,
                source = %state.source_fingerprint,
                rule = %state.rule_name,
                "removed inhibition"
            );
        }
        Ok(removed)
    }

    /// Removes `expected` if it is still the recorded state for its target.
    ///
    /// Used to clear a stale record without discarding one written by a
    /// concurrent evaluation after `expected` was read.
    pub async fn remove_inhibition_if(&self, expected: &InhibitionState) -> Result<bool> {
        let removed = self.store.remove_inhibition_if(expected).await?;
        if removed {
            info!(
                target = %expected.target_fingerprint,
                source = %expected.source_fingerprint,
                rule = %expected.rule_name,
                "removed stale inhibition"
            );
        } else {
            debug!(target = %expected.target_fingerprint, "inhibition changed concurrently, kept");
        }
        Ok(removed)
    }

    /// Removes every inhibition caused by `source_fingerprint`.
    pub async fn remove_inhibitions_by_source(
        &self,
        source_fingerprint: &str,
    ) -> Result<Vec<InhibitionState>> {
        let removed = self
            .store
            .remove_inhibitions_by_source(source_fingerprint)
            .await?;
        if !removed.is_empty() {
            info!(
                source = %source_fingerprint,
                count = removed.len(),
                "removed inhibitions for resolved source"
            );
        }
        Ok(removed)
    }

    /// Returns all active inhibitions, oldest first.
    pub async fn get_active_inhibitions(&self) -> Result<Vec<InhibitionState>> {
        let mut states = self.store.list_inhibitions().await?;
        states.sort_by(|a, b| {
            a.inhibited_at
                .cmp(&b.inhibited_at)
                .then_with(|| a.target_fingerprint.cmp(&b.target_fingerprint))
        });
        Ok(states)
    }

    /// Returns true if `target_fingerprint` is currently inhibited.
    pub async fn is_inhibited(&self, target_fingerprint: &str) -> Result<bool> {
        Ok(self.get_inhibition_state(target_fingerprint).await?.is_some())
    }

    /// Returns the inhibition on `target_fingerprint`, if any.
    pub async fn get_inhibition_state(
        &self,
        target_fingerprint: &str,
    ) -> Result<Option<InhibitionState>> {
        self.store.get_inhibition(target_fingerprint).await
    }
}
