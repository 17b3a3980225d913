//! State store abstraction and the in-memory implementation.
//!
//! The engine needs three collections: silences keyed by ID, the population
//! of currently-firing alerts keyed by fingerprint, and inhibition states
//! keyed by target fingerprint. [`StateStore`] abstracts over where they
//! live; [`MemoryStore`] keeps them behind short `parking_lot` critical
//! sections and can mirror them to JSON snapshots for restart recovery.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Result, SuppressError};
use crate::persist::JsonSnapshots;
use crate::silence::Silence;
use crate::tracker::InhibitionState;
use crate::types::Alert;

const SILENCES: &str = "silences";
const ALERTS: &str = "alerts";
const INHIBITIONS: &str = "inhibitions";

/// Storage backend for engine state.
///
/// Implementations must be safe to call concurrently and must apply each
/// mutation atomically: a caller that abandons a call mid-flight must never
/// leave a half-written record behind.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Inserts or replaces a silence.
    async fn put_silence(&self, silence: Silence) -> Result<()>;

    /// Gets a silence by ID.
    async fn get_silence(&self, id: Uuid) -> Result<Option<Silence>>;

    /// Deletes a silence, returning true if it existed.
    async fn delete_silence(&self, id: Uuid) -> Result<bool>;

    /// Lists silences, optionally restricted to one creator.
    async fn list_silences(&self, created_by: Option<&str>) -> Result<Vec<Silence>>;

    /// Lists silences whose window has not ended at `now`.
    ///
    /// This is the suppression hot path; the default implementation filters
    /// [`StateStore::list_silences`].
    async fn unexpired_silences(&self, now: DateTime<Utc>) -> Result<Vec<Silence>> {
        Ok(self
            .list_silences(None)
            .await?
            .into_iter()
            .filter(|s| s.ends_at > now)
            .collect())
    }

    /// Inserts or replaces an alert in the firing population.
    async fn upsert_alert(&self, alert: Alert) -> Result<()>;

    /// Removes an alert from the population, returning it if present.
    async fn remove_alert(&self, fingerprint: &str) -> Result<Option<Alert>>;

    /// Returns the firing alert population.
    async fn firing_alerts(&self) -> Result<Vec<Alert>>;

    /// Records an inhibition. Returns true if stored state changed; an
    /// identical target/source/rule triple is a no-op.
    async fn record_inhibition(&self, state: InhibitionState) -> Result<bool>;

    /// Removes the inhibition on a target.
    async fn remove_inhibition(&self, target_fingerprint: &str) -> Result<Option<InhibitionState>>;

    /// Removes the inhibition on `expected.target_fingerprint` only if the
    /// stored record still equals `expected`. Returns true if it was removed.
    ///
    /// A record replaced or re-created since `expected` was read is kept.
    async fn remove_inhibition_if(&self, expected: &InhibitionState) -> Result<bool>;

    /// Takes an alert out of the firing population together with every
    /// inhibition it caused and the inhibition it was subject to, as one
    /// atomic change.
    async fn resolve_alert(&self, fingerprint: &str) -> Result<Resolution>;

    /// Removes every inhibition whose source is `source_fingerprint`.
    async fn remove_inhibitions_by_source(
        &self,
        source_fingerprint: &str,
    ) -> Result<Vec<InhibitionState>>;

    /// Gets the inhibition on a target.
    async fn get_inhibition(&self, target_fingerprint: &str) -> Result<Option<InhibitionState>>;

    /// Lists all inhibitions.
    async fn list_inhibitions(&self) -> Result<Vec<InhibitionState>>;
}

/// What [`StateStore::resolve_alert`] removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// The alert, if it was in the firing population.
    pub alert: Option<Alert>,
    /// Inhibitions the alert caused as a source.
    pub released: Vec<InhibitionState>,
    /// The inhibition the alert was subject to as a target.
    pub cleared: Option<InhibitionState>,
}

/// Silences with secondary indexes by creator and by end time.
#[derive(Debug, Default)]
struct SilenceTable {
    by_id: HashMap<Uuid, Silence>,
    by_creator: HashMap<String, BTreeSet<Uuid>>,
    by_end: BTreeSet<(DateTime<Utc>, Uuid)>,
}

impl SilenceTable {
    fn from_silences(silences: Vec<Silence>) -> Self {
        let mut table = Self::default();
        for silence in silences {
            table.insert(silence);
        }
        table
    }

    fn insert(&mut self, silence: Silence) -> Option<Silence> {
        let previous = self.remove(silence.id);
        self.by_creator
            .entry(silence.created_by.clone())
            .or_default()
            .insert(silence.id);
        self.by_end.insert((silence.ends_at, silence.id));
        self.by_id.insert(silence.id, silence);
        previous
    }

    fn remove(&mut self, id: Uuid) -> Option<Silence> {
        let silence = self.by_id.remove(&id)?;
        if let Some(ids) = self.by_creator.get_mut(&silence.created_by) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_creator.remove(&silence.created_by);
            }
        }
        self.by_end.remove(&(silence.ends_at, id));
        Some(silence)
    }

    fn by_creator(&self, created_by: &str) -> Vec<Silence> {
        self.by_creator
            .get(created_by)
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id))
            .cloned()
            .collect()
    }

    fn ending_after(&self, now: DateTime<Utc>) -> Vec<Silence> {
        self.by_end
            .range((now, Uuid::nil())..)
            .filter(|(ends_at, _)| *ends_at > now)
            .filter_map(|(_, id)| self.by_id.get(id))
            .cloned()
            .collect()
    }

    fn all(&self) -> Vec<Silence> {
        self.by_id.values().cloned().collect()
    }
}

/// Thread-safe in-memory state store with optional JSON persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    silences: RwLock<SilenceTable>,
    alerts: RwLock<HashMap<String, Alert>>,
    inhibitions: RwLock<HashMap<String, InhibitionState>>,
    snapshots: Option<JsonSnapshots>,
}

impl MemoryStore {
    /// Creates an empty, non-persistent store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store mirrored to JSON snapshots in `dir`, loading any
    /// existing state.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing
    /// snapshot cannot be parsed.
    pub fn with_snapshot_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let snapshots = JsonSnapshots::open(dir)?;
        let silences: Vec<Silence> = snapshots.load(SILENCES)?;
        let alerts: Vec<Alert> = snapshots.load(ALERTS)?;
        let inhibitions: Vec<InhibitionState> = snapshots.load(INHIBITIONS)?;

        info!(
            dir = %snapshots.dir().display(),
            silences = silences.len(),
            alerts = alerts.len(),
            inhibitions = inhibitions.len(),
            "loaded suppression state"
        );

        Ok(Self {
            silences: RwLock::new(SilenceTable::from_silences(silences)),
            alerts: RwLock::new(
                alerts
                    .into_iter()
                    .map(|a| (a.fingerprint.clone(), a))
                    .collect(),
            ),
            inhibitions: RwLock::new(
                inhibitions
                    .into_iter()
                    .map(|s| (s.target_fingerprint.clone(), s))
                    .collect(),
            ),
            snapshots: Some(snapshots),
        })
    }

    /// Returns true if the store persists to disk.
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        self.snapshots.is_some()
    }

    fn persist_silences(&self) -> Result<()> {
        match &self.snapshots {
            Some(snapshots) => snapshots
                .save_with(SILENCES, || self.silences.read().all())
                .map_err(|e| SuppressError::state_store(format!("failed to persist silences: {e}"))),
            None => Ok(()),
        }
    }

    fn persist_alerts(&self) {
        if let Some(snapshots) = &self.snapshots {
            let result = snapshots.save_with(ALERTS, || {
                self.alerts.read().values().cloned().collect::<Vec<_>>()
            });
            if let Err(e) = result {
                warn!(error = %e, "failed to snapshot alert population");
            }
        }
    }

    fn persist_inhibitions(&self) {
        if let Some(snapshots) = &self.snapshots {
            let result = snapshots.save_with(INHIBITIONS, || {
                self.inhibitions.read().values().cloned().collect::<Vec<_>>()
            });
            if let Err(e) = result {
                warn!(error = %e, "failed to snapshot inhibition state");
            }
        }
    }

    /// Restores `previous` after a failed snapshot, unless a concurrent
    /// writer already replaced `inserted`.
    fn rollback_silence(&self, inserted: &Silence, previous: Option<Silence>) {
        let mut table = self.silences.write();
        if table.by_id.get(&inserted.id) != Some(inserted) {
            return;
        }
        table.remove(inserted.id);
        if let Some(previous) = previous {
            table.insert(previous);
        }
    }
}

fn drain_by_source(
    inhibitions: &mut HashMap<String, InhibitionState>,
    source_fingerprint: &str,
) -> Vec<InhibitionState> {
    let targets: Vec<String> = inhibitions
        .values()
        .filter(|s| s.source_fingerprint == source_fingerprint)
        .map(|s| s.target_fingerprint.clone())
        .collect();
    targets
        .iter()
        .filter_map(|t| inhibitions.remove(t))
        .collect()
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn put_silence(&self, silence: Silence) -> Result<()> {
        let inserted = silence.clone();
        let previous = self.silences.write().insert(silence);
        if let Err(e) = self.persist_silences() {
            self.rollback_silence(&inserted, previous);
            return Err(e);
        }
        Ok(())
    }

    async fn get_silence(&self, id: Uuid) -> Result<Option<Silence>> {
        Ok(self.silences.read().by_id.get(&id).cloned())
    }

    async fn delete_silence(&self, id: Uuid) -> Result<bool> {
        let Some(previous) = self.silences.write().remove(id) else {
            return Ok(false);
        };
        if let Err(e) = self.persist_silences() {
            let mut table = self.silences.write();
            if !table.by_id.contains_key(&previous.id) {
                table.insert(previous);
            }
            return Err(e);
        }
        Ok(true)
    }

    async fn list_silences(&self, created_by: Option<&str>) -> Result<Vec<Silence>> {
        let table = self.silences.read();
        Ok(match created_by {
            Some(creator) => table.by_creator(creator),
            None => table.all(),
        })
    }

    async fn unexpired_silences(&self, now: DateTime<Utc>) -> Result<Vec<Silence>> {
        Ok(self.silences.read().ending_after(now))
    }

    async fn upsert_alert(&self, alert: Alert) -> Result<()> {
        let changed = {
            let mut alerts = self.alerts.write();
            let changed = alerts.get(&alert.fingerprint) != Some(&alert);
            alerts.insert(alert.fingerprint.clone(), alert);
            changed
        };
        if changed {
            self.persist_alerts();
        }
        Ok(())
    }

    async fn remove_alert(&self, fingerprint: &str) -> Result<Option<Alert>> {
        let removed = self.alerts.write().remove(fingerprint);
        if removed.is_some() {
            self.persist_alerts();
        }
        Ok(removed)
    }

    async fn firing_alerts(&self) -> Result<Vec<Alert>> {
        Ok(self
            .alerts
            .read()
            .values()
            .filter(|a| a.is_firing())
            .cloned()
            .collect())
    }

    async fn record_inhibition(&self, state: InhibitionState) -> Result<bool> {
        let changed = {
            let mut inhibitions = self.inhibitions.write();
            match inhibitions.get(&state.target_fingerprint) {
                Some(existing) if existing.same_relationship(&state) => false,
                _ => {
                    inhibitions.insert(state.target_fingerprint.clone(), state);
                    true
                }
            }
        };
        if changed {
            self.persist_inhibitions();
        }
        Ok(changed)
    }

    async fn remove_inhibition(&self, target_fingerprint: &str) -> Result<Option<InhibitionState>> {
        let removed = self.inhibitions.write().remove(target_fingerprint);
        if removed.is_some() {
            self.persist_inhibitions();
        }
        Ok(removed)
    }

    async fn remove_inhibition_if(&self, expected: &InhibitionState) -> Result<bool> {
        let removed = {
            let mut inhibitions = self.inhibitions.write();
            let current = inhibitions.get(&expected.target_fingerprint);
            if current == Some(expected) {
                inhibitions.remove(&expected.target_fingerprint);
                true
            } else {
                false
            }
        };
        if removed {
            self.persist_inhibitions();
        }
        Ok(removed)
    }

    async fn resolve_alert(&self, fingerprint: &str) -> Result<Resolution> {
        let resolution = {
            let mut alerts = self.alerts.write();
            let mut inhibitions = self.inhibitions.write();
            Resolution {
                alert: alerts.remove(fingerprint),
                released: drain_by_source(&mut inhibitions, fingerprint),
                cleared: inhibitions.remove(fingerprint),
            }
        };
        if resolution.alert.is_some() {
            self.persist_alerts();
        }
        if !resolution.released.is_empty() || resolution.cleared.is_some() {
            self.persist_inhibitions();
        }
        Ok(resolution)
    }

    async fn remove_inhibitions_by_source(
        &self,
        source_fingerprint: &str,
    ) -> Result<Vec<InhibitionState>> {
        let removed = drain_by_source(&mut self.inhibitions.write(), source_fingerprint);
        if !removed.is_empty() {
            self.persist_inhibitions();
        }
        Ok(removed)
    }

    async fn get_inhibition(&self, target_fingerprint: &str) -> Result<Option<InhibitionState>> {
        Ok(self.inhibitions.read().get(target_fingerprint).cloned())
    }

    async fn list_inhibitions(&self) -> Result<Vec<InhibitionState>> {
        Ok(self.inhibitions.read().values().cloned().collect())
    }
}
