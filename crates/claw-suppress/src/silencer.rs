//! Silence administration and the silence half of the suppression query.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, SuppressError};
use crate::silence::{NewSilence, Silence, SilencePage, SilenceQuery, SilenceStatus, SilenceUpdate, select};
use crate::store::StateStore;
use crate::types::Alert;
use crate::validation::parse_silence_id;

/// Default page size for silence listings.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Owns silence definitions in a [`StateStore`].
///
/// Every silence returned from here has its status recomputed at the time of
/// the call.
#[derive(Clone)]
pub struct Silencer {
    store: Arc<dyn StateStore>,
    default_page_size: usize,
    max_page_size: usize,
}

impl std::fmt::Debug for Silencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Silencer")
            .field("default_page_size", &self.default_page_size)
            .field("max_page_size", &self.max_page_size)
            .finish_non_exhaustive()
    }
}

impl Silencer {
    /// Creates a silencer with the default page sizes.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    /// Sets the page size bounds used by [`Silencer::list_silences`].
    #[must_use]
    pub fn with_page_sizes(mut self, default_page_size: usize, max_page_size: usize) -> Self {
        self.default_page_size = default_page_size;
        self.max_page_size = max_page_size;
        self
    }

    /// Validates and stores a new silence.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed request, or a store error
    /// if the silence could not be written.
    pub async fn create_silence(&self, request: NewSilence) -> Result<Silence> {
        let silence = request.build(Utc::now())?;
        self.store.put_silence(silence.clone()).await?;

        info!(
            silence_id = %silence.id,
            created_by = %silence.created_by,
            matchers = silence.matchers.len(),
            starts_at = %silence.starts_at,
            ends_at = %silence.ends_at,
            status = %silence.status,
            "created silence"
        );
        Ok(silence)
    }

    /// Applies a partial update to a silence.
    ///
    /// # Errors
    ///
    /// Returns `SuppressError::SilenceNotFound` if the ID is unknown, or a
    /// validation error if the silence has expired or a field is invalid.
    pub async fn update_silence(&self, id: &str, update: SilenceUpdate) -> Result<Silence> {
        let current = self.fetch(id).await?;
        let updated = update.apply(current, Utc::now())?;
        self.store.put_silence(updated.clone()).await?;

        info!(
            silence_id = %updated.id,
            ends_at = %updated.ends_at,
            status = %updated.status,
            "updated silence"
        );
        Ok(updated)
    }

    /// Deletes a silence.
    ///
    /// # Errors
    ///
    /// Returns `SuppressError::SilenceNotFound` if the ID is unknown.
    pub async fn delete_silence(&self, id: &str) -> Result<()> {
        let uuid = parse_silence_id(id)?;
        if !self.store.delete_silence(uuid).await? {
            return Err(SuppressError::SilenceNotFound { id: id.to_string() });
        }
        info!(silence_id = %uuid, "deleted silence");
        Ok(())
    }

    /// Ends a silence now while keeping it for audit.
    ///
    /// A silence that has not started yet is deleted instead, and `None` is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns `SuppressError::SilenceNotFound` if the ID is unknown, or a
    /// validation error if the silence has already expired.
    pub async fn expire_silence(&self, id: &str) -> Result<Option<Silence>> {
        let mut silence = self.fetch(id).await?;
        let now = Utc::now();

        match silence.status_at(now) {
            SilenceStatus::Expired => Err(SuppressError::validation(
                "status",
                "silence has already expired",
            )),
            SilenceStatus::Active if silence.starts_at < now => {
                silence.ends_at = now;
                silence.updated_at = Some(now);
                let silence = silence.refreshed(now);
                self.store.put_silence(silence.clone()).await?;
                info!(silence_id = %silence.id, "expired silence");
                Ok(Some(silence))
            }
            _ => {
                self.store.delete_silence(silence.id).await?;
                info!(silence_id = %silence.id, "deleted silence that had not started");
                Ok(None)
            }
        }
    }

    /// Gets a silence by ID.
    ///
    /// # Errors
    ///
    /// Returns `SuppressError::SilenceNotFound` if the ID is unknown, or a
    /// validation error if it is not a UUID.
    pub async fn get_silence(&self, id: &str) -> Result<Silence> {
        Ok(self.fetch(id).await?.refreshed(Utc::now()))
    }

    /// Lists silences matching `query`, sorted and paginated.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero page size or an inverted time
    /// range.
    pub async fn list_silences(&self, query: SilenceQuery) -> Result<SilencePage> {
        let limit = query.limit.unwrap_or(self.default_page_size);
        if limit == 0 {
            return Err(SuppressError::validation("limit", "must be at least 1"));
        }
        if let (Some(from), Some(to)) = (query.filter.from, query.filter.to) {
            if from > to {
                return Err(SuppressError::validation("to", "must not be before from"));
            }
        }

        let candidates = self
            .store
            .list_silences(query.filter.created_by.as_deref())
            .await?;
        Ok(select(candidates, &query, limit.min(self.max_page_size), Utc::now()))
    }

    /// Returns the IDs of all active silences matching `alert`, sorted.
    ///
    /// This is the raw query: store errors propagate. The engine wraps it
    /// with the fail-open policy.
    ///
    /// # Errors
    ///
    /// Returns a store error if silences could not be read.
    pub async fn is_alert_silenced(&self, alert: &Alert) -> Result<Vec<Uuid>> {
        let now = Utc::now();
        let mut ids: Vec<Uuid> = self
            .store
            .unexpired_silences(now)
            .await?
            .iter()
            .filter(|s| s.silences_at(now, &alert.labels))
            .map(|s| s.id)
            .collect();
        ids.sort_unstable();

        debug!(
            fingerprint = %alert.fingerprint,
            silenced = !ids.is_empty(),
            matching = ids.len(),
            "evaluated silences"
        );
        Ok(ids)
    }

    async fn fetch(&self, id: &str) -> Result<Silence> {
        let uuid = parse_silence_id(id)?;
        self.store
            .get_silence(uuid)
            .await?
            .ok_or_else(|| SuppressError::SilenceNotFound { id: id.to_string() })
    }
}
