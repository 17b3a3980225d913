//! Silences and their time-based lifecycle.
//!
//! A silence mutes every alert whose labels satisfy all of its matchers while
//! the silence is [`SilenceStatus::Active`]. Status is never authoritative
//! state: it is recomputed from `(now, starts_at, ends_at)` on every read.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SuppressError};
use crate::matcher::{Matcher, match_all};
use crate::types::Labels;
use crate::validation::{
    validate_comment, validate_creator, validate_matcher_count, validate_window,
};

/// Time-derived status of a silence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SilenceStatus {
    /// The silence window has not started yet.
    #[default]
    Pending,
    /// The silence is currently suppressing matching alerts.
    Active,
    /// The silence window has ended; kept for audit only.
    Expired,
}

impl SilenceStatus {
    /// Derives the status of a window at `now`.
    #[must_use]
    pub fn at(now: DateTime<Utc>, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Self {
        if now < starts_at {
            Self::Pending
        } else if now < ends_at {
            Self::Active
        } else {
            Self::Expired
        }
    }

    /// Returns the status as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for SilenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SilenceStatus {
    type Err = SuppressError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            other => Err(SuppressError::validation(
                "status",
                format!("unknown silence status '{other}'"),
            )),
        }
    }
}

/// An operator-defined, time-bounded mute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Silence {
    /// Server-generated identifier.
    pub id: Uuid,
    /// E-mail of the operator who created the silence.
    pub created_by: String,
    /// Why the silence exists.
    pub comment: String,
    /// When the silence starts suppressing.
    pub starts_at: DateTime<Utc>,
    /// When the silence stops suppressing.
    pub ends_at: DateTime<Utc>,
    /// All matchers must match an alert for it to be silenced.
    pub matchers: Vec<Matcher>,
    /// Status as of the last read.
    #[serde(default)]
    pub status: SilenceStatus,
    /// When the silence was created.
    pub created_at: DateTime<Utc>,
    /// When the silence was last modified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Silence {
    /// Returns the status at `now`.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> SilenceStatus {
        SilenceStatus::at(now, self.starts_at, self.ends_at)
    }

    /// Returns the status right now.
    #[must_use]
    pub fn status(&self) -> SilenceStatus {
        self.status_at(Utc::now())
    }

    /// Returns a copy with `status` recomputed for `now`.
    #[must_use]
    pub fn refreshed(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.status_at(now);
        self
    }

    /// Returns true if the silence suppresses at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == SilenceStatus::Active
    }

    /// Returns true if the silence's matchers accept `labels`, ignoring time.
    #[must_use]
    pub fn matches_labels(&self, labels: &Labels) -> bool {
        match_all(&self.matchers, labels)
    }

    /// Returns true if the silence is active at `now` and matches `labels`.
    #[must_use]
    pub fn silences_at(&self, now: DateTime<Utc>, labels: &Labels) -> bool {
        self.is_active_at(now) && self.matches_labels(labels)
    }
}

/// A request to create a silence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSilence {
    /// E-mail of the creating operator.
    pub created_by: String,
    /// Why the silence exists.
    pub comment: String,
    /// Start of the window; defaults to the creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    /// End of the window.
    pub ends_at: DateTime<Utc>,
    /// Matchers, ANDed together.
    pub matchers: Vec<Matcher>,
}

impl NewSilence {
    /// Creates a request starting now.
    pub fn new(
        matchers: Vec<Matcher>,
        ends_at: DateTime<Utc>,
        created_by: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            created_by: created_by.into(),
            comment: comment.into(),
            starts_at: None,
            ends_at,
            matchers,
        }
    }

    /// Sets an explicit start time.
    #[must_use]
    pub const fn starting_at(mut self, starts_at: DateTime<Utc>) -> Self {
        self.starts_at = Some(starts_at);
        self
    }

    /// Validates the request and builds a silence with a fresh ID.
    ///
    /// # Errors
    ///
    /// Returns `SuppressError::Validation` naming the first field that
    /// violates a constraint.
    pub fn build(self, now: DateTime<Utc>) -> Result<Silence> {
        validate_creator(&self.created_by)?;
        validate_comment(&self.comment)?;
        validate_matcher_count(self.matchers.len())?;

        let starts_at = self.starts_at.unwrap_or(now);
        validate_window(starts_at, self.ends_at)?;
        if self.ends_at <= now {
            return Err(SuppressError::validation(
                "ends_at",
                "must be in the future",
            ));
        }

        Ok(Silence {
            id: Uuid::new_v4(),
            created_by: self.created_by,
            comment: self.comment,
            starts_at,
            ends_at: self.ends_at,
            matchers: self.matchers,
            status: SilenceStatus::at(now, starts_at, self.ends_at),
            created_at: now,
            updated_at: None,
        })
    }
}

/// A partial update of the mutable fields of a silence.
///
/// `id`, `created_by`, `starts_at` and `created_at` cannot be changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SilenceUpdate {
    /// New comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// New end time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    /// Replacement matcher list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matchers: Option<Vec<Matcher>>,
}

impl SilenceUpdate {
    /// Returns true if the update changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.comment.is_none() && self.ends_at.is_none() && self.matchers.is_none()
    }

    /// Validates and applies the update, returning the modified silence.
    ///
    /// # Errors
    ///
    /// Returns `SuppressError::Validation` if the silence has already
    /// expired or a new value violates a constraint.
    pub fn apply(self, mut silence: Silence, now: DateTime<Utc>) -> Result<Silence> {
        if silence.status_at(now) == SilenceStatus::Expired {
            return Err(SuppressError::validation(
                "status",
                "expired silences cannot be modified",
            ));
        }

        if let Some(comment) = self.comment {
            validate_comment(&comment)?;
            silence.comment = comment;
        }
        if let Some(ends_at) = self.ends_at {
            validate_window(silence.starts_at, ends_at)?;
            silence.ends_at = ends_at;
        }
        if let Some(matchers) = self.matchers {
            validate_matcher_count(matchers.len())?;
            silence.matchers = matchers;
        }

        silence.updated_at = Some(now);
        Ok(silence.refreshed(now))
    }
}

/// Criteria for listing silences. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SilenceFilter {
    /// Only silences with this status.
    #[serde(default)]
    pub status: Option<SilenceStatus>,
    /// Only silences created by this operator.
    #[serde(default)]
    pub created_by: Option<String>,
    /// Only silences with a matcher on this label name.
    #[serde(default)]
    pub label: Option<String>,
    /// Only silences whose matchers accept this label set.
    #[serde(default)]
    pub matches: Option<Labels>,
    /// Only silences whose window ends after this instant.
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    /// Only silences whose window starts before this instant.
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

impl SilenceFilter {
    /// Filters by status.
    #[must_use]
    pub const fn with_status(mut self, status: SilenceStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filters by creator.
    #[must_use]
    pub fn with_creator(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    /// Filters by label name.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Filters by window overlap with `[from, to)`.
    #[must_use]
    pub const fn overlapping(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Returns true if `silence` passes every set criterion at `now`.
    #[must_use]
    pub fn accepts(&self, silence: &Silence, now: DateTime<Utc>) -> bool {
        if self.status.is_some_and(|s| silence.status_at(now) != s) {
            return false;
        }
        if self
            .created_by
            .as_deref()
            .is_some_and(|c| silence.created_by != c)
        {
            return false;
        }
        if self
            .label
            .as_deref()
            .is_some_and(|l| !silence.matchers.iter().any(|m| m.name() == l))
        {
            return false;
        }
        if self
            .matches
            .as_ref()
            .is_some_and(|labels| !silence.matches_labels(labels))
        {
            return false;
        }
        if self.from.is_some_and(|from| silence.ends_at <= from) {
            return false;
        }
        if self.to.is_some_and(|to| silence.starts_at >= to) {
            return false;
        }
        true
    }
}

/// Field to sort silence listings by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Creation time.
    #[default]
    CreatedAt,
    /// Window start.
    StartsAt,
    /// Window end.
    EndsAt,
}

/// Sort order for silence listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SilenceSort {
    /// Field to sort by.
    pub field: SortField,
    /// Newest first when true.
    pub descending: bool,
}

impl Default for SilenceSort {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            descending: true,
        }
    }
}

impl SilenceSort {
    fn compare(&self, a: &Silence, b: &Silence) -> Ordering {
        let key = |s: &Silence| match self.field {
            SortField::CreatedAt => s.created_at,
            SortField::StartsAt => s.starts_at,
            SortField::EndsAt => s.ends_at,
        };
        let ord = key(a).cmp(&key(b)).then_with(|| a.id.cmp(&b.id));
        if self.descending { ord.reverse() } else { ord }
    }
}

/// A listing request: filter, sort, and page window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SilenceQuery {
    /// Filter criteria.
    #[serde(default)]
    pub filter: SilenceFilter,
    /// Sort order.
    #[serde(default)]
    pub sort: SilenceSort,
    /// Number of matching silences to skip.
    #[serde(default)]
    pub offset: usize,
    /// Page size; the engine default applies when unset.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SilenceQuery {
    /// A query with the given filter and default paging.
    #[must_use]
    pub fn filtered(filter: SilenceFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

/// One page of a silence listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SilencePage {
    /// Silences on this page, statuses refreshed.
    pub silences: Vec<Silence>,
    /// Number of silences matching the filter across all pages.
    pub total: usize,
}

/// Filters, sorts, and pages `silences` at `now`.
#[must_use]
pub fn select(silences: Vec<Silence>, query: &SilenceQuery, limit: usize, now: DateTime<Utc>) -> SilencePage {
    let mut matching: Vec<Silence> = silences
        .into_iter()
        .filter(|s| query.filter.accepts(s, now))
        .collect();
    matching.sort_by(|a, b| query.sort.compare(a, b));

    let total = matching.len();
    let silences = matching
        .into_iter()
        .skip(query.offset)
        .take(limit)
        .map(|s| s.refreshed(now))
        .collect();

    SilencePage { silences, total }
}
