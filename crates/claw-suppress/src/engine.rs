//! The suppression engine.
//!
//! [`SuppressionEngine`] is the entry point for callers. It answers the two
//! suppression queries, exposes silence administration and inhibition
//! introspection, and owns the fail-open policy:
//!
//! - Suppression queries never return an error. An infrastructure fault, a
//!   missed deadline, or a cancellation yields a "not suppressed" verdict
//!   with the error attached, is logged at `warn`, and is counted in
//!   [`EngineStats`].
//! - Administrative calls return every error to the caller.
//!
//! Every call takes a [`QueryContext`] carrying a deadline and an optional
//! cancellation token.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{Result, SuppressError};
use crate::inhibitor::{InhibitionMatch, Inhibitor};
use crate::rules::{InhibitionRule, RuleSet, SharedRules};
use crate::silence::{NewSilence, Silence, SilencePage, SilenceQuery, SilenceUpdate};
use crate::silencer::Silencer;
use crate::store::{MemoryStore, StateStore};
use crate::tracker::{InhibitionState, SuppressionStateTracker};
use crate::types::Alert;

/// Deadline and cancellation for one engine call.
#[derive(Debug, Clone)]
pub struct QueryContext {
    deadline: Instant,
    budget: Duration,
    cancel: Option<CancellationToken>,
}

impl QueryContext {
    /// A context that expires `budget` from now.
    #[must_use]
    pub fn with_timeout(budget: Duration) -> Self {
        Self {
            deadline: Instant::now() + budget,
            budget,
            cancel: None,
        }
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Time left before the deadline.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Returns true if the attached token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn budget_ms(&self) -> u64 {
        u64::try_from(self.budget.as_millis()).unwrap_or(u64::MAX)
    }

    /// Runs `work` until it completes, the deadline passes, or the context is
    /// cancelled, whichever comes first. An abandoned `work` future is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns the error of `work`, `SuppressError::Timeout`, or
    /// `SuppressError::Cancelled`.
    pub async fn bounded<T>(
        &self,
        operation: &str,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timed = tokio::time::timeout_at(self.deadline, work);
        let outcome = match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => {
                    return Err(SuppressError::Cancelled {
                        operation: operation.to_string(),
                    });
                }
                outcome = timed => outcome,
            },
            None => timed.await,
        };
        outcome.map_err(|_| SuppressError::Timeout {
            operation: operation.to_string(),
            after_ms: self.budget_ms(),
        })?
    }
}

/// A verdict that has a safe value to fall back to when evaluation fails.
trait FailOpen {
    /// The "not suppressed" verdict carrying `error`.
    fn fail_open(error: SuppressError) -> Self;
}

fn error_message<S: Serializer>(
    error: &Option<SuppressError>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.collect_str(e),
        None => serializer.serialize_none(),
    }
}

/// Result of the silence query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SilenceVerdict {
    /// True if at least one active silence matched.
    pub silenced: bool,
    /// IDs of every matching active silence, sorted.
    pub silence_ids: Vec<Uuid>,
    /// The fault that forced a fail-open verdict, if any.
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "error_message")]
    pub error: Option<SuppressError>,
}

impl SilenceVerdict {
    fn matched(silence_ids: Vec<Uuid>) -> Self {
        Self {
            silenced: !silence_ids.is_empty(),
            silence_ids,
            error: None,
        }
    }
}

impl FailOpen for SilenceVerdict {
    fn fail_open(error: SuppressError) -> Self {
        Self {
            silenced: false,
            silence_ids: Vec::new(),
            error: Some(error),
        }
    }
}

/// Result of the inhibition query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InhibitVerdict {
    /// True if a firing alert inhibits this one.
    pub inhibited: bool,
    /// The inhibiting alert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Alert>,
    /// The rule that matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<InhibitionRule>,
    /// The fault that forced a fail-open verdict, if any.
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "error_message")]
    pub error: Option<SuppressError>,
}

impl From<Option<InhibitionMatch>> for InhibitVerdict {
    fn from(found: Option<InhibitionMatch>) -> Self {
        match found {
            Some(InhibitionMatch { source, rule }) => Self {
                inhibited: true,
                source: Some(source),
                rule: Some(rule),
                error: None,
            },
            None => Self::default(),
        }
    }
}

impl FailOpen for InhibitVerdict {
    fn fail_open(error: SuppressError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Both verdicts for one alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Suppression {
    /// The silence verdict.
    pub silence: SilenceVerdict,
    /// The inhibition verdict.
    pub inhibition: InhibitVerdict,
}

impl Suppression {
    /// Returns true if the alert is silenced or inhibited.
    #[must_use]
    pub const fn is_suppressed(&self) -> bool {
        self.silence.silenced || self.inhibition.inhibited
    }

    /// Returns true if either query failed open.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.silence.error.is_some() || self.inhibition.error.is_some()
    }
}

/// Counters describing suppression query health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Silence queries answered.
    pub silence_queries: u64,
    /// Inhibition queries answered.
    pub inhibition_queries: u64,
    /// Silence queries that failed open.
    pub silence_failures: u64,
    /// Inhibition queries that failed open.
    pub inhibition_failures: u64,
    /// Queries that failed open because the deadline passed.
    pub timeouts: u64,
    /// Queries that failed open because the caller cancelled.
    pub cancellations: u64,
}

#[derive(Debug, Clone, Copy)]
enum QueryKind {
    Silence,
    Inhibit,
}

impl QueryKind {
    const fn operation(self) -> &'static str {
        match self {
            Self::Silence => "is_alert_silenced",
            Self::Inhibit => "should_inhibit",
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    silence_queries: AtomicU64,
    inhibition_queries: AtomicU64,
    silence_failures: AtomicU64,
    inhibition_failures: AtomicU64,
    timeouts: AtomicU64,
    cancellations: AtomicU64,
}

impl Counters {
    fn record_query(&self, kind: QueryKind) {
        let counter = match kind {
            QueryKind::Silence => &self.silence_queries,
            QueryKind::Inhibit => &self.inhibition_queries,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self, kind: QueryKind, error: &SuppressError) {
        let counter = match kind {
            QueryKind::Silence => &self.silence_failures,
            QueryKind::Inhibit => &self.inhibition_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        match error {
            SuppressError::Timeout { .. } => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            SuppressError::Cancelled { .. } => {
                self.cancellations.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    fn snapshot(&self) -> EngineStats {
        EngineStats {
            silence_queries: self.silence_queries.load(Ordering::Relaxed),
            inhibition_queries: self.inhibition_queries.load(Ordering::Relaxed),
            silence_failures: self.silence_failures.load(Ordering::Relaxed),
            inhibition_failures: self.inhibition_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
        }
    }
}

/// Answers suppression queries and administers suppression state.
///
/// Cheap to clone; clones share state and counters. Safe to call from any
/// number of tasks at once.
#[derive(Clone)]
pub struct SuppressionEngine {
    store: Arc<dyn StateStore>,
    silencer: Silencer,
    inhibitor: Inhibitor,
    query_timeout: Duration,
    admin_timeout: Duration,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for SuppressionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuppressionEngine")
            .field("silencer", &self.silencer)
            .field("inhibitor", &self.inhibitor)
            .field("query_timeout", &self.query_timeout)
            .field("admin_timeout", &self.admin_timeout)
            .finish_non_exhaustive()
    }
}

impl SuppressionEngine {
    /// Creates an engine over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, rules: RuleSet, config: &EngineConfig) -> Self {
        let silencer = Silencer::new(Arc::clone(&store))
            .with_page_sizes(config.default_page_size, config.max_page_size);
        let inhibitor = Inhibitor::new(SharedRules::new(rules), Arc::clone(&store));
        Self {
            store,
            silencer,
            inhibitor,
            query_timeout: config.query_timeout(),
            admin_timeout: config.admin_timeout(),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Creates an engine from configuration, with a [`MemoryStore`] that
    /// persists to `state_dir` when one is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or persisted state
    /// cannot be loaded.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = match &config.state_dir {
            Some(dir) => MemoryStore::with_snapshot_dir(dir)?,
            None => MemoryStore::new(),
        };
        let engine = Self::new(Arc::new(store), config.rule_set()?, config);
        info!(
            rules = engine.rules().len(),
            persistent = config.state_dir.is_some(),
            "suppression engine ready"
        );
        Ok(engine)
    }

    /// Loads configuration from `path` and builds an engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the engine cannot be
    /// built.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_config(&EngineConfig::from_file(path)?)
    }

    /// A context with the configured suppression query deadline.
    #[must_use]
    pub fn query_context(&self) -> QueryContext {
        QueryContext::with_timeout(self.query_timeout)
    }

    /// A context with the configured administrative deadline.
    #[must_use]
    pub fn admin_context(&self) -> QueryContext {
        QueryContext::with_timeout(self.admin_timeout)
    }

    /// The inhibition state tracker.
    #[must_use]
    pub const fn tracker(&self) -> &SuppressionStateTracker {
        self.inhibitor.tracker()
    }

    /// The current inhibition rules.
    #[must_use]
    pub fn rules(&self) -> Arc<RuleSet> {
        self.inhibitor.rules()
    }

    /// Replaces the inhibition rules in one swap.
    pub fn reload_rules(&self, rules: RuleSet) {
        self.inhibitor.reload_rules(rules);
    }

    /// Returns a snapshot of the query counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.counters.snapshot()
    }

    // ============ Suppression Queries ============

    /// Runs a suppression query, folding any error into the fail-open
    /// verdict.
    async fn guarded<V, F>(&self, kind: QueryKind, ctx: &QueryContext, alert: &Alert, query: F) -> V
    where
        V: FailOpen,
        F: Future<Output = Result<V>>,
    {
        self.counters.record_query(kind);
        match ctx.bounded(kind.operation(), query).await {
            Ok(verdict) => verdict,
            Err(error) => {
                self.counters.record_failure(kind, &error);
                warn!(
                    operation = kind.operation(),
                    fingerprint = %alert.fingerprint,
                    error = %error,
                    "suppression query failed, alert treated as not suppressed"
                );
                V::fail_open(error)
            }
        }
    }

    /// Returns which active silences match `alert`.
    ///
    /// Never fails: on error the verdict is "not silenced" with the error
    /// attached.
    pub async fn is_alert_silenced(&self, ctx: &QueryContext, alert: &Alert) -> SilenceVerdict {
        self.guarded(QueryKind::Silence, ctx, alert, async {
            let ids = self.silencer.is_alert_silenced(alert).await?;
            Ok(SilenceVerdict::matched(ids))
        })
        .await
    }

    /// Returns whether a firing alert inhibits `alert`, with the source and
    /// rule as evidence. Rule order matters: the first rule with a matching
    /// source wins.
    ///
    /// Never fails: on error the verdict is "not inhibited" with the error
    /// attached.
    pub async fn should_inhibit(&self, ctx: &QueryContext, alert: &Alert) -> InhibitVerdict {
        self.guarded(QueryKind::Inhibit, ctx, alert, async {
            Ok(InhibitVerdict::from(self.inhibitor.should_inhibit(alert).await?))
        })
        .await
    }

    /// Runs both queries concurrently.
    pub async fn evaluate(&self, ctx: &QueryContext, alert: &Alert) -> Suppression {
        let (silence, inhibition) = tokio::join!(
            self.is_alert_silenced(ctx, alert),
            self.should_inhibit(ctx, alert)
        );
        let suppression = Suppression { silence, inhibition };
        debug!(
            fingerprint = %alert.fingerprint,
            suppressed = suppression.is_suppressed(),
            degraded = suppression.is_degraded(),
            "evaluated alert"
        );
        suppression
    }

    // ============ Alert Population ============

    /// Feeds an alert transition into the firing population.
    ///
    /// A firing alert becomes a candidate inhibition source. A resolved alert
    /// leaves the population, and every inhibition it caused or was subject
    /// to is removed in the same store operation, so a missed deadline
    /// applies all of it or none of it.
    ///
    /// # Errors
    ///
    /// Returns a store error, `Timeout`, or `Cancelled`.
    pub async fn observe_alert(&self, ctx: &QueryContext, alert: Alert) -> Result<()> {
        let alert = alert.normalized();
        ctx.bounded("observe_alert", async {
            if alert.is_firing() {
                debug!(fingerprint = %alert.fingerprint, "alert firing");
                self.store.upsert_alert(alert).await
            } else {
                let resolution = self.store.resolve_alert(&alert.fingerprint).await?;
                info!(
                    fingerprint = %alert.fingerprint,
                    was_firing = resolution.alert.is_some(),
                    released = resolution.released.len(),
                    cleared = resolution.cleared.is_some(),
                    "alert resolved"
                );
                Ok(())
            }
        })
        .await
    }

    /// Returns the firing alert population, sorted by fingerprint.
    ///
    /// # Errors
    ///
    /// Returns a store error, `Timeout`, or `Cancelled`.
    pub async fn firing_alerts(&self, ctx: &QueryContext) -> Result<Vec<Alert>> {
        let mut alerts = ctx.bounded("firing_alerts", self.store.firing_alerts()).await?;
        alerts.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        Ok(alerts)
    }

    // ============ Silence Administration ============

    /// Creates a silence.
    ///
    /// # Errors
    ///
    /// Returns validation errors verbatim, and store, timeout, or
    /// cancellation errors.
    pub async fn create_silence(&self, ctx: &QueryContext, request: NewSilence) -> Result<Silence> {
        ctx.bounded("create_silence", self.silencer.create_silence(request))
            .await
    }

    /// Applies a partial update to a silence.
    ///
    /// # Errors
    ///
    /// Returns `SilenceNotFound`, validation errors, and store, timeout, or
    /// cancellation errors.
    pub async fn update_silence(
        &self,
        ctx: &QueryContext,
        id: &str,
        update: SilenceUpdate,
    ) -> Result<Silence> {
        ctx.bounded("update_silence", self.silencer.update_silence(id, update))
            .await
    }

    /// Deletes a silence. Alerts it covered are visible on the next query.
    ///
    /// # Errors
    ///
    /// Returns `SilenceNotFound`, and store, timeout, or cancellation errors.
    pub async fn delete_silence(&self, ctx: &QueryContext, id: &str) -> Result<()> {
        ctx.bounded("delete_silence", self.silencer.delete_silence(id))
            .await
    }

    /// Ends a silence now. Returns `None` if it had not started and was
    /// deleted instead.
    ///
    /// # Errors
    ///
    /// Returns `SilenceNotFound`, a validation error for an expired silence,
    /// and store, timeout, or cancellation errors.
    pub async fn expire_silence(&self, ctx: &QueryContext, id: &str) -> Result<Option<Silence>> {
        ctx.bounded("expire_silence", self.silencer.expire_silence(id))
            .await
    }

    /// Gets a silence by ID.
    ///
    /// # Errors
    ///
    /// Returns `SilenceNotFound`, a validation error for a malformed ID, and
    /// store, timeout, or cancellation errors.
    pub async fn get_silence(&self, ctx: &QueryContext, id: &str) -> Result<Silence> {
        ctx.bounded("get_silence", self.silencer.get_silence(id)).await
    }

    /// Lists silences.
    ///
    /// # Errors
    ///
    /// Returns validation errors for bad paging, and store, timeout, or
    /// cancellation errors.
    pub async fn list_silences(&self, ctx: &QueryContext, query: SilenceQuery) -> Result<SilencePage> {
        ctx.bounded("list_silences", self.silencer.list_silences(query))
            .await
    }

    // ============ Inhibition Introspection ============

    /// Lists active inhibitions, oldest first.
    ///
    /// # Errors
    ///
    /// Returns store, timeout, or cancellation errors.
    pub async fn get_active_inhibitions(&self, ctx: &QueryContext) -> Result<Vec<InhibitionState>> {
        ctx.bounded("get_active_inhibitions", self.tracker().get_active_inhibitions())
            .await
    }

    /// Returns true if a target has a recorded inhibition.
    ///
    /// # Errors
    ///
    /// Returns store, timeout, or cancellation errors.
    pub async fn is_inhibited(&self, ctx: &QueryContext, target_fingerprint: &str) -> Result<bool> {
        ctx.bounded("is_inhibited", self.tracker().is_inhibited(target_fingerprint))
            .await
    }

    /// Returns the inhibition on a target, if any.
    ///
    /// # Errors
    ///
    /// Returns store, timeout, or cancellation errors.
    pub async fn get_inhibition_state(
        &self,
        ctx: &QueryContext,
        target_fingerprint: &str,
    ) -> Result<Option<InhibitionState>> {
        ctx.bounded(
            "get_inhibition_state",
            self.tracker().get_inhibition_state(target_fingerprint),
        )
        .await
    }

    /// Removes the inhibition on a target.
    ///
    /// # Errors
    ///
    /// Returns store, timeout, or cancellation errors.
    pub async fn remove_inhibition(
        &self,
        ctx: &QueryContext,
        target_fingerprint: &str,
    ) -> Result<Option<InhibitionState>> {
        ctx.bounded(
            "remove_inhibition",
            self.tracker().remove_inhibition(target_fingerprint),
        )
        .await
    }
}
