//! The inhibition half of the suppression query.

use std::borrow::Cow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::rules::{InhibitionRule, RuleSet, SharedRules};
use crate::store::StateStore;
use crate::tracker::{InhibitionState, SuppressionStateTracker};
use crate::types::Alert;

/// Evidence for an inhibition: the source alert and the rule that matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InhibitionMatch {
    /// The firing alert causing the inhibition.
    pub source: Alert,
    /// The rule that matched.
    pub rule: InhibitionRule,
}

/// Evaluates inhibition rules against the firing population and records
/// matches through the [`SuppressionStateTracker`].
#[derive(Clone)]
pub struct Inhibitor {
    rules: SharedRules,
    store: Arc<dyn StateStore>,
    tracker: SuppressionStateTracker,
}

impl std::fmt::Debug for Inhibitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inhibitor")
            .field("rules", &self.rules.snapshot().len())
            .finish_non_exhaustive()
    }
}

impl Inhibitor {
    /// Creates an inhibitor over `store` with the given rules.
    #[must_use]
    pub fn new(rules: SharedRules, store: Arc<dyn StateStore>) -> Self {
        let tracker = SuppressionStateTracker::new(Arc::clone(&store));
        Self {
            rules,
            store,
            tracker,
        }
    }

    /// The tracker recording this inhibitor's decisions.
    #[must_use]
    pub const fn tracker(&self) -> &SuppressionStateTracker {
        &self.tracker
    }

    /// The current rule set.
    #[must_use]
    pub fn rules(&self) -> Arc<RuleSet> {
        self.rules.snapshot()
    }

    /// Swaps in a new rule set. Evaluations already running keep the set
    /// they started with.
    pub fn reload_rules(&self, rules: RuleSet) {
        let count = rules.len();
        let previous = self.rules.replace(rules);
        info!(previous = previous.len(), current = count, "reloaded inhibition rules");
    }

    /// Decides whether `alert` is inhibited by a currently-firing alert.
    ///
    /// Rules are tried in configured order and the first match wins. A match
    /// is recorded as an [`InhibitionState`]; when nothing matches, any state
    /// left over for the alert is removed. Resolved alerts are never
    /// inhibited.
    ///
    /// This is the raw query: store errors propagate. The engine wraps it
    /// with the fail-open policy.
    ///
    /// # Errors
    ///
    /// Returns a store error if the firing population or the inhibition
    /// state could not be read or written.
    pub async fn should_inhibit(&self, alert: &Alert) -> Result<Option<InhibitionMatch>> {
        let target = if alert.fingerprint.is_empty() {
            Cow::Owned(alert.clone().normalized())
        } else {
            Cow::Borrowed(alert)
        };
        let rules = self.rules.snapshot();
        // Read before the population so a record written by a newer
        // evaluation is never mistaken for stale.
        let prior = self.tracker.get_inhibition_state(&target.fingerprint).await?;

        let found = if target.is_firing() && rules.could_inhibit(&target.labels) {
            let firing = self.store.firing_alerts().await?;
            rules
                .find_inhibitor(&target, &firing)
                .map(|(source, rule)| InhibitionMatch {
                    source: source.clone(),
                    rule: rule.clone(),
                })
        } else {
            None
        };

        match &found {
            Some(m) => {
                self.tracker
                    .record_inhibition(InhibitionState::new(
                        &target.fingerprint,
                        &m.source.fingerprint,
                        &m.rule.name,
                    ))
                    .await?;
                debug!(
                    fingerprint = %target.fingerprint,
                    source = %m.source.fingerprint,
                    rule = %m.rule.name,
                    "alert inhibited"
                );
            }
            None => {
                if let Some(prior) = &prior {
                    self.tracker.remove_inhibition_if(prior).await?;
                }
                debug!(fingerprint = %target.fingerprint, "alert not inhibited");
            }
        }
        Ok(found)
    }
}
