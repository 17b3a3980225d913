//! Inhibition rules.
//!
//! An [`InhibitionRule`] suppresses a *target* alert while a correlated
//! *source* alert is firing. Rules are static configuration held in an
//! immutable [`RuleSet`]; [`SharedRules`] swaps whole sets so readers never
//! observe a partially-applied reload.
//!
//! Rule order matters: when several rules could inhibit the same target, the
//! first rule in configured order wins.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SuppressError};
use crate::matcher::{Matcher, match_all};
use crate::types::{Alert, Labels};
use crate::validation::validate_label_name;

/// A static inhibition rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InhibitionRule {
    /// Unique rule name, recorded as evidence.
    pub name: String,
    /// Labels a source alert must carry with exactly these values.
    #[serde(default)]
    pub source_match: HashMap<String, String>,
    /// Additional matchers a source alert must satisfy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_matchers: Vec<Matcher>,
    /// Labels a target alert must carry with exactly these values.
    #[serde(default)]
    pub target_match: HashMap<String, String>,
    /// Additional matchers a target alert must satisfy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_matchers: Vec<Matcher>,
    /// Labels whose values must be present and identical on source and target.
    #[serde(default)]
    pub equal: Vec<String>,
}

impl InhibitionRule {
    /// Creates a rule with no conditions; add them with the builder methods.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_match: HashMap::new(),
            source_matchers: Vec::new(),
            target_match: HashMap::new(),
            target_matchers: Vec::new(),
            equal: Vec::new(),
        }
    }

    /// Requires the source to carry `name=value`.
    #[must_use]
    pub fn source(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.source_match.insert(name.into(), value.into());
        self
    }

    /// Requires the target to carry `name=value`.
    #[must_use]
    pub fn target(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.target_match.insert(name.into(), value.into());
        self
    }

    /// Adds a source matcher.
    #[must_use]
    pub fn source_matcher(mut self, matcher: Matcher) -> Self {
        self.source_matchers.push(matcher);
        self
    }

    /// Adds a target matcher.
    #[must_use]
    pub fn target_matcher(mut self, matcher: Matcher) -> Self {
        self.target_matchers.push(matcher);
        self
    }

    /// Requires `label` to be equal on source and target.
    #[must_use]
    pub fn equal(mut self, label: impl Into<String>) -> Self {
        self.equal.push(label.into());
        self
    }

    /// Checks that the rule is usable.
    ///
    /// # Errors
    ///
    /// Returns `SuppressError::InvalidConfig` if the name is empty, either
    /// side has no conditions, or a label name is malformed.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| SuppressError::InvalidConfig {
            reason: format!("inhibition rule '{}': {reason}", self.name),
        };

        if self.name.trim().is_empty() {
            return Err(SuppressError::InvalidConfig {
                reason: "inhibition rule name cannot be empty".to_string(),
            });
        }
        if self.source_match.is_empty() && self.source_matchers.is_empty() {
            return Err(invalid("source conditions cannot be empty".to_string()));
        }
        if self.target_match.is_empty() && self.target_matchers.is_empty() {
            return Err(invalid("target conditions cannot be empty".to_string()));
        }
        for name in self
            .source_match
            .keys()
            .chain(self.target_match.keys())
            .chain(self.equal.iter())
        {
            validate_label_name("label", name).map_err(|e| invalid(e.to_string()))?;
        }
        Ok(())
    }

    /// Returns true if `labels` satisfy the target conditions.
    #[must_use]
    pub fn matches_target(&self, labels: &Labels) -> bool {
        contains_all(labels, &self.target_match) && match_all(&self.target_matchers, labels)
    }

    /// Returns true if `labels` satisfy the source conditions.
    #[must_use]
    pub fn matches_source(&self, labels: &Labels) -> bool {
        contains_all(labels, &self.source_match) && match_all(&self.source_matchers, labels)
    }

    /// Returns true if every `equal` label is present on both sides with the
    /// same value. Absence on either side is a mismatch.
    #[must_use]
    pub fn equal_labels_match(&self, source: &Labels, target: &Labels) -> bool {
        self.equal.iter().all(|name| match (source.get(name), target.get(name)) {
            (Some(s), Some(t)) => s == t,
            _ => false,
        })
    }

    /// Returns true if `source` inhibits `target` under this rule.
    ///
    /// An alert never inhibits itself.
    #[must_use]
    pub fn inhibits(&self, source: &Alert, target: &Alert) -> bool {
        source.fingerprint != target.fingerprint
            && source.is_firing()
            && self.matches_source(&source.labels)
            && self.equal_labels_match(&source.labels, &target.labels)
    }
}

fn contains_all(labels: &Labels, required: &HashMap<String, String>) -> bool {
    required
        .iter()
        .all(|(name, value)| labels.get(name) == Some(value))
}

/// An immutable, ordered collection of validated rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<InhibitionRule>,
}

impl RuleSet {
    /// Validates and wraps `rules`, preserving order.
    ///
    /// # Errors
    ///
    /// Returns `SuppressError::InvalidConfig` if a rule is invalid or two
    /// rules share a name.
    pub fn new(rules: Vec<InhibitionRule>) -> Result<Self> {
        let mut names = HashSet::new();
        for rule in &rules {
            rule.validate()?;
            if !names.insert(rule.name.as_str()) {
                return Err(SuppressError::InvalidConfig {
                    reason: format!("duplicate inhibition rule name '{}'", rule.name),
                });
            }
        }
        Ok(Self { rules })
    }

    /// The rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[InhibitionRule] {
        &self.rules
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns true if some rule's target conditions accept `labels`.
    ///
    /// Lets callers skip reading the firing population for alerts no rule
    /// could ever inhibit.
    #[must_use]
    pub fn could_inhibit(&self, labels: &Labels) -> bool {
        self.rules.iter().any(|r| r.matches_target(labels))
    }

    /// Finds the first rule, in order, with a firing source that inhibits
    /// `target`. Candidate sources are tried in ascending fingerprint order.
    #[must_use]
    pub fn find_inhibitor<'a>(
        &'a self,
        target: &Alert,
        firing: &'a [Alert],
    ) -> Option<(&'a Alert, &'a InhibitionRule)> {
        let mut candidates: Vec<&Alert> = firing.iter().collect();
        candidates.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));

        self.rules
            .iter()
            .filter(|rule| rule.matches_target(&target.labels))
            .find_map(|rule| {
                candidates
                    .iter()
                    .find(|source| rule.inhibits(source, target))
                    .map(|source| (*source, rule))
            })
    }
}

/// A rule set shared between concurrent evaluators.
///
/// Readers clone an `Arc` under a momentary read lock and evaluate against
/// that snapshot; [`SharedRules::replace`] swaps the pointer.
#[derive(Debug, Clone, Default)]
pub struct SharedRules {
    current: Arc<RwLock<Arc<RuleSet>>>,
}

impl SharedRules {
    /// Wraps an initial rule set.
    #[must_use]
    pub fn new(rules: RuleSet) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(rules))),
        }
    }

    /// Returns the current rule set.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.current.read())
    }

    /// Atomically replaces the rule set, returning the previous one.
    pub fn replace(&self, rules: RuleSet) -> Arc<RuleSet> {
        let next = Arc::new(rules);
        std::mem::replace(&mut *self.current.write(), next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_down_rule() -> InhibitionRule {
        InhibitionRule::new("node-down-inhibits-instance-down")
            .source("alertname", "NodeDown")
            .target("alertname", "InstanceDown")
            .equal("node")
    }

    mod validate_tests {
        use super::*;

        #[test]
        fn valid_rule() {
            assert!(node_down_rule().validate().is_ok());
        }

        #[test]
        fn empty_name_rejected() {
            let rule = InhibitionRule::new(" ").source("a", "b").target("c", "d");
            assert!(matches!(rule.validate(), Err(SuppressError::InvalidConfig { .. })));
        }

        #[test]
        fn missing_sides_rejected() {
            assert!(InhibitionRule::new("r").target("a", "b").validate().is_err());
            assert!(InhibitionRule::new("r").source("a", "b").validate().is_err());
        }

        #[test]
        fn matchers_satisfy_side_requirement() {
            let rule = InhibitionRule::new("r")
                .source_matcher(Matcher::regex("severity", "critical").unwrap())
                .target_matcher(Matcher::regex("severity", "warning|info").unwrap());
            assert!(rule.validate().is_ok());
        }

        #[test]
        fn bad_equal_label_rejected() {
            let rule = node_down_rule().equal("not-a-label");
            assert!(rule.validate().is_err());
        }

        #[test]
        fn duplicate_names_rejected() {
            let err = RuleSet::new(vec![node_down_rule(), node_down_rule()]).unwrap_err();
            assert!(err.to_string().contains("duplicate"));
        }

        #[test]
        fn rule_deserializes_without_matchers() {
            let json = r#"{
                "name": "r",
                "source_match": {"alertname": "NodeDown"},
                "target_match": {"alertname": "InstanceDown"},
                "equal": ["node"]
            }"#;
            let rule: InhibitionRule = serde_json::from_str(json).unwrap();
            let expected = InhibitionRule::new("r")
                .source("alertname", "NodeDown")
                .target("alertname", "InstanceDown")
                .equal("node");
            assert_eq!(rule, expected);
        }
    }

    mod match_tests {
        use super::*;

        #[test]
        fn node_scenario() {
            let rules = RuleSet::new(vec![node_down_rule()]).unwrap();
            let firing = vec![Alert::from_pairs([("alertname", "NodeDown"), ("node", "n1")])];

            let same_node = Alert::from_pairs([("alertname", "InstanceDown"), ("node", "n1")]);
            let (source, rule) = rules.find_inhibitor(&same_node, &firing).unwrap();
            assert_eq!(source.label("alertname"), Some("NodeDown"));
            assert_eq!(rule.name, "node-down-inhibits-instance-down");

            let other_node = Alert::from_pairs([("alertname", "InstanceDown"), ("node", "n2")]);
            assert!(rules.find_inhibitor(&other_node, &firing).is_none());
        }

        #[test]
        fn equal_label_absent_on_both_sides_is_mismatch() {
            let rules = RuleSet::new(vec![node_down_rule()]).unwrap();
            let firing = vec![Alert::from_pairs([("alertname", "NodeDown")])];
            let target = Alert::from_pairs([("alertname", "InstanceDown")]);
            assert!(rules.find_inhibitor(&target, &firing).is_none());
        }

        #[test]
        fn no_equal_labels_means_any_source() {
            let rule = InhibitionRule::new("r")
                .source("alertname", "ClusterDown")
                .target("severity", "warning");
            let rules = RuleSet::new(vec![rule]).unwrap();
            let firing = vec![Alert::from_pairs([("alertname", "ClusterDown")])];
            let target = Alert::from_pairs([("alertname", "Latency"), ("severity", "warning")]);
            assert!(rules.find_inhibitor(&target, &firing).is_some());
        }

        #[test]
        fn self_inhibition_prevented() {
            let rule = InhibitionRule::new("critical-inhibits-db")
                .source("severity", "critical")
                .target("service", "db")
                .equal("service");
            let rules = RuleSet::new(vec![rule]).unwrap();
            let alert = Alert::from_pairs([("severity", "critical"), ("service", "db")]);
            let firing = vec![alert.clone()];
            assert!(rules.find_inhibitor(&alert, &firing).is_none());

            let other = Alert::from_pairs([
                ("severity", "critical"),
                ("service", "db"),
                ("instance", "replica"),
            ]);
            let firing = vec![alert.clone(), other];
            let (source, _) = rules.find_inhibitor(&alert, &firing).unwrap();
            assert_ne!(source.fingerprint, alert.fingerprint);
        }

        #[test]
        fn resolved_sources_ignored() {
            let rules = RuleSet::new(vec![node_down_rule()]).unwrap();
            let firing = vec![Alert::from_pairs([("alertname", "NodeDown"), ("node", "n1")]).resolved()];
            let target = Alert::from_pairs([("alertname", "InstanceDown"), ("node", "n1")]);
            assert!(rules.find_inhibitor(&target, &firing).is_none());
        }

        #[test]
        fn first_rule_wins() {
            let first = InhibitionRule::new("first")
                .source("alertname", "NodeDown")
                .target("alertname", "InstanceDown");
            let second = InhibitionRule::new("second")
                .source("alertname", "RackDown")
                .target("alertname", "InstanceDown");
            let rules = RuleSet::new(vec![first, second]).unwrap();
            let firing = vec![
                Alert::from_pairs([("alertname", "RackDown")]),
                Alert::from_pairs([("alertname", "NodeDown")]),
            ];
            let target = Alert::from_pairs([("alertname", "InstanceDown")]);
            let (_, rule) = rules.find_inhibitor(&target, &firing).unwrap();
            assert_eq!(rule.name, "first");
        }

        #[test]
        fn source_choice_is_deterministic() {
            let rule = InhibitionRule::new("r")
                .source("alertname", "NodeDown")
                .target("alertname", "InstanceDown");
            let rules = RuleSet::new(vec![rule]).unwrap();
            let a = Alert::from_pairs([("alertname", "NodeDown"), ("node", "a")]);
            let b = Alert::from_pairs([("alertname", "NodeDown"), ("node", "b")]);
            let target = Alert::from_pairs([("alertname", "InstanceDown")]);

            let forward = vec![a.clone(), b.clone()];
            let backward = vec![b, a];
            let (s1, _) = rules.find_inhibitor(&target, &forward).unwrap();
            let (s2, _) = rules.find_inhibitor(&target, &backward).unwrap();
            assert_eq!(s1.fingerprint, s2.fingerprint);
        }

        #[test]
        fn target_matchers_apply() {
            let rule = InhibitionRule::new("critical-over-warning")
                .source("severity", "critical")
                .target_matcher(Matcher::regex("severity", "warning|info").unwrap())
                .equal("cluster");
            let rules = RuleSet::new(vec![rule]).unwrap();
            let firing = vec![Alert::from_pairs([("severity", "critical"), ("cluster", "c1")])];
            let warning = Alert::from_pairs([("severity", "warning"), ("cluster", "c1")]);
            let page = Alert::from_pairs([("severity", "page"), ("cluster", "c1")]);
            assert!(rules.find_inhibitor(&warning, &firing).is_some());
            assert!(rules.find_inhibitor(&page, &firing).is_none());
            assert!(rules.could_inhibit(&warning.labels));
            assert!(!rules.could_inhibit(&page.labels));
        }
    }

    mod shared_tests {
        use super::*;

        #[test]
        fn replace_swaps_whole_set() {
            let shared = SharedRules::new(RuleSet::new(vec![node_down_rule()]).unwrap());
            let before = shared.snapshot();
            assert_eq!(before.len(), 1);

            let previous = shared.replace(RuleSet::default());
            assert_eq!(previous.len(), 1);
            assert!(shared.snapshot().is_empty());
            // Readers holding the old snapshot keep a consistent view.
            assert_eq!(before.len(), 1);
        }

        #[test]
        fn clones_share_state() {
            let shared = SharedRules::default();
            let other = shared.clone();
            other.replace(RuleSet::new(vec![node_down_rule()]).unwrap());
            assert_eq!(shared.snapshot().len(), 1);
        }
    }
}
