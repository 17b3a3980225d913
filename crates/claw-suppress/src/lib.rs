//! Alert suppression engine (silences and inhibition rules) for Clawbernetes.
//!
//! `claw-suppress` decides, for every incoming alert, whether it is currently
//! suppressed and by what. Two independent mechanisms contribute:
//!
//! - **Silences**: operator-defined, time-bounded label predicates. Only
//!   silences whose window contains the current instant suppress.
//! - **Inhibition rules**: static rules that suppress a *target* alert while
//!   a correlated *source* alert is firing, with required label equality.
//!
//! Suppression queries fail open. A store fault, missed deadline, or
//! cancellation produces a "not suppressed" verdict with the error attached,
//! never a hidden alert.
//!
//! # Example
//!
//! ```rust
//! use claw_suppress::{
//!     Alert, EngineConfig, InhibitionRule, Matcher, MemoryStore, NewSilence, RuleSet,
//!     SuppressionEngine,
//! };
//! use chrono::{Duration, Utc};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let rules = RuleSet::new(vec![
//!     InhibitionRule::new("node-down")
//!         .source("alertname", "NodeDown")
//!         .target("alertname", "InstanceDown")
//!         .equal("node"),
//! ])
//! .unwrap();
//! let engine = SuppressionEngine::new(Arc::new(MemoryStore::new()), rules, &EngineConfig::default());
//!
//! // Silence HighCPU for the next two hours
//! let request = NewSilence::new(
//!     vec![Matcher::equal("alertname", "HighCPU").unwrap()],
//!     Utc::now() + Duration::hours(2),
//!     "ops@example.com",
//!     "kernel upgrade",
//! );
//! engine.create_silence(&engine.admin_context(), request).await.unwrap();
//!
//! // NodeDown on n1 inhibits InstanceDown on n1
//! let ctx = engine.query_context();
//! engine
//!     .observe_alert(&ctx, Alert::from_pairs([("alertname", "NodeDown"), ("node", "n1")]))
//!     .await
//!     .unwrap();
//!
//! let cpu = Alert::from_pairs([("alertname", "HighCPU"), ("instance", "a")]);
//! assert!(engine.evaluate(&ctx, &cpu).await.silence.silenced);
//!
//! let instance = Alert::from_pairs([("alertname", "InstanceDown"), ("node", "n1")]);
//! assert!(engine.evaluate(&ctx, &instance).await.inhibition.inhibited);
//! # }
//! ```
//!
//! # Rule order
//!
//! Inhibition rules are evaluated in configured order and the first rule
//! with a matching firing source wins. Each target carries at most one
//! [`InhibitionState`]; candidate sources are tried in fingerprint order so
//! the recorded source is deterministic.

#![forbid(unsafe_code)]
#![doc(html_root_url = "https://docs.rs/claw-suppress/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod inhibitor;
pub mod matcher;
mod persist;
pub mod rules;
pub mod silence;
pub mod silencer;
pub mod store;
pub mod tracker;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use config::EngineConfig;
pub use engine::{
    EngineStats, InhibitVerdict, QueryContext, SilenceVerdict, Suppression, SuppressionEngine,
};
pub use error::{Result, SuppressError};
pub use inhibitor::{InhibitionMatch, Inhibitor};
pub use matcher::{MatchOperator, Matcher, match_all, matches};
pub use rules::{InhibitionRule, RuleSet, SharedRules};
pub use silence::{
    NewSilence, Silence, SilenceFilter, SilencePage, SilenceQuery, SilenceSort, SilenceStatus,
    SilenceUpdate, SortField,
};
pub use silencer::Silencer;
pub use store::{MemoryStore, Resolution, StateStore};
pub use tracker::{InhibitionState, SuppressionStateTracker};
pub use types::{Alert, AlertStatus, Labels, fingerprint};
