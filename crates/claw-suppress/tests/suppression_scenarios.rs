//! End-to-end suppression scenarios against the public engine API.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use claw_suppress::{
    Alert, EngineConfig, InhibitionRule, InhibitionState, Matcher, MemoryStore, NewSilence,
    QueryContext, Resolution, Result, RuleSet, Silence, StateStore, SuppressError,
    SuppressionEngine,
};
use uuid::Uuid;

fn node_down_rule() -> InhibitionRule {
    InhibitionRule::new("node-down")
        .source("alertname", "NodeDown")
        .target("alertname", "InstanceDown")
        .equal("node")
}

fn engine_over(store: Arc<dyn StateStore>, rules: Vec<InhibitionRule>) -> SuppressionEngine {
    SuppressionEngine::new(store, RuleSet::new(rules).unwrap(), &EngineConfig::default())
}

fn engine(rules: Vec<InhibitionRule>) -> SuppressionEngine {
    engine_over(Arc::new(MemoryStore::new()), rules)
}

fn silence_for(matcher: Matcher) -> NewSilence {
    let now = Utc::now();
    NewSilence::new(
        vec![matcher],
        now + ChronoDuration::hours(1),
        "oncall@example.com",
        "scheduled maintenance",
    )
    .starting_at(now - ChronoDuration::hours(1))
}

/// A store whose every call fails.
struct FailingStore;

#[async_trait]
impl StateStore for FailingStore {
    async fn put_silence(&self, _silence: Silence) -> Result<()> {
        Err(SuppressError::state_store("backend unavailable"))
    }
    async fn get_silence(&self, _id: Uuid) -> Result<Option<Silence>> {
        Err(SuppressError::state_store("backend unavailable"))
    }
    async fn delete_silence(&self, _id: Uuid) -> Result<bool> {
        Err(SuppressError::state_store("backend unavailable"))
    }
    async fn list_silences(&self, _created_by: Option<&str>) -> Result<Vec<Silence>> {
        Err(SuppressError::state_store("backend unavailable"))
    }
    async fn upsert_alert(&self, _alert: Alert) -> Result<()> {
        Err(SuppressError::state_store("backend unavailable"))
    }
    async fn remove_alert(&self, _fingerprint: &str) -> Result<Option<Alert>> {
        Err(SuppressError::state_store("backend unavailable"))
    }
    async fn firing_alerts(&self) -> Result<Vec<Alert>> {
        Err(SuppressError::state_store("backend unavailable"))
    }
    async fn record_inhibition(&self, _state: InhibitionState) -> Result<bool> {
        Err(SuppressError::state_store("backend unavailable"))
    }
    async fn remove_inhibition(&self, _target: &str) -> Result<Option<InhibitionState>> {
        Err(SuppressError::state_store("backend unavailable"))
    }
    async fn remove_inhibition_if(&self, _expected: &InhibitionState) -> Result<bool> {
        Err(SuppressError::state_store("backend unavailable"))
    }
    async fn resolve_alert(&self, _fingerprint: &str) -> Result<Resolution> {
        Err(SuppressError::state_store("backend unavailable"))
    }
    async fn remove_inhibitions_by_source(&self, _source: &str) -> Result<Vec<InhibitionState>> {
        Err(SuppressError::state_store("backend unavailable"))
    }
    async fn get_inhibition(&self, _target: &str) -> Result<Option<InhibitionState>> {
        Err(SuppressError::state_store("backend unavailable"))
    }
    async fn list_inhibitions(&self) -> Result<Vec<InhibitionState>> {
        Err(SuppressError::state_store("backend unavailable"))
    }
}

/// A store that stalls reads and alert resolution before delegating to a
/// [`MemoryStore`].
struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

#[async_trait]
impl StateStore for SlowStore {
    async fn put_silence(&self, silence: Silence) -> Result<()> {
        self.inner.put_silence(silence).await
    }
    async fn get_silence(&self, id: Uuid) -> Result<Option<Silence>> {
        self.inner.get_silence(id).await
    }
    async fn delete_silence(&self, id: Uuid) -> Result<bool> {
        self.inner.delete_silence(id).await
    }
    async fn list_silences(&self, created_by: Option<&str>) -> Result<Vec<Silence>> {
        tokio::time::sleep(self.delay).await;
        self.inner.list_silences(created_by).await
    }
    async fn unexpired_silences(&self, now: DateTime<Utc>) -> Result<Vec<Silence>> {
        tokio::time::sleep(self.delay).await;
        self.inner.unexpired_silences(now).await
    }
    async fn upsert_alert(&self, alert: Alert) -> Result<()> {
        self.inner.upsert_alert(alert).await
    }
    async fn remove_alert(&self, fingerprint: &str) -> Result<Option<Alert>> {
        self.inner.remove_alert(fingerprint).await
    }
    async fn firing_alerts(&self) -> Result<Vec<Alert>> {
        tokio::time::sleep(self.delay).await;
        self.inner.firing_alerts().await
    }
    async fn record_inhibition(&self, state: InhibitionState) -> Result<bool> {
        self.inner.record_inhibition(state).await
    }
    async fn remove_inhibition(&self, target: &str) -> Result<Option<InhibitionState>> {
        self.inner.remove_inhibition(target).await
    }
    async fn remove_inhibition_if(&self, expected: &InhibitionState) -> Result<bool> {
        self.inner.remove_inhibition_if(expected).await
    }
    async fn resolve_alert(&self, fingerprint: &str) -> Result<Resolution> {
        tokio::time::sleep(self.delay).await;
        self.inner.resolve_alert(fingerprint).await
    }
    async fn remove_inhibitions_by_source(&self, source: &str) -> Result<Vec<InhibitionState>> {
        self.inner.remove_inhibitions_by_source(source).await
    }
    async fn get_inhibition(&self, target: &str) -> Result<Option<InhibitionState>> {
        self.inner.get_inhibition(target).await
    }
    async fn list_inhibitions(&self) -> Result<Vec<InhibitionState>> {
        self.inner.list_inhibitions().await
    }
}

/// A store whose next `firing_alerts` call returns the population as it was
/// when the call started, after a delay.
struct LaggingStore {
    inner: MemoryStore,
    lag_next: AtomicBool,
    delay: Duration,
}

#[async_trait]
impl StateStore for LaggingStore {
    async fn put_silence(&self, silence: Silence) -> Result<()> {
        self.inner.put_silence(silence).await
    }
    async fn get_silence(&self, id: Uuid) -> Result<Option<Silence>> {
        self.inner.get_silence(id).await
    }
    async fn delete_silence(&self, id: Uuid) -> Result<bool> {
        self.inner.delete_silence(id).await
    }
    async fn list_silences(&self, created_by: Option<&str>) -> Result<Vec<Silence>> {
        self.inner.list_silences(created_by).await
    }
    async fn upsert_alert(&self, alert: Alert) -> Result<()> {
        self.inner.upsert_alert(alert).await
    }
    async fn remove_alert(&self, fingerprint: &str) -> Result<Option<Alert>> {
        self.inner.remove_alert(fingerprint).await
    }
    async fn firing_alerts(&self) -> Result<Vec<Alert>> {
        let population = self.inner.firing_alerts().await?;
        if self.lag_next.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(self.delay).await;
        }
        Ok(population)
    }
    async fn record_inhibition(&self, state: InhibitionState) -> Result<bool> {
        self.inner.record_inhibition(state).await
    }
    async fn remove_inhibition(&self, target: &str) -> Result<Option<InhibitionState>> {
        self.inner.remove_inhibition(target).await
    }
    async fn remove_inhibition_if(&self, expected: &InhibitionState) -> Result<bool> {
        self.inner.remove_inhibition_if(expected).await
    }
    async fn resolve_alert(&self, fingerprint: &str) -> Result<Resolution> {
        self.inner.resolve_alert(fingerprint).await
    }
    async fn remove_inhibitions_by_source(&self, source: &str) -> Result<Vec<InhibitionState>> {
        self.inner.remove_inhibitions_by_source(source).await
    }
    async fn get_inhibition(&self, target: &str) -> Result<Option<InhibitionState>> {
        self.inner.get_inhibition(target).await
    }
    async fn list_inhibitions(&self) -> Result<Vec<InhibitionState>> {
        self.inner.list_inhibitions().await
    }
}

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn silence_by_alertname() {
        let engine = engine(Vec::new());
        let created = engine
            .create_silence(
                &engine.admin_context(),
                silence_for(Matcher::equal("alertname", "HighCPU").unwrap()),
            )
            .await
            .unwrap();

        let ctx = engine.query_context();
        let cpu = Alert::from_pairs([("alertname", "HighCPU"), ("instance", "a")]);
        let verdict = engine.is_alert_silenced(&ctx, &cpu).await;
        assert!(verdict.silenced);
        assert_eq!(verdict.silence_ids, vec![created.id]);

        let mem = Alert::from_pairs([("alertname", "HighMem")]);
        assert!(!engine.is_alert_silenced(&ctx, &mem).await.silenced);
    }

    #[tokio::test]
    async fn inhibition_requires_equal_node() {
        let engine = engine(vec![node_down_rule()]);
        let ctx = engine.query_context();
        let source = Alert::from_pairs([("alertname", "NodeDown"), ("node", "n1")]);
        engine.observe_alert(&ctx, source.clone()).await.unwrap();

        let same_node = Alert::from_pairs([("alertname", "InstanceDown"), ("node", "n1")]);
        let verdict = engine.should_inhibit(&ctx, &same_node).await;
        assert!(verdict.inhibited);
        assert_eq!(verdict.source.as_ref().map(|a| a.fingerprint.as_str()), Some(source.fingerprint.as_str()));
        assert_eq!(verdict.rule.as_ref().map(|r| r.name.as_str()), Some("node-down"));

        let other_node = Alert::from_pairs([("alertname", "InstanceDown"), ("node", "n2")]);
        let verdict = engine.should_inhibit(&ctx, &other_node).await;
        assert!(!verdict.inhibited);
        assert!(verdict.error.is_none());
    }

    #[tokio::test]
    async fn regex_silence_by_severity() {
        let engine = engine(Vec::new());
        engine
            .create_silence(
                &engine.admin_context(),
                silence_for(Matcher::regex("severity", "critical|warning").unwrap()),
            )
            .await
            .unwrap();

        let ctx = engine.query_context();
        for (severity, silenced) in [("critical", true), ("warning", true), ("info", false)] {
            let alert = Alert::from_pairs([("alertname", "Disk"), ("severity", severity)]);
            assert_eq!(
                engine.is_alert_silenced(&ctx, &alert).await.silenced,
                silenced,
                "severity={severity}"
            );
        }
    }

    #[tokio::test]
    async fn deleted_silence_is_visible_immediately() {
        let engine = engine(Vec::new());
        let admin = engine.admin_context();
        let created = engine
            .create_silence(&admin, silence_for(Matcher::equal("alertname", "HighCPU").unwrap()))
            .await
            .unwrap();

        let alert = Alert::from_pairs([("alertname", "HighCPU")]);
        assert!(engine.is_alert_silenced(&engine.query_context(), &alert).await.silenced);

        engine.delete_silence(&admin, &created.id.to_string()).await.unwrap();
        assert!(!engine.is_alert_silenced(&engine.query_context(), &alert).await.silenced);
    }

    #[tokio::test]
    async fn pending_silence_does_not_suppress() {
        let engine = engine(Vec::new());
        let now = Utc::now();
        let request = NewSilence::new(
            vec![Matcher::equal("alertname", "HighCPU").unwrap()],
            now + ChronoDuration::hours(2),
            "oncall@example.com",
            "tomorrow's window",
        )
        .starting_at(now + ChronoDuration::hours(1));
        engine.create_silence(&engine.admin_context(), request).await.unwrap();

        let alert = Alert::from_pairs([("alertname", "HighCPU")]);
        assert!(!engine.is_alert_silenced(&engine.query_context(), &alert).await.silenced);
    }
}

mod self_inhibition {
    use super::*;

    fn overlapping_rule() -> InhibitionRule {
        InhibitionRule::new("same-cluster")
            .source("cluster", "prod")
            .target("cluster", "prod")
            .equal("cluster")
    }

    #[tokio::test]
    async fn lone_alert_never_inhibits_itself() {
        let engine = engine(vec![overlapping_rule()]);
        let ctx = engine.query_context();
        let alert = Alert::from_pairs([("alertname", "Latency"), ("cluster", "prod")]);
        engine.observe_alert(&ctx, alert.clone()).await.unwrap();

        assert!(!engine.should_inhibit(&ctx, &alert).await.inhibited);
        assert!(engine.get_active_inhibitions(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn another_source_still_inhibits() {
        let engine = engine(vec![overlapping_rule()]);
        let ctx = engine.query_context();
        let a = Alert::from_pairs([("alertname", "Latency"), ("cluster", "prod")]);
        let b = Alert::from_pairs([("alertname", "Errors"), ("cluster", "prod")]);
        engine.observe_alert(&ctx, a.clone()).await.unwrap();
        engine.observe_alert(&ctx, b.clone()).await.unwrap();

        let verdict = engine.should_inhibit(&ctx, &a).await;
        assert!(verdict.inhibited);
        assert_eq!(verdict.source.map(|s| s.fingerprint), Some(b.fingerprint));
    }
}

mod fail_open {
    use super::*;

    #[tokio::test]
    async fn store_errors_never_suppress() {
        let engine = engine_over(Arc::new(FailingStore), vec![node_down_rule()]);
        let ctx = engine.query_context();
        let alert = Alert::from_pairs([("alertname", "InstanceDown"), ("node", "n1")]);

        let suppression = engine.evaluate(&ctx, &alert).await;
        assert!(!suppression.is_suppressed());
        assert!(matches!(suppression.silence.error, Some(SuppressError::StateStore { .. })));
        assert!(matches!(suppression.inhibition.error, Some(SuppressError::StateStore { .. })));

        let stats = engine.stats();
        assert_eq!(stats.silence_failures, 1);
        assert_eq!(stats.inhibition_failures, 1);
    }

    #[tokio::test]
    async fn admin_writes_surface_store_errors() {
        let engine = engine_over(Arc::new(FailingStore), Vec::new());
        let err = engine
            .create_silence(
                &engine.admin_context(),
                silence_for(Matcher::equal("alertname", "HighCPU").unwrap()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SuppressError::StateStore { .. }));
    }

    #[tokio::test]
    async fn validation_errors_are_verbatim() {
        let engine = engine(Vec::new());
        let mut request = silence_for(Matcher::equal("alertname", "HighCPU").unwrap());
        request.comment = "x".to_string();
        let err = engine
            .create_silence(&engine.admin_context(), request)
            .await
            .unwrap_err();
        assert!(matches!(err, SuppressError::Validation { ref field, .. } if field == "comment"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out_open() {
        let inner = MemoryStore::new();
        let store = Arc::new(SlowStore {
            inner,
            delay: Duration::from_secs(30),
        });
        let engine = engine_over(store, vec![node_down_rule()]);
        engine
            .create_silence(
                &engine.admin_context(),
                silence_for(Matcher::equal("alertname", "InstanceDown").unwrap()),
            )
            .await
            .unwrap();

        let alert = Alert::from_pairs([("alertname", "InstanceDown"), ("node", "n1")]);
        let suppression = engine.evaluate(&engine.query_context(), &alert).await;
        assert!(!suppression.is_suppressed());
        assert!(matches!(suppression.silence.error, Some(SuppressError::Timeout { .. })));
        assert!(matches!(suppression.inhibition.error, Some(SuppressError::Timeout { .. })));
        assert_eq!(engine.stats().timeouts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_check_records_nothing() {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            delay: Duration::from_secs(30),
        });
        let engine = engine_over(store.clone(), vec![node_down_rule()]);
        let source = Alert::from_pairs([("alertname", "NodeDown"), ("node", "n1")]);
        store.upsert_alert(source).await.unwrap();

        let target = Alert::from_pairs([("alertname", "InstanceDown"), ("node", "n1")]);
        assert!(!engine.should_inhibit(&engine.query_context(), &target).await.inhibited);
        assert!(store.list_inhibitions().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_resolve_leaves_state_whole() {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            delay: Duration::from_secs(30),
        });
        let engine = engine_over(store.clone(), vec![node_down_rule()]);
        let patient = QueryContext::with_timeout(Duration::from_secs(120));
        let source = Alert::from_pairs([("alertname", "NodeDown"), ("node", "n1")]);
        let target = Alert::from_pairs([("alertname", "InstanceDown"), ("node", "n1")]);
        engine.observe_alert(&patient, source.clone()).await.unwrap();
        assert!(engine.should_inhibit(&patient, &target).await.inhibited);

        let err = engine
            .observe_alert(&engine.query_context(), source.clone().resolved())
            .await
            .unwrap_err();
        assert!(matches!(err, SuppressError::Timeout { .. }));
        assert_eq!(store.inner.firing_alerts().await.unwrap(), vec![source.clone()]);
        assert!(store.inner.get_inhibition(&target.fingerprint).await.unwrap().is_some());

        engine.observe_alert(&patient, source.resolved()).await.unwrap();
        assert!(store.inner.firing_alerts().await.unwrap().is_empty());
        assert!(store.inner.list_inhibitions().await.unwrap().is_empty());
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checks_record_one_state() {
        let engine = engine(vec![node_down_rule()]);
        let ctx = engine.query_context();
        engine
            .observe_alert(&ctx, Alert::from_pairs([("alertname", "NodeDown"), ("node", "n1")]))
            .await
            .unwrap();
        let target = Alert::from_pairs([("alertname", "InstanceDown"), ("node", "n1")]);

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let engine = engine.clone();
                let target = target.clone();
                tokio::spawn(async move {
                    let ctx = engine.query_context();
                    engine.should_inhibit(&ctx, &target).await.inhibited
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let states = engine.get_active_inhibitions(&ctx).await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].target_fingerprint, target.fingerprint);
    }

    #[tokio::test(start_paused = true)]
    async fn outdated_check_keeps_newer_inhibition() {
        let store = Arc::new(LaggingStore {
            inner: MemoryStore::new(),
            lag_next: AtomicBool::new(true),
            delay: Duration::from_millis(100),
        });
        let engine = engine_over(store, vec![node_down_rule()]);
        let ctx = QueryContext::with_timeout(Duration::from_secs(5));
        let source = Alert::from_pairs([("alertname", "NodeDown"), ("node", "n1")]);
        let target = Alert::from_pairs([("alertname", "InstanceDown"), ("node", "n1")]);

        // The first check reads an empty population and finishes last.
        let (outdated, current) = tokio::join!(engine.should_inhibit(&ctx, &target), async {
            engine.observe_alert(&ctx, source.clone()).await.unwrap();
            engine.should_inhibit(&ctx, &target).await
        });
        assert!(!outdated.inhibited);
        assert!(current.inhibited);

        let state = engine
            .get_inhibition_state(&ctx, &target.fingerprint)
            .await
            .unwrap()
            .expect("inhibition kept");
        assert_eq!(state.source_fingerprint, source.fingerprint);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn admin_writes_do_not_block_queries() {
        let engine = engine(Vec::new());
        let writer = {
            let engine = engine.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    let request = silence_for(Matcher::equal("job", format!("batch-{i}")).unwrap());
                    engine.create_silence(&engine.admin_context(), request).await.unwrap();
                }
            })
        };

        let alert = Alert::from_pairs([("alertname", "HighCPU"), ("job", "api")]);
        for _ in 0..50 {
            let verdict = engine.is_alert_silenced(&engine.query_context(), &alert).await;
            assert!(!verdict.silenced);
            assert!(verdict.error.is_none());
        }
        writer.await.unwrap();
        assert_eq!(engine.stats().silence_failures, 0);
    }
}

mod restart {
    use super::*;

    #[tokio::test]
    async fn state_survives_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = EngineConfig {
            state_dir: Some(dir.path().to_path_buf()),
            inhibit_rules: vec![node_down_rule()],
            ..EngineConfig::default()
        };

        let target = Alert::from_pairs([("alertname", "InstanceDown"), ("node", "n1")]);
        let silence_id = {
            let engine = SuppressionEngine::from_config(&config).unwrap();
            let ctx = engine.query_context();
            engine
                .observe_alert(&ctx, Alert::from_pairs([("alertname", "NodeDown"), ("node", "n1")]))
                .await
                .unwrap();
            assert!(engine.should_inhibit(&ctx, &target).await.inhibited);
            engine
                .create_silence(
                    &engine.admin_context(),
                    silence_for(Matcher::regex("severity", "critical|warning").unwrap()),
                )
                .await
                .unwrap()
                .id
        };

        let engine = SuppressionEngine::from_config(&config).unwrap();
        let ctx = engine.query_context();

        let state = engine
            .get_inhibition_state(&ctx, &target.fingerprint)
            .await
            .unwrap()
            .expect("inhibition restored");
        assert_eq!(state.rule_name, "node-down");

        let alert = Alert::from_pairs([("alertname", "Disk"), ("severity", "warning")]);
        let verdict = engine.is_alert_silenced(&ctx, &alert).await;
        assert_eq!(verdict.silence_ids, vec![silence_id]);
    }
}
