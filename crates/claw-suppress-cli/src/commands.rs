//! Command implementations.
//!
//! Each invocation opens the engine over the state directory, runs one
//! command, and exits. State changes are persisted by the engine's store.

use std::io::Write;
use std::path::Path;

use chrono::Utc;
use claw_suppress::{
    Alert, AlertStatus, EngineConfig, NewSilence, SilenceFilter, SilenceQuery, SilenceSort, SilenceStatus,
    SilenceUpdate, SuppressionEngine,
};
use tracing::debug;

use crate::cli::{
    AddSilenceArgs, AlertCommands, Commands, ListSilencesArgs, SilenceCommands, UpdateSilenceArgs,
};
use crate::error::CliError;
use crate::output::{
    AlertList, CheckResult, InhibitionList, Message, OutputFormat, RuleList, SilenceDetail,
    SilenceList, StatsReport,
};

/// Opens the engine for a CLI invocation.
///
/// Configuration comes from `config_path` when given, and `state_dir`
/// always overrides the configured state directory.
///
/// # Errors
///
/// Returns an error if the configuration or persisted state cannot be loaded.
pub fn open_engine(
    config_path: Option<&Path>,
    state_dir: &Path,
) -> Result<SuppressionEngine, CliError> {
    let mut config = match config_path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    config.state_dir = Some(state_dir.to_path_buf());
    debug!(state_dir = %state_dir.display(), rules = config.inhibit_rules.len(), "opening engine");
    Ok(SuppressionEngine::from_config(&config)?)
}

/// Reads an alert given inline as JSON or as a path to a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the JSON is not an alert.
pub fn read_alert(input: &str) -> Result<Alert, CliError> {
    let trimmed = input.trim_start();
    let json = if trimmed.starts_with('{') {
        input.to_string()
    } else {
        std::fs::read_to_string(input)?
    };
    let alert: Alert = serde_json::from_str(&json)
        .map_err(|e| CliError::InvalidArgument(format!("invalid alert JSON: {e}")))?;
    if alert.labels.is_empty() {
        return Err(CliError::InvalidArgument("alert has no labels".to_string()));
    }
    Ok(alert.normalized())
}

/// Handler for all subcommands.
#[derive(Debug)]
pub struct SuppressCommand {
    engine: SuppressionEngine,
}

impl SuppressCommand {
    /// Creates a handler over `engine`.
    #[must_use]
    pub const fn new(engine: SuppressionEngine) -> Self {
        Self { engine }
    }

    /// Executes a command.
    ///
    /// # Errors
    ///
    /// Returns error if the command fails.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        command: &Commands,
    ) -> Result<(), CliError> {
        match command {
            Commands::Silence { command } => self.silence(out, format, command).await,
            Commands::Alert { command } => self.alert(out, format, command).await,
            Commands::Check { alert } => self.check(out, format, alert).await,
            Commands::Inhibitions => {
                let ctx = self.engine.admin_context();
                let states = self.engine.get_active_inhibitions(&ctx).await?;
                format.write(out, &InhibitionList(states))
            }
            Commands::Rules => {
                let rules = self.engine.rules().rules().to_vec();
                format.write(out, &RuleList(rules))
            }
            Commands::Stats => self.stats(out, format).await,
        }
    }

    async fn silence<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        command: &SilenceCommands,
    ) -> Result<(), CliError> {
        let ctx = self.engine.admin_context();
        match command {
            SilenceCommands::Add(args) => {
                let silence = self.engine.create_silence(&ctx, new_silence(args)?).await?;
                format.write(out, &SilenceDetail(silence))
            }
            SilenceCommands::List(args) => {
                let page = self.engine.list_silences(&ctx, list_query(args)).await?;
                format.write(out, &SilenceList(page))
            }
            SilenceCommands::Get { id } => {
                let silence = self.engine.get_silence(&ctx, id).await?;
                format.write(out, &SilenceDetail(silence))
            }
            SilenceCommands::Update(args) => {
                let silence = self
                    .engine
                    .update_silence(&ctx, &args.id, silence_update(args)?)
                    .await?;
                format.write(out, &SilenceDetail(silence))
            }
            SilenceCommands::Expire { id } => match self.engine.expire_silence(&ctx, id).await? {
                Some(silence) => format.write(out, &SilenceDetail(silence)),
                None => format.write(
                    out,
                    &Message::new(format!("silence {id} had not started and was deleted")),
                ),
            },
            SilenceCommands::Delete { id } => {
                self.engine.delete_silence(&ctx, id).await?;
                format.write(out, &Message::new(format!("silence {id} deleted")))
            }
        }
    }

    async fn alert<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        command: &AlertCommands,
    ) -> Result<(), CliError> {
        let ctx = self.engine.admin_context();
        match command {
            AlertCommands::Fire { alert } => {
                let alert = read_alert(alert)?.with_status(AlertStatus::Firing);
                let fingerprint = alert.fingerprint.clone();
                self.engine.observe_alert(&ctx, alert).await?;
                format.write(out, &Message::new(format!("alert {fingerprint} firing")))
            }
            AlertCommands::Resolve { alert } => {
                let alert = read_alert(alert)?.resolved();
                let fingerprint = alert.fingerprint.clone();
                self.engine.observe_alert(&ctx, alert).await?;
                format.write(out, &Message::new(format!("alert {fingerprint} resolved")))
            }
            AlertCommands::List => {
                let alerts = self.engine.firing_alerts(&ctx).await?;
                format.write(out, &AlertList(alerts))
            }
        }
    }

    async fn check<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        alert: &str,
    ) -> Result<(), CliError> {
        let alert = read_alert(alert)?;
        let suppression = self.engine.evaluate(&self.engine.query_context(), &alert).await;
        let result = CheckResult {
            fingerprint: alert.fingerprint,
            suppressed: suppression.is_suppressed(),
            suppression,
        };
        format.write(out, &result)
    }

    async fn stats<W: Write>(&self, out: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        let ctx = self.engine.admin_context();
        let mut report = StatsReport {
            rules: self.engine.rules().len(),
            ..StatsReport::default()
        };

        for status in [SilenceStatus::Pending, SilenceStatus::Active, SilenceStatus::Expired] {
            let query = SilenceQuery {
                limit: Some(1),
                ..SilenceQuery::filtered(SilenceFilter::default().with_status(status))
            };
            let total = self.engine.list_silences(&ctx, query).await?.total;
            match status {
                SilenceStatus::Pending => report.pending_silences = total,
                SilenceStatus::Active => report.active_silences = total,
                SilenceStatus::Expired => report.expired_silences = total,
            }
        }
        report.firing_alerts = self.engine.firing_alerts(&ctx).await?.len();
        report.active_inhibitions = self.engine.get_active_inhibitions(&ctx).await?.len();
        report.engine = self.engine.stats();

        format.write(out, &report)
    }
}

fn new_silence(args: &AddSilenceArgs) -> Result<NewSilence, CliError> {
    let starts_at = args.starts_at.unwrap_or_else(Utc::now);
    let ends_at = match (args.ends_at, args.duration) {
        (Some(ends_at), _) => ends_at,
        (None, Some(duration)) => starts_at + duration,
        (None, None) => {
            return Err(CliError::InvalidArgument(
                "one of --duration or --ends-at is required".to_string(),
            ));
        }
    };

    let request = NewSilence::new(
        args.matchers.clone(),
        ends_at,
        args.created_by.clone(),
        args.comment.clone(),
    );
    Ok(match args.starts_at {
        Some(starts_at) => request.starting_at(starts_at),
        None => request,
    })
}

fn list_query(args: &ListSilencesArgs) -> SilenceQuery {
    SilenceQuery {
        filter: SilenceFilter {
            status: args.status,
            created_by: args.created_by.clone(),
            label: args.label.clone(),
            ..SilenceFilter::default()
        },
        sort: SilenceSort {
            field: args.sort.into(),
            descending: !args.ascending,
        },
        offset: args.offset,
        limit: args.limit,
    }
}

fn silence_update(args: &UpdateSilenceArgs) -> Result<SilenceUpdate, CliError> {
    let update = SilenceUpdate {
        comment: args.comment.clone(),
        ends_at: args.ends_at.or_else(|| args.duration.map(|d| Utc::now() + d)),
        matchers: (!args.matchers.is_empty()).then(|| args.matchers.clone()),
    };
    if update.is_empty() {
        return Err(CliError::InvalidArgument(
            "nothing to update: pass --comment, --ends-at, --duration, or --matcher".to_string(),
        ));
    }
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Format};
    use clap::Parser;

    fn run(engine: &SuppressionEngine, args: &[&str]) -> Result<String, CliError> {
        let mut argv = vec!["claw-suppress", "--format", "json"];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).expect("valid arguments");

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let mut out = Vec::new();
        rt.block_on(SuppressCommand::new(engine.clone()).execute(
            &mut out,
            &OutputFormat::new(Format::Json),
            &cli.command,
        ))?;
        Ok(String::from_utf8(out).expect("utf-8"))
    }

    fn engine_in(dir: &Path) -> SuppressionEngine {
        open_engine(None, dir).expect("engine")
    }

    #[test]
    fn read_alert_inline_fills_fingerprint() {
        let alert = read_alert(r#"{"labels": {"alertname": "HighCPU"}}"#).unwrap();
        assert_eq!(alert.fingerprint, claw_suppress::fingerprint(&alert.labels));
        assert!(alert.is_firing());
    }

    #[test]
    fn read_alert_rejects_empty_labels() {
        assert!(read_alert(r#"{"labels": {}}"#).is_err());
    }

    #[test]
    fn read_alert_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("alert.json");
        std::fs::write(&path, r#"{"labels": {"alertname": "NodeDown", "node": "n1"}}"#).unwrap();
        let alert = read_alert(path.to_str().unwrap()).unwrap();
        assert_eq!(alert.label("node"), Some("n1"));
    }

    #[test]
    fn add_then_check_then_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = engine_in(dir.path());

        let created = run(
            &engine,
            &[
                "silence",
                "add",
                "-m",
                "alertname=HighCPU",
                "--comment",
                "maintenance",
                "--created-by",
                "ops@example.com",
                "--duration",
                "1h",
            ],
        )
        .unwrap();
        let created: serde_json::Value = serde_json::from_str(&created).unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        let check = run(&engine, &["check", r#"{"labels": {"alertname": "HighCPU"}}"#]).unwrap();
        let check: serde_json::Value = serde_json::from_str(&check).unwrap();
        assert_eq!(check["suppressed"], true);
        assert_eq!(check["silence"]["silence_ids"][0], id.as_str());

        run(&engine, &["silence", "delete", &id]).unwrap();
        let check = run(&engine, &["check", r#"{"labels": {"alertname": "HighCPU"}}"#]).unwrap();
        let check: serde_json::Value = serde_json::from_str(&check).unwrap();
        assert_eq!(check["suppressed"], false);
    }

    #[test]
    fn add_requires_an_end() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = engine_in(dir.path());
        let err = run(
            &engine,
            &[
                "silence",
                "add",
                "-m",
                "alertname=HighCPU",
                "--comment",
                "maintenance",
                "--created-by",
                "ops@example.com",
            ],
        )
        .unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument(_)));
    }

    #[test]
    fn update_requires_a_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = engine_in(dir.path());
        let err = run(
            &engine,
            &["silence", "update", "00000000-0000-0000-0000-000000000000"],
        )
        .unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument(_)));
    }

    #[test]
    fn inhibition_from_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            r#"{"inhibit_rules": [{
                "name": "node-down",
                "source_match": {"alertname": "NodeDown"},
                "target_match": {"alertname": "InstanceDown"},
                "equal": ["node"]
            }]}"#,
        )
        .unwrap();
        let engine = open_engine(Some(&config_path), &dir.path().join("state")).unwrap();

        run(&engine, &["alert", "fire", r#"{"labels": {"alertname": "NodeDown", "node": "n1"}}"#]).unwrap();
        let check = run(
            &engine,
            &["check", r#"{"labels": {"alertname": "InstanceDown", "node": "n1"}}"#],
        )
        .unwrap();
        let check: serde_json::Value = serde_json::from_str(&check).unwrap();
        assert_eq!(check["inhibition"]["inhibited"], true);
        assert_eq!(check["inhibition"]["rule"]["name"], "node-down");

        let states = run(&engine, &["inhibitions"]).unwrap();
        let states: serde_json::Value = serde_json::from_str(&states).unwrap();
        assert_eq!(states.as_array().map(Vec::len), Some(1));

        run(&engine, &["alert", "resolve", r#"{"labels": {"alertname": "NodeDown", "node": "n1"}}"#]).unwrap();
        let states = run(&engine, &["inhibitions"]).unwrap();
        let states: serde_json::Value = serde_json::from_str(&states).unwrap();
        assert_eq!(states.as_array().map(Vec::len), Some(0));
    }
}
