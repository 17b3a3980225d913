//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use claw_suppress::{
    Alert, EngineStats, InhibitionRule, InhibitionState, Silence, SilencePage, Suppression,
};
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone, Default)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => value.write_table(writer)?,
        }
        Ok(())
    }

    /// Write a value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// A one-line acknowledgement.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    /// What happened.
    pub message: String,
}

impl Message {
    /// Creates a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl TableDisplay for Message {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "✓ {}", self.message)?;
        Ok(())
    }
}

/// A single silence in detail.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct SilenceDetail(pub Silence);

impl TableDisplay for SilenceDetail {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let s = &self.0;
        writeln!(writer, "Silence {}", s.id)?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Status:       {}", s.status)?;
        writeln!(writer, "Created by:   {}", s.created_by)?;
        writeln!(writer, "Comment:      {}", s.comment)?;
        writeln!(writer, "Starts:       {}", s.starts_at.to_rfc3339())?;
        writeln!(writer, "Ends:         {}", s.ends_at.to_rfc3339())?;
        writeln!(writer, "Created:      {}", s.created_at.to_rfc3339())?;
        if let Some(updated) = s.updated_at {
            writeln!(writer, "Updated:      {}", updated.to_rfc3339())?;
        }
        writeln!(writer, "Matchers:")?;
        for matcher in &s.matchers {
            writeln!(writer, "  {matcher}")?;
        }
        Ok(())
    }
}

/// One page of silences.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct SilenceList(pub SilencePage);

impl TableDisplay for SilenceList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let page = &self.0;
        if page.silences.is_empty() {
            writeln!(writer, "No silences found")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<36}  {:<8}  {:<20}  {:<20}  {}",
            "ID", "STATUS", "ENDS", "CREATED BY", "MATCHERS"
        )?;
        writeln!(writer, "{}", "─".repeat(110))?;

        for s in &page.silences {
            let matchers: Vec<String> = s.matchers.iter().map(ToString::to_string).collect();
            writeln!(
                writer,
                "{:<36}  {:<8}  {:<20}  {:<20}  {}",
                s.id,
                s.status,
                s.ends_at.format("%Y-%m-%d %H:%M:%S"),
                truncate(&s.created_by, 20),
                truncate(&matchers.join(", "), 40)
            )?;
        }

        writeln!(writer)?;
        writeln!(
            writer,
            "Showing {} of {} silence(s)",
            page.silences.len(),
            page.total
        )?;
        Ok(())
    }
}

/// The combined verdict for one alert.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Fingerprint of the checked alert.
    pub fingerprint: String,
    /// True if either mechanism suppresses the alert.
    pub suppressed: bool,
    /// Both verdicts with evidence.
    #[serde(flatten)]
    pub suppression: Suppression,
}

impl TableDisplay for CheckResult {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let silence = &self.suppression.silence;
        let inhibition = &self.suppression.inhibition;

        writeln!(writer, "Alert {}", self.fingerprint)?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(
            writer,
            "Suppressed:   {}",
            if self.suppressed { "yes" } else { "no" }
        )?;
        writeln!(writer)?;

        if silence.silenced {
            let ids: Vec<String> = silence.silence_ids.iter().map(ToString::to_string).collect();
            writeln!(writer, "Silenced by:  {}", ids.join(", "))?;
        } else {
            writeln!(writer, "Silenced:     no")?;
        }
        if let Some(error) = &silence.error {
            writeln!(writer, "  ⚠ silence check degraded: {error}")?;
        }

        match (&inhibition.source, &inhibition.rule) {
            (Some(source), Some(rule)) if inhibition.inhibited => {
                writeln!(writer, "Inhibited by: {} (rule {})", source.fingerprint, rule.name)?;
            }
            _ => writeln!(writer, "Inhibited:    no")?,
        }
        if let Some(error) = &inhibition.error {
            writeln!(writer, "  ⚠ inhibition check degraded: {error}")?;
        }
        Ok(())
    }
}

/// Active inhibitions.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct InhibitionList(pub Vec<InhibitionState>);

impl TableDisplay for InhibitionList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.0.is_empty() {
            writeln!(writer, "No active inhibitions")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<16}  {:<16}  {:<24}  {}",
            "TARGET", "SOURCE", "RULE", "SINCE"
        )?;
        writeln!(writer, "{}", "─".repeat(84))?;
        for state in &self.0 {
            writeln!(
                writer,
                "{:<16}  {:<16}  {:<24}  {}",
                state.target_fingerprint,
                state.source_fingerprint,
                truncate(&state.rule_name, 24),
                state.inhibited_at.format("%Y-%m-%d %H:%M:%S")
            )?;
        }
        writeln!(writer)?;
        writeln!(writer, "Total: {} inhibition(s)", self.0.len())?;
        Ok(())
    }
}

/// Configured inhibition rules, in evaluation order.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct RuleList(pub Vec<InhibitionRule>);

impl TableDisplay for RuleList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.0.is_empty() {
            writeln!(writer, "No inhibition rules configured")?;
            return Ok(());
        }

        for (position, rule) in self.0.iter().enumerate() {
            writeln!(writer, "{}. {}", position + 1, rule.name)?;
            writeln!(writer, "   source: {}", describe(&rule.source_match, &rule.source_matchers))?;
            writeln!(writer, "   target: {}", describe(&rule.target_match, &rule.target_matchers))?;
            if !rule.equal.is_empty() {
                writeln!(writer, "   equal:  {}", rule.equal.join(", "))?;
            }
        }
        Ok(())
    }
}

fn describe(
    exact: &std::collections::HashMap<String, String>,
    matchers: &[claw_suppress::Matcher],
) -> String {
    let mut parts: Vec<String> = exact.iter().map(|(k, v)| format!("{k}=\"{v}\"")).collect();
    parts.sort();
    parts.extend(matchers.iter().map(ToString::to_string));
    parts.join(", ")
}

/// Firing alerts.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct AlertList(pub Vec<Alert>);

impl TableDisplay for AlertList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.0.is_empty() {
            writeln!(writer, "No firing alerts")?;
            return Ok(());
        }

        writeln!(writer, "{:<16}  {:<20}  {}", "FINGERPRINT", "SINCE", "LABELS")?;
        writeln!(writer, "{}", "─".repeat(90))?;
        for alert in &self.0 {
            let mut labels: Vec<String> = alert
                .labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            labels.sort();
            writeln!(
                writer,
                "{:<16}  {:<20}  {}",
                alert.fingerprint,
                alert.starts_at.format("%Y-%m-%d %H:%M:%S"),
                truncate(&labels.join(", "), 50)
            )?;
        }
        writeln!(writer)?;
        writeln!(writer, "Total: {} firing alert(s)", self.0.len())?;
        Ok(())
    }
}

/// Counts of suppression state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsReport {
    /// Silences not yet started.
    pub pending_silences: usize,
    /// Silences currently suppressing.
    pub active_silences: usize,
    /// Silences kept for audit.
    pub expired_silences: usize,
    /// Alerts in the firing population.
    pub firing_alerts: usize,
    /// Active inhibitions.
    pub active_inhibitions: usize,
    /// Configured inhibition rules.
    pub rules: usize,
    /// Query counters for this process.
    pub engine: EngineStats,
}

impl TableDisplay for StatsReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Suppression State")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Silences")?;
        writeln!(writer, "  Active:         {}", self.active_silences)?;
        writeln!(writer, "  Pending:        {}", self.pending_silences)?;
        writeln!(writer, "  Expired:        {}", self.expired_silences)?;
        writeln!(writer)?;
        writeln!(writer, "Inhibition")?;
        writeln!(writer, "  Rules:          {}", self.rules)?;
        writeln!(writer, "  Firing alerts:  {}", self.firing_alerts)?;
        writeln!(writer, "  Inhibited:      {}", self.active_inhibitions)?;
        writeln!(writer)?;
        writeln!(writer, "Queries")?;
        writeln!(
            writer,
            "  Silence:        {} ({} failed open)",
            self.engine.silence_queries, self.engine.silence_failures
        )?;
        writeln!(
            writer,
            "  Inhibition:     {} ({} failed open)",
            self.engine.inhibition_queries, self.engine.inhibition_failures
        )?;
        writeln!(writer, "  Timeouts:       {}", self.engine.timeouts)?;
        Ok(())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else if max_chars > 3 {
        let kept: String = s.chars().take(max_chars - 3).collect();
        format!("{kept}...")
    } else {
        s.chars().take(max_chars).collect()
    }
}
