//! Command-line argument parsing with clap.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use claw_suppress::{Matcher, SilenceStatus, SortField};

/// Clawbernetes alert suppression: silences, inhibitions, and alert checks.
#[derive(Parser, Debug, Clone)]
#[command(name = "claw-suppress")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding suppression state.
    #[arg(short, long, env = "CLAW_SUPPRESS_STATE", default_value = ".claw-suppress")]
    pub state_dir: PathBuf,

    /// Engine configuration file (JSON).
    #[arg(short, long, env = "CLAW_SUPPRESS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Silence management.
    Silence {
        /// Silence subcommand to execute.
        #[command(subcommand)]
        command: SilenceCommands,
    },

    /// Feed alert transitions into the firing population.
    Alert {
        /// Alert subcommand to execute.
        #[command(subcommand)]
        command: AlertCommands,
    },

    /// Check whether an alert is silenced or inhibited.
    Check {
        /// Alert as inline JSON or a path to a JSON file.
        alert: String,
    },

    /// List active inhibitions.
    Inhibitions,

    /// List configured inhibition rules.
    Rules,

    /// Show suppression state counts.
    Stats,
}

/// Silence subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum SilenceCommands {
    /// Create a silence.
    Add(AddSilenceArgs),

    /// List silences.
    List(ListSilencesArgs),

    /// Show a silence.
    Get {
        /// Silence ID.
        id: String,
    },

    /// Update a silence's comment, end time, or matchers.
    Update(UpdateSilenceArgs),

    /// End a silence now, keeping it for audit.
    Expire {
        /// Silence ID.
        id: String,
    },

    /// Delete a silence.
    Delete {
        /// Silence ID.
        id: String,
    },
}

/// Arguments for creating a silence.
#[derive(Parser, Debug, Clone)]
pub struct AddSilenceArgs {
    /// Label matcher, e.g. `alertname="HighCPU"` or `severity=~"critical|warning"`.
    #[arg(short, long = "matcher", required = true)]
    pub matchers: Vec<Matcher>,

    /// Why the silence exists.
    #[arg(long)]
    pub comment: String,

    /// Creator e-mail address.
    #[arg(long, env = "CLAW_SUPPRESS_USER")]
    pub created_by: String,

    /// Start time (RFC 3339). Defaults to now.
    #[arg(long)]
    pub starts_at: Option<DateTime<Utc>>,

    /// How long the silence lasts, e.g. `2h` or `1h30m`.
    #[arg(short, long, value_parser = parse_duration, conflicts_with = "ends_at")]
    pub duration: Option<Duration>,

    /// End time (RFC 3339).
    #[arg(long)]
    pub ends_at: Option<DateTime<Utc>>,
}

/// Arguments for listing silences.
#[derive(Parser, Debug, Clone)]
pub struct ListSilencesArgs {
    /// Only silences with this status (pending, active, expired).
    #[arg(long)]
    pub status: Option<SilenceStatus>,

    /// Only silences created by this operator.
    #[arg(long)]
    pub created_by: Option<String>,

    /// Only silences with a matcher on this label.
    #[arg(long)]
    pub label: Option<String>,

    /// Sort key.
    #[arg(long, value_enum, default_value_t = SortArg::CreatedAt)]
    pub sort: SortArg,

    /// Sort ascending instead of newest first.
    #[arg(long)]
    pub ascending: bool,

    /// Page size.
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Number of silences to skip.
    #[arg(long, default_value = "0")]
    pub offset: usize,
}

/// Arguments for updating a silence.
#[derive(Parser, Debug, Clone)]
pub struct UpdateSilenceArgs {
    /// Silence ID.
    pub id: String,

    /// New comment.
    #[arg(long)]
    pub comment: Option<String>,

    /// New end time (RFC 3339).
    #[arg(long)]
    pub ends_at: Option<DateTime<Utc>>,

    /// New end time relative to now, e.g. `4h`.
    #[arg(short, long, value_parser = parse_duration, conflicts_with = "ends_at")]
    pub duration: Option<Duration>,

    /// Replacement matchers.
    #[arg(short, long = "matcher")]
    pub matchers: Vec<Matcher>,
}

/// Sort key argument for silence listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    /// Creation time.
    CreatedAt,
    /// Window start.
    StartsAt,
    /// Window end.
    EndsAt,
}

impl From<SortArg> for SortField {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::CreatedAt => Self::CreatedAt,
            SortArg::StartsAt => Self::StartsAt,
            SortArg::EndsAt => Self::EndsAt,
        }
    }
}

/// Alert subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum AlertCommands {
    /// Mark an alert as firing.
    Fire {
        /// Alert as inline JSON or a path to a JSON file.
        alert: String,
    },

    /// Mark an alert as resolved.
    Resolve {
        /// Alert as inline JSON or a path to a JSON file.
        alert: String,
    },

    /// List firing alerts.
    List,
}

/// Parses a duration such as `90s`, `30m`, `2h`, `7d`, or `1h30m`.
///
/// # Errors
///
/// Returns a message if the input is empty, has an unknown unit, or is not
/// positive.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration cannot be empty".to_string());
    }

    let mut total = Duration::zero();
    let mut rest = input;
    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("missing unit in '{input}'"))?;
        let (digits, tail) = rest.split_at(split);
        let amount: i64 = digits
            .parse()
            .map_err(|_| format!("invalid number in '{input}'"))?;
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);

        let part = match unit {
            "s" => Duration::try_seconds(amount),
            "m" => Duration::try_minutes(amount),
            "h" => Duration::try_hours(amount),
            "d" => Duration::try_days(amount),
            "w" => Duration::try_weeks(amount),
            _ => return Err(format!("unknown unit '{unit}' in '{input}'")),
        }
        .ok_or_else(|| format!("duration '{input}' is too large"))?;

        total = total
            .checked_add(&part)
            .ok_or_else(|| format!("duration '{input}' is too large"))?;
        rest = next;
    }

    if total <= Duration::zero() {
        return Err("duration must be positive".to_string());
    }
    Ok(total)
}
