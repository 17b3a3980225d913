//! `claw-suppress` binary entrypoint.

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use claw_suppress_cli::{Cli, OutputFormat, SuppressCommand, open_engine};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let engine = open_engine(cli.config.as_deref(), &cli.state_dir).with_context(|| {
        format!("failed to open state in {}", cli.state_dir.display())
    })?;
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    SuppressCommand::new(engine)
        .execute(&mut stdout, &format, &cli.command)
        .await?;
    Ok(())
}
