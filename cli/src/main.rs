//! `intake` entry point.
//!
//! Operator tool over a local intake store. Prints results as JSON on
//! stdout; logs and errors go to stderr. The exit code identifies the
//! error kind so scripts can branch on it.

mod commands;

use clap::Parser;
use commands::{Cli, MalformedAnswers};
use intake_core::{ErrorKind, IntakeConfig, IntakeError, IntakeService};

/// Exit code for an error of `kind`
fn exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Validation => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Ownership => 4,
        ErrorKind::Conflict => 5,
        ErrorKind::Storage => 6,
        ErrorKind::Config => 7,
    }
}

/// Print `err` as `kind: detail` and pick the exit code
fn report(err: &anyhow::Error) -> i32 {
    if let Some(intake) = err.downcast_ref::<IntakeError>() {
        eprintln!("{}: {intake}", intake.kind());
        return exit_code(intake.kind());
    }
    if err.downcast_ref::<MalformedAnswers>().is_some() {
        eprintln!("{}: {err:#}", ErrorKind::Validation);
        return exit_code(ErrorKind::Validation);
    }
    eprintln!("error: {err:#}");
    1
}

fn load_config(cli: &Cli) -> intake_core::Result<IntakeConfig> {
    match &cli.config {
        Some(path) => IntakeConfig::load_from_path(path),
        None => IntakeConfig::load(),
    }
}

async fn run(cli: Cli, cfg: IntakeConfig) -> anyhow::Result<()> {
    let svc = IntakeService::from_config(&cfg)?;
    tracing::debug!(
        version = intake_core::VERSION,
        db_path = %cfg.resolved_db_path().display(),
        "Intake store ready"
    );

    let output = cli.command.run(&svc).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => std::process::exit(report(&anyhow::Error::from(e))),
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.log_filter)),
        )
        .init();

    if let Err(e) = run(cli, cfg).await {
        std::process::exit(report(&e));
    }
}
