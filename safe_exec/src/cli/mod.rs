//! # safe_exec CLI
//!
//! Local front end to the execution pipeline, mostly for operators checking what
//! a host supports:
//!
//! - `safe_exec validate <file>` runs only the validator.
//! - `safe_exec run <file>` runs the full pipeline and reports the tier used.
//!
//! The JSON body goes to stdout exactly as the HTTP service would return it; the
//! tier goes to stderr. Exit status is 0 on success and 1 on any failure.

use crate::config::ConfigArgs;
use crate::engine::Engine;
use crate::translator::ExecutionOutcome;
use crate::utils::logging::init_logging;
use crate::validator::{ValidationError, validate_script};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Validate or run a Python script through the safe_exec sandbox pipeline.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log to a daily rolling file instead of stderr
    #[arg(long, global = true)]
    pub log_to_file: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the static checks only
    Validate {
        /// Python file defining main()
        file: PathBuf,
    },
    /// Execute the script in the sandbox
    Run {
        /// Python file defining main()
        file: PathBuf,
    },
}

pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let log_level = if cli.debug { "debug" } else { "info" };
    init_logging(log_level, cli.log_to_file)?;

    let config = cli
        .config
        .into_config()
        .context("Invalid configuration")?;

    let (body, ok) = match &cli.command {
        Command::Validate { file } => {
            let script = read_script(file)?;
            validation_response(script.and_then(|s| {
                validate_script(&s, &config.script_limits)?;
                Ok(s)
            }))
        }
        Command::Run { file } => {
            let engine = Engine::new(Arc::new(config));
            let report = match read_script(file)? {
                Ok(script) => engine.execute_script(&script).await,
                Err(err) => {
                    let (body, ok) = validation_response(Err(err));
                    println!("{body}");
                    return Ok(exit_code(ok));
                }
            };
            let tier = report.tier.map(|t| t.as_str()).unwrap_or("none");
            eprintln!("tier: {tier}");
            let ok = report.outcome.is_success();
            (outcome_json(&report.outcome)?, ok)
        }
    };

    println!("{body}");
    Ok(exit_code(ok))
}

/// Read a script file. Non-UTF-8 content is a validation failure, not an I/O one.
pub fn read_script(path: &Path) -> Result<Result<String, ValidationError>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    Ok(String::from_utf8(bytes).map_err(|_| ValidationError::BadEncoding))
}

fn validation_response(result: Result<String, ValidationError>) -> (Value, bool) {
    match result {
        Ok(_) => (json!({ "ok": true }), true),
        Err(err) => (json!({ "error": err.to_error_body() }), false),
    }
}

fn outcome_json(outcome: &ExecutionOutcome) -> Result<Value> {
    serde_json::to_value(outcome).context("Failed to serialize outcome")
}

fn exit_code(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
