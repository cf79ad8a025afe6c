//! # safe_exec_runner
//!
//! Runs inside the sandbox: `safe_exec_runner <script_path> <stdout_cap>`.
//!
//! Loads the script as a fresh `user_script` module in an embedded interpreter,
//! calls its `main()` with `print` output captured, and writes exactly one JSON
//! verdict line to the real stdout. Nothing else is ever written to stdout.
//!
//! Exit status: 0 on success, 1 on any reported failure, 2 on bad invocation.

mod python;

use clap::Parser;
use safe_exec_common::{ErrorCode, Verdict};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

/// Cap used when the second argument is not a number.
const DEFAULT_STDOUT_CAP: usize = 200 * 1024;

const USAGE: &str = "Usage: safe_exec_runner <script_path> <stdout_cap>";

#[derive(Parser, Debug)]
#[command(name = "safe_exec_runner", disable_help_flag = true, disable_version_flag = true)]
struct Args {
    /// Python file defining main()
    script_path: PathBuf,

    /// Maximum captured print() output, in characters
    #[arg(allow_hyphen_values = true)]
    stdout_cap: String,
}

fn parse_cap(raw: &str) -> usize {
    raw.trim().parse().unwrap_or(DEFAULT_STDOUT_CAP)
}

fn emit(verdict: &Verdict) -> std::io::Result<()> {
    let line = verdict.to_line().map_err(std::io::Error::other)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(line.as_bytes())?;
    stdout.flush()
}

fn main() -> ExitCode {
    let verdict = match Args::try_parse() {
        Ok(args) => python::run_script(&args.script_path, parse_cap(&args.stdout_cap)),
        Err(err) => {
            eprintln!("{err}");
            Verdict::failure(ErrorCode::BadInvocation, USAGE)
        }
    };

    if let Err(e) = emit(&verdict) {
        eprintln!("safe_exec_runner: failed to write verdict: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::from(verdict.exit_code() as u8)
}
