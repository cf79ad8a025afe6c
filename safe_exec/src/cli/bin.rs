// Binary entry point for safe_exec
// This is a thin wrapper that delegates to the library implementation

use anyhow::Result;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    match safe_exec::cli::run().await {
        Ok(code) => Ok(code),
        Err(e) => {
            eprintln!("safe_exec fatal error: {:#}", e);
            Err(e)
        }
    }
}
