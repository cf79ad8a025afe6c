use anyhow::Context;
use clap::Parser;
use safe_exec::utils::logging::init_logging;
use safe_exec::{ConfigArgs, Engine};
use safe_exec_http::{ServerConfig, start_server};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// HTTP service that executes untrusted Python `main()` functions in a sandbox.
#[derive(Parser, Debug)]
#[command(name = "safe_exec_http")]
#[command(version, about)]
struct Args {
    /// Interface to listen on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    #[command(flatten)]
    config: ConfigArgs,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Log to a daily rolling file instead of stderr
    #[arg(long)]
    log_to_file: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let log_level = if args.debug { "debug" } else { "info" };
    init_logging(log_level, args.log_to_file)?;

    let config = args.config.into_config().context("Invalid configuration")?;
    tracing::info!(
        nsjail = %config.nsjail_path.display(),
        runner = %config.runner_bin.display(),
        force_compat = config.force_compat,
        allow_direct_fallback = config.allow_direct_fallback,
        "Execution engine configured"
    );

    let engine = Arc::new(Engine::new(Arc::new(config)));
    let server = ServerConfig {
        bind_addr: SocketAddr::new(args.host, args.port),
    };
    start_server(server, engine).await?;
    Ok(())
}
