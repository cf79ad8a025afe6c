//! # Execution Configuration
//!
//! Every tunable the execution pipeline reads lives in one immutable value,
//! [`ExecConfig`], built once at startup and shared by `Arc` with the engine and
//! everything below it. Nothing in the pipeline reads the process environment
//! after startup.
//!
//! ## Sources
//!
//! - **`ConfigArgs`**: a `clap::Args` group that both binaries flatten into their
//!   own CLI. Each field is a long flag with an environment fallback
//!   (`MAX_SCRIPT_BYTES`, `NSJAIL_PATH`, ...), so container deployments can
//!   configure the service purely through environment variables.
//! - **`ExecConfig::default()`**: the same defaults, for tests and embedding.
//!
//! `ConfigArgs::into_config` validates limits so that a zero ceiling or a relative
//! workdir root is rejected at startup instead of surfacing as a confusing
//! per-request failure.

use crate::validator::ScriptLimits;
use std::convert::Infallible;
use std::path::PathBuf;
use std::time::Duration;

/// Extra wall-clock budget on top of the sandbox's own time limit.
pub const WALL_CLOCK_GRACE: Duration = Duration::from_secs(2);

/// Errors raised while turning raw configuration into an [`ExecConfig`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be greater than zero")]
    ZeroLimit { name: &'static str },

    #[error("{name} must not be empty")]
    EmptyPath { name: &'static str },

    #[error("WORKDIR_ROOT must be an absolute path, got '{0}'")]
    RelativeWorkdirRoot(PathBuf),
}

/// Resource ceilings applied to every child, whichever tier runs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub time_limit_secs: u64,
    pub cpu_limit_secs: u64,
    pub mem_limit_mb: u64,
    pub fsize_limit_mb: u64,
    pub nofile_limit: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            time_limit_secs: 5,
            cpu_limit_secs: 3,
            mem_limit_mb: 512,
            fsize_limit_mb: 10,
            nofile_limit: 256,
        }
    }
}

/// Immutable configuration for the whole execution pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecConfig {
    pub script_limits: ScriptLimits,
    /// Cap on captured user output, in characters, passed to the runner.
    pub max_stdout_chars: usize,
    pub nsjail_path: PathBuf,
    pub runner_bin: PathBuf,
    pub resources: ResourceLimits,
    pub sandbox_uid: u32,
    pub sandbox_gid: u32,
    pub workdir_root: PathBuf,
    /// Per-stream bound on what the executor keeps from the child.
    pub max_capture_bytes: usize,
    pub force_compat: bool,
    pub allow_direct_fallback: bool,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            script_limits: ScriptLimits::default(),
            max_stdout_chars: 200 * 1024,
            nsjail_path: PathBuf::from("/usr/local/bin/nsjail"),
            runner_bin: PathBuf::from("/usr/local/bin/safe_exec_runner"),
            resources: ResourceLimits::default(),
            sandbox_uid: 65532,
            sandbox_gid: 65532,
            workdir_root: PathBuf::from("/tmp/safe_exec"),
            max_capture_bytes: 8 * 1024 * 1024,
            force_compat: false,
            allow_direct_fallback: true,
        }
    }
}

impl ExecConfig {
    /// Hard ceiling the executor enforces on one attempt.
    pub fn wall_timeout(&self) -> Duration {
        Duration::from_secs(self.resources.time_limit_secs) + WALL_CLOCK_GRACE
    }

    /// Reject configurations that could never run a request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("MAX_SCRIPT_BYTES", self.script_limits.max_script_bytes as u64),
            ("MAX_STDOUT_BYTES", self.max_stdout_chars as u64),
            ("TIME_LIMIT_SEC", self.resources.time_limit_secs),
            ("CPU_LIMIT_SEC", self.resources.cpu_limit_secs),
            ("MEM_LIMIT_MB", self.resources.mem_limit_mb),
            ("FSIZE_LIMIT_MB", self.resources.fsize_limit_mb),
            ("NOFILE_LIMIT", self.resources.nofile_limit),
            ("MAX_CAPTURE_BYTES", self.max_capture_bytes as u64),
        ];
        if let Some(&(name, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroLimit { name });
        }

        if self.nsjail_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath { name: "NSJAIL_PATH" });
        }
        if self.runner_bin.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath { name: "RUNNER_BIN" });
        }
        if !self.workdir_root.is_absolute() {
            return Err(ConfigError::RelativeWorkdirRoot(self.workdir_root.clone()));
        }
        Ok(())
    }
}

/// Parse a boolean switch the way the environment usually spells it.
///
/// `1`, `true`, `yes` and `on` (any case) are true; anything else is false.
pub fn parse_flag(value: &str) -> Result<bool, Infallible> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(false);
    }
    Ok(matches!(
        trimmed.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    ))
}

/// Command-line / environment view of [`ExecConfig`].
#[derive(clap::Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Maximum script size in bytes
    #[arg(long, env = "MAX_SCRIPT_BYTES", default_value_t = 64 * 1024)]
    pub max_script_bytes: usize,

    /// Maximum captured print() output, in characters, before truncation
    #[arg(long, env = "MAX_STDOUT_BYTES", default_value_t = 200 * 1024)]
    pub max_stdout_bytes: usize,

    /// Path to the nsjail binary
    #[arg(long, env = "NSJAIL_PATH", default_value = "/usr/local/bin/nsjail")]
    pub nsjail_path: PathBuf,

    /// Path to the runner binary that hosts the interpreter
    #[arg(
        long,
        env = "RUNNER_BIN",
        default_value = "/usr/local/bin/safe_exec_runner"
    )]
    pub runner_bin: PathBuf,

    /// Sandbox wall time limit in seconds
    #[arg(long, env = "TIME_LIMIT_SEC", default_value_t = 5)]
    pub time_limit_sec: u64,

    /// CPU time rlimit in seconds
    #[arg(long, env = "CPU_LIMIT_SEC", default_value_t = 3)]
    pub cpu_limit_sec: u64,

    /// Address space rlimit in MiB
    #[arg(long, env = "MEM_LIMIT_MB", default_value_t = 512)]
    pub mem_limit_mb: u64,

    /// File size rlimit in MiB
    #[arg(long, env = "FSIZE_LIMIT_MB", default_value_t = 10)]
    pub fsize_limit_mb: u64,

    /// Open file descriptor rlimit
    #[arg(long, env = "NOFILE_LIMIT", default_value_t = 256)]
    pub nofile_limit: u64,

    /// Unprivileged uid inside the sandbox
    #[arg(long, env = "SANDBOX_UID", default_value_t = 65532)]
    pub sandbox_uid: u32,

    /// Unprivileged gid inside the sandbox
    #[arg(long, env = "SANDBOX_GID", default_value_t = 65532)]
    pub sandbox_gid: u32,

    /// Parent directory of per-request scratch directories
    #[arg(long, env = "WORKDIR_ROOT", default_value = "/tmp/safe_exec")]
    pub workdir_root: PathBuf,

    /// Per-stream bound on captured child output, in bytes
    #[arg(long, env = "MAX_CAPTURE_BYTES", default_value_t = 8 * 1024 * 1024)]
    pub max_capture_bytes: usize,

    /// Start in the reduced-isolation compatibility tier
    #[arg(
        long,
        env = "FORCE_COMPAT",
        default_value = "false",
        action = clap::ArgAction::Set,
        value_parser = parse_flag
    )]
    pub force_compat: bool,

    /// Permit running the runner without nsjail when nsjail cannot start
    #[arg(
        long,
        env = "ALLOW_DIRECT_FALLBACK",
        default_value = "true",
        action = clap::ArgAction::Set,
        value_parser = parse_flag
    )]
    pub allow_direct_fallback: bool,
}

impl ConfigArgs {
    pub fn into_config(self) -> Result<ExecConfig, ConfigError> {
        let config = ExecConfig {
            script_limits: ScriptLimits {
                max_script_bytes: self.max_script_bytes,
            },
            max_stdout_chars: self.max_stdout_bytes,
            nsjail_path: self.nsjail_path,
            runner_bin: self.runner_bin,
            resources: ResourceLimits {
                time_limit_secs: self.time_limit_sec,
                cpu_limit_secs: self.cpu_limit_sec,
                mem_limit_mb: self.mem_limit_mb,
                fsize_limit_mb: self.fsize_limit_mb,
                nofile_limit: self.nofile_limit,
            },
            sandbox_uid: self.sandbox_uid,
            sandbox_gid: self.sandbox_gid,
            workdir_root: self.workdir_root,
            max_capture_bytes: self.max_capture_bytes,
            force_compat: self.force_compat,
            allow_direct_fallback: self.allow_direct_fallback,
        };
        config.validate()?;
        Ok(config)
    }
}
