//! # Process Executor
//!
//! Runs one [`CommandSpec`] to completion under a hard wall-clock ceiling and
//! hands back what the child wrote. It performs no interpretation of the output.
//!
//! ## Guarantees
//!
//! - stdin is `/dev/null` and the environment is reduced to a fixed minimal set.
//! - The child leads its own process group. After every attempt the whole group
//!   is sent `SIGKILL`, always before the leader is reaped, so the group id can
//!   not have been recycled. On a normal exit this waits with `WNOWAIT` (Linux)
//!   to see the leader finish while leaving it a zombie. `kill_on_drop` covers
//!   cancellation of the surrounding task.
//! - Each stream keeps at most `max_capture_bytes`. The rest is drained so the
//!   child never blocks on a full pipe.
//! - For the Direct tier, CPU, address-space, file-size and open-file rlimits are
//!   applied in the child between `fork` and `exec`.

use crate::config::ResourceLimits;
use crate::sandbox::{CommandSpec, LaunchError, RunOutput};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Environment handed to every child. Everything else is cleared.
const CHILD_ENV: &[(&str, &str)] = &[
    ("PATH", "/usr/local/bin:/usr/bin:/bin"),
    ("LANG", "C.UTF-8"),
    ("LC_ALL", "C.UTF-8"),
    ("PYTHONDONTWRITEBYTECODE", "1"),
    ("PYTHONIOENCODING", "utf-8"),
];

/// Variables forwarded from the service's own environment when set. The
/// embedded interpreter needs them on relocated Python installs.
const FORWARDED_ENV: &[&str] = &["PYTHONHOME"];

const READ_CHUNK: usize = 8 * 1024;

/// How one attempt ended.
#[derive(Debug)]
pub enum Attempt {
    Exited(RunOutput),
    TimedOut { elapsed: Duration },
}

/// Spawns and supervises sandbox attempts.
#[derive(Debug, Clone, Copy)]
pub struct ProcessExecutor {
    wall_timeout: Duration,
    max_capture_bytes: usize,
}

impl ProcessExecutor {
    pub fn new(wall_timeout: Duration, max_capture_bytes: usize) -> Self {
        Self {
            wall_timeout,
            max_capture_bytes,
        }
    }

    pub fn wall_timeout(&self) -> Duration {
        self.wall_timeout
    }

    /// Run `spec` and wait for it, killing it once the wall-clock ceiling passes.
    pub async fn run(&self, spec: &CommandSpec) -> Result<Attempt, LaunchError> {
        let mut cmd = self.build_command(spec);
        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| LaunchError::from_spawn(spec.program.clone(), e))?;
        let pid = child.id();
        debug!(tier = %spec.tier, ?pid, program = ?spec.program, "Spawned sandbox attempt");

        let collected = tokio::time::timeout(
            self.wall_timeout,
            collect(&mut child, pid, self.max_capture_bytes),
        )
        .await;

        // On the paths below the leader has not been reaped yet.
        match collected {
            Ok(Ok((status, stdout, stderr))) => Ok(Attempt::Exited(RunOutput {
                status,
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            })),
            Ok(Err(e)) => {
                kill_process_group(pid);
                let _ = child.kill().await;
                Err(e)
            }
            Err(_) => {
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed out child {:?}: {}", pid, e);
                }
                Ok(Attempt::TimedOut {
                    elapsed: started.elapsed(),
                })
            }
        }
    }

    fn build_command(&self, spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .kill_on_drop(true);

        for (key, value) in CHILD_ENV {
            cmd.env(key, value);
        }
        for key in FORWARDED_ENV {
            if let Some(value) = std::env::var_os(key) {
                cmd.env(key, value);
            }
        }

        #[cfg(unix)]
        cmd.process_group(0);

        if let Some(limits) = spec.rlimits {
            apply_rlimits_on_exec(&mut cmd, limits);
        }
        cmd
    }
}

/// Wait for exit while draining both pipes concurrently, then clear the
/// process group and reap the leader.
async fn collect(
    child: &mut Child,
    pid: Option<u32>,
    limit: usize,
) -> Result<(ExitStatus, Vec<u8>, Vec<u8>), LaunchError> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (exited, stdout, stderr) = tokio::join!(
        leader_exited(pid),
        read_bounded(stdout, limit, "stdout"),
        read_bounded(stderr, limit, "stderr"),
    );
    let stdout = stdout.map_err(LaunchError::Capture)?;
    let stderr = stderr.map_err(LaunchError::Capture)?;
    if exited.map_err(LaunchError::Wait)? {
        kill_process_group(pid);
    }
    let status = child.wait().await.map_err(LaunchError::Wait)?;
    Ok((status, stdout, stderr))
}

/// Block until the leader exits without reaping it. Returns whether it is now
/// a zombie, which keeps its pid and group id reserved.
#[cfg(target_os = "linux")]
async fn leader_exited(pid: Option<u32>) -> std::io::Result<bool> {
    use nix::errno::Errno;
    use nix::sys::wait::{Id, WaitPidFlag, waitid};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return Ok(false);
    };
    let waited = tokio::task::spawn_blocking(move || {
        waitid(
            Id::Pid(Pid::from_raw(pid)),
            WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT,
        )
    })
    .await
    .map_err(std::io::Error::other)?;
    match waited {
        Ok(_) => Ok(true),
        // Already reaped elsewhere; its group id is no longer ours to signal.
        Err(Errno::ECHILD) => Ok(false),
        Err(errno) => Err(errno.into()),
    }
}

#[cfg(not(target_os = "linux"))]
async fn leader_exited(_pid: Option<u32>) -> std::io::Result<bool> {
    Ok(false)
}

/// Read a stream to EOF, keeping at most `limit` bytes.
async fn read_bounded<R>(reader: Option<R>, limit: usize, name: &str) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len());
        let take = n.min(room);
        kept.extend_from_slice(&chunk[..take]);
        dropped += n - take;
    }
    if dropped > 0 {
        warn!("Discarded {} bytes of child {} past the capture bound", dropped, name);
    }
    Ok(kept)
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    // ESRCH just means the group is already gone.
    let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(target_os = "linux")]
fn apply_rlimits_on_exec(cmd: &mut Command, limits: ResourceLimits) {
    use nix::sys::resource::{Resource, setrlimit};

    const MIB: u64 = 1024 * 1024;
    // SAFETY: the closure only calls setrlimit(2), which is async-signal-safe,
    // and allocates nothing between fork and exec.
    unsafe {
        cmd.pre_exec(move || {
            setrlimit(
                Resource::RLIMIT_CPU,
                limits.cpu_limit_secs,
                limits.cpu_limit_secs,
            )?;
            let address_space = limits.mem_limit_mb.saturating_mul(MIB);
            setrlimit(Resource::RLIMIT_AS, address_space, address_space)?;
            let file_size = limits.fsize_limit_mb.saturating_mul(MIB);
            setrlimit(Resource::RLIMIT_FSIZE, file_size, file_size)?;
            setrlimit(
                Resource::RLIMIT_NOFILE,
                limits.nofile_limit,
                limits.nofile_limit,
            )?;
            Ok(())
        });
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_rlimits_on_exec(_cmd: &mut Command, _limits: ResourceLimits) {
    warn!("Direct tier rlimits are only enforced on Linux");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::sandbox::SandboxTier;
    use std::path::PathBuf;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec {
            tier: SandboxTier::Strict,
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: std::env::temp_dir(),
            rlimits: None,
        }
    }

    #[tokio::test]
    async fn test_captures_both_streams_and_status() {
        let executor = ProcessExecutor::new(Duration::from_secs(10), 1024);
        let attempt = executor.run(&sh("echo out; echo err >&2; exit 3")).await.unwrap();
        let Attempt::Exited(output) = attempt else {
            panic!("expected exit");
        };
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_capture_is_bounded() {
        let executor = ProcessExecutor::new(Duration::from_secs(10), 10);
        let attempt = executor
            .run(&sh("i=0; while [ $i -lt 1000 ]; do printf abcdefgh; i=$((i+1)); done"))
            .await
            .unwrap();
        let Attempt::Exited(output) = attempt else {
            panic!("expected exit");
        };
        assert_eq!(output.stdout, "abcdefghab");
        assert!(output.success());
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let executor = ProcessExecutor::new(Duration::from_millis(300), 1024);
        let started = Instant::now();
        let attempt = executor.run(&sh("sleep 30")).await.unwrap();
        assert!(matches!(attempt, Attempt::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_timeout_covers_background_children_holding_pipes() {
        let executor = ProcessExecutor::new(Duration::from_millis(300), 1024);
        let started = Instant::now();
        let attempt = executor.run(&sh("sleep 30 & echo started")).await.unwrap();
        // The shell exits at once, but its background sleep keeps stdout open.
        assert!(matches!(attempt, Attempt::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_environment_is_minimal() {
        // SAFETY: test-only; no other thread in this test reads the variable.
        unsafe { std::env::set_var("SAFE_EXEC_LEAK_CHECK", "leaked") };
        let executor = ProcessExecutor::new(Duration::from_secs(10), 4096);
        let attempt = executor
            .run(&sh("echo \"${SAFE_EXEC_LEAK_CHECK:-clean}\"; echo \"$LANG\""))
            .await
            .unwrap();
        let Attempt::Exited(output) = attempt else {
            panic!("expected exit");
        };
        assert_eq!(output.stdout, "clean\nC.UTF-8\n");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_group_is_cleared_after_normal_exit() {
        let executor = ProcessExecutor::new(Duration::from_secs(10), 1024);
        let attempt = executor
            .run(&sh("sleep 30 >/dev/null 2>&1 & echo $!"))
            .await
            .unwrap();
        let Attempt::Exited(output) = attempt else {
            panic!("expected exit");
        };
        assert!(output.success());
        let straggler = output.stdout.trim().to_string();
        assert!(!straggler.is_empty());

        // Gone, or a zombie waiting for its new parent to reap it.
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let alive = std::fs::read_to_string(format!("/proc/{straggler}/stat"))
                .map(|stat| {
                    let state = stat.rsplit(')').next().unwrap_or("").trim_start();
                    !state.starts_with('Z')
                })
                .unwrap_or(false);
            if !alive {
                break;
            }
            assert!(Instant::now() < deadline, "background child {straggler} survived");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_reported() {
        let executor = ProcessExecutor::new(Duration::from_secs(1), 1024);
        let mut spec = sh("true");
        spec.program = PathBuf::from("/nonexistent/safe_exec_tool");
        let err = executor.run(&spec).await.unwrap_err();
        assert!(matches!(err, LaunchError::ProgramNotFound { .. }));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_direct_rlimits_are_applied() {
        let executor = ProcessExecutor::new(Duration::from_secs(10), 1024);
        let mut spec = sh("ulimit -n; ulimit -t");
        spec.rlimits = Some(ResourceLimits {
            nofile_limit: 64,
            cpu_limit_secs: 7,
            ..ResourceLimits::default()
        });
        let Attempt::Exited(output) = executor.run(&spec).await.unwrap() else {
            panic!("expected exit");
        };
        assert_eq!(output.stdout, "64\n7\n");
    }
}
