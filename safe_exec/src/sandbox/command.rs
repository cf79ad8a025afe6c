use super::types::SandboxTier;
use crate::config::{ExecConfig, ResourceLimits};
use std::path::{Path, PathBuf};

/// Flags that turn off every namespace nsjail would otherwise `clone(2)`.
const COMPAT_NAMESPACE_FLAGS: &[&str] = &[
    "--disable_clone_newns",
    "--disable_clone_newcgroup",
    "--disable_clone_newuts",
    "--disable_clone_newipc",
    "--disable_clone_newuser",
    "--disable_clone_newpid",
    "--disable_clone_newnet",
];

/// Everything needed to launch one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub tier: SandboxTier,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// rlimits the executor applies itself before exec. Set only when no
    /// isolation tool is there to apply them.
    pub rlimits: Option<ResourceLimits>,
}

impl CommandSpec {
    /// Build the command for `tier` that runs `script_path` inside `working_dir`.
    pub fn for_tier(
        tier: SandboxTier,
        config: &ExecConfig,
        script_path: &Path,
        working_dir: &Path,
    ) -> Self {
        let runner_args = runner_args(config, script_path);
        match tier {
            SandboxTier::Strict | SandboxTier::Compatibility => {
                let mut args = nsjail_args(tier, config);
                args.push("--".to_string());
                args.push(config.runner_bin.to_string_lossy().into_owned());
                args.extend(runner_args);
                Self {
                    tier,
                    program: config.nsjail_path.clone(),
                    args,
                    working_dir: working_dir.to_path_buf(),
                    rlimits: None,
                }
            }
            SandboxTier::Direct => Self {
                tier,
                program: config.runner_bin.clone(),
                args: runner_args,
                working_dir: working_dir.to_path_buf(),
                rlimits: Some(config.resources),
            },
        }
    }
}

fn runner_args(config: &ExecConfig, script_path: &Path) -> Vec<String> {
    vec![
        script_path.to_string_lossy().into_owned(),
        config.max_stdout_chars.to_string(),
    ]
}

fn nsjail_args(tier: SandboxTier, config: &ExecConfig) -> Vec<String> {
    let limits = &config.resources;
    let mut args = vec!["--quiet".to_string()];
    if tier == SandboxTier::Strict {
        args.push("--iface_no_lo".to_string());
    }
    args.extend([
        format!("--time_limit={}", limits.time_limit_secs),
        format!("--rlimit_cpu={}", limits.cpu_limit_secs),
        format!("--rlimit_as={}", limits.mem_limit_mb),
        format!("--rlimit_fsize={}", limits.fsize_limit_mb),
        format!("--rlimit_nofile={}", limits.nofile_limit),
        "--user".to_string(),
        config.sandbox_uid.to_string(),
        "--group".to_string(),
        config.sandbox_gid.to_string(),
        "--disable_proc".to_string(),
    ]);
    if tier == SandboxTier::Compatibility {
        args.extend(COMPAT_NAMESPACE_FLAGS.iter().map(|flag| flag.to_string()));
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(tier: SandboxTier) -> CommandSpec {
        CommandSpec::for_tier(
            tier,
            &ExecConfig::default(),
            Path::new("/tmp/safe_exec/abc/script.py"),
            Path::new("/tmp/safe_exec/abc"),
        )
    }

    #[test]
    fn test_strict_command_line() {
        let spec = spec(SandboxTier::Strict);
        assert_eq!(spec.program, PathBuf::from("/usr/local/bin/nsjail"));
        assert_eq!(
            spec.args,
            [
                "--quiet",
                "--iface_no_lo",
                "--time_limit=5",
                "--rlimit_cpu=3",
                "--rlimit_as=512",
                "--rlimit_fsize=10",
                "--rlimit_nofile=256",
                "--user",
                "65532",
                "--group",
                "65532",
                "--disable_proc",
                "--",
                "/usr/local/bin/safe_exec_runner",
                "/tmp/safe_exec/abc/script.py",
                "204800",
            ]
        );
        assert!(spec.rlimits.is_none());
    }

    #[test]
    fn test_compat_drops_loopback_flag_and_disables_namespaces() {
        let spec = spec(SandboxTier::Compatibility);
        assert!(!spec.args.iter().any(|a| a == "--iface_no_lo"));
        let separator = spec.args.iter().position(|a| a == "--").unwrap();
        for flag in COMPAT_NAMESPACE_FLAGS {
            let idx = spec.args.iter().position(|a| a == flag).unwrap();
            assert!(idx < separator, "{flag} must precede the separator");
        }
        assert_eq!(spec.args.len(), 11 + COMPAT_NAMESPACE_FLAGS.len() + 4);
    }

    #[test]
    fn test_direct_runs_runner_with_rlimits() {
        let spec = spec(SandboxTier::Direct);
        assert_eq!(spec.program, PathBuf::from("/usr/local/bin/safe_exec_runner"));
        assert_eq!(spec.args, ["/tmp/safe_exec/abc/script.py", "204800"]);
        assert_eq!(spec.rlimits, Some(ResourceLimits::default()));
    }
}
