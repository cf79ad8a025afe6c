//! End-to-end tests of the execution engine against fake sandbox tools.
//!
//! Each test writes a fake `nsjail` and a fake runner as shell scripts into a
//! temp dir, so the tier state machine can be driven without real isolation.
//! The environment handed to children is cleared, so every path a script needs
//! is baked into its text.

#![cfg(unix)]

use safe_exec::config::{ExecConfig, ResourceLimits};
use safe_exec::{Engine, ExecutionOutcome, SandboxTier};
use safe_exec_common::ErrorCode;
use serde_json::json;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

// Writing an executable while another test thread forks can make exec fail
// with ETXTBSY, so tests in this file run one at a time.
static SERIAL: Mutex<()> = Mutex::const_new(());

const MAIN_SCRIPT: &str = "def main():\n    return 1 + 1\n";

/// nsjail stand-in that execs whatever follows `--`.
const PASSTHROUGH_NSJAIL: &str = r#"
while [ "$#" -gt 0 ] && [ "$1" != "--" ]; do shift; done
shift
exec "$@"
"#;

/// Runner stand-in that reports success when it can read its script argument.
const SUCCESS_RUNNER: &str = r#"
if [ -r "$1" ]; then
  echo '{"result": 2, "stdout": ""}'
else
  echo '{"error": {"code": "IMPORT_ERROR", "message": "script missing"}}'
  exit 1
fi
"#;

struct FakeHost {
    dir: TempDir,
    log: PathBuf,
}

impl FakeHost {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("invocations.log");
        Self { dir, log }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn workdir_root(&self) -> PathBuf {
        self.path().join("work")
    }

    /// Write an executable shell script that first logs its own name and args.
    fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.path().join(name);
        let text = format!(
            "#!/bin/sh\necho \"{name} $*\" >> '{}'\n{body}",
            self.log.display()
        );
        std::fs::write(&path, text).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn config(&self, nsjail: PathBuf, runner: PathBuf) -> ExecConfig {
        ExecConfig {
            nsjail_path: nsjail,
            runner_bin: runner,
            workdir_root: self.workdir_root(),
            resources: ResourceLimits {
                time_limit_secs: 1,
                ..ResourceLimits::default()
            },
            ..ExecConfig::default()
        }
    }

    fn assert_no_workdirs_left(&self) {
        let root = self.workdir_root();
        if root.exists() {
            assert_eq!(
                std::fs::read_dir(&root).unwrap().count(),
                0,
                "workdir root should be empty after the request"
            );
        }
    }
}

fn engine(config: ExecConfig) -> Engine {
    Engine::new(Arc::new(config))
}

fn error_code(outcome: &ExecutionOutcome) -> ErrorCode {
    outcome.error_code().expect("expected a failure outcome")
}

// ============= Happy path =============

#[tokio::test]
async fn test_strict_tier_runs_runner_through_nsjail() {
    let _serial = SERIAL.lock().await;
    let host = FakeHost::new();
    let nsjail = host.script("nsjail", PASSTHROUGH_NSJAIL);
    let runner = host.script("runner", SUCCESS_RUNNER);

    let report = engine(host.config(nsjail, runner)).execute_script(MAIN_SCRIPT).await;

    assert_eq!(
        serde_json::to_value(&report.outcome).unwrap(),
        json!({"result": 2, "stdout": ""})
    );
    assert_eq!(report.tier, Some(SandboxTier::Strict));
    let calls = host.invocations();
    assert_eq!(calls.len(), 2, "{calls:?}");
    assert!(calls[0].starts_with("nsjail --quiet --iface_no_lo --time_limit=1"));
    assert!(calls[1].starts_with("runner "));
    assert!(calls[1].ends_with("/script.py 204800"));
    host.assert_no_workdirs_left();
}

#[tokio::test]
async fn test_execute_body_runs_validated_script() {
    let _serial = SERIAL.lock().await;
    let host = FakeHost::new();
    let nsjail = host.script("nsjail", PASSTHROUGH_NSJAIL);
    let runner = host.script("runner", SUCCESS_RUNNER);

    let body = json!({ "script": MAIN_SCRIPT }).to_string();
    let report = engine(host.config(nsjail, runner))
        .execute_body(body.as_bytes())
        .await;

    assert!(report.outcome.is_success());
    host.assert_no_workdirs_left();
}

#[tokio::test]
async fn test_identical_scripts_give_identical_results() {
    let _serial = SERIAL.lock().await;
    let host = FakeHost::new();
    let nsjail = host.script("nsjail", PASSTHROUGH_NSJAIL);
    let runner = host.script("runner", SUCCESS_RUNNER);
    let engine = engine(host.config(nsjail, runner));

    let first = engine.execute_script(MAIN_SCRIPT).await;
    let second = engine.execute_script(MAIN_SCRIPT).await;
    assert_eq!(first, second);
}

// ============= Validation short-circuits =============

#[tokio::test]
async fn test_validation_failure_spawns_nothing() {
    let _serial = SERIAL.lock().await;
    let host = FakeHost::new();
    let nsjail = host.script("nsjail", PASSTHROUGH_NSJAIL);
    let runner = host.script("runner", SUCCESS_RUNNER);
    let engine = engine(host.config(nsjail, runner));

    let report = engine.execute_script("def helper():\n    return 1\n").await;
    assert_eq!(error_code(&report.outcome), ErrorCode::NoMain);
    assert_eq!(report.tier, None);

    let oversized = format!("def main():\n    return 1\n#{}", "x".repeat(70_000));
    let report = engine.execute_script(&oversized).await;
    assert_eq!(error_code(&report.outcome), ErrorCode::ScriptTooLarge);

    assert!(host.invocations().is_empty());
    assert!(!host.workdir_root().exists());
}

// ============= Escalation =============

#[tokio::test]
async fn test_namespace_denied_escalates_to_compat() {
    let _serial = SERIAL.lock().await;
    let host = FakeHost::new();
    let nsjail = host.script(
        "nsjail",
        &format!(
            r#"
case " $* " in
  *" --iface_no_lo "*)
    echo "[E] clone(flags=CLONE_NEWUSER|CLONE_NEWNET) failed: Operation not permitted" >&2
    exit 255
    ;;
esac
{PASSTHROUGH_NSJAIL}"#
        ),
    );
    let runner = host.script("runner", SUCCESS_RUNNER);

    let report = engine(host.config(nsjail, runner)).execute_script(MAIN_SCRIPT).await;

    assert!(report.outcome.is_success(), "{:?}", report.outcome);
    assert_eq!(report.tier, Some(SandboxTier::Compatibility));
    let calls = host.invocations();
    assert_eq!(calls.len(), 3, "{calls:?}");
    assert!(calls[0].contains("--iface_no_lo"));
    assert!(!calls[1].contains("--iface_no_lo"));
    assert!(calls[1].contains("--disable_clone_newuser"));
    host.assert_no_workdirs_left();
}

#[tokio::test]
async fn test_compat_namespace_denied_settles_with_empty_output() {
    let _serial = SERIAL.lock().await;
    let host = FakeHost::new();
    let nsjail = host.script(
        "nsjail",
        r#"
echo "clone(CLONE_NEWPID): Operation not permitted" >&2
exit 255
"#,
    );
    let runner = host.script("runner", SUCCESS_RUNNER);

    let report = engine(host.config(nsjail, runner)).execute_script(MAIN_SCRIPT).await;

    let ExecutionOutcome::Failure { error } = &report.outcome else {
        panic!("expected failure, got {:?}", report.outcome);
    };
    assert_eq!(error.code, ErrorCode::EmptyOutput);
    let stderr = error.details.as_ref().unwrap()["stderr"].as_str().unwrap();
    assert!(stderr.contains("Operation not permitted"));
    assert_eq!(report.tier, Some(SandboxTier::Compatibility));
    assert_eq!(host.invocations().len(), 2);
}

#[tokio::test]
async fn test_host_unsupported_falls_back_to_direct() {
    let _serial = SERIAL.lock().await;
    let host = FakeHost::new();
    let nsjail = host.script(
        "nsjail",
        r#"
echo "[F] Couldn't launch the child process" >&2
exit 255
"#,
    );
    let runner = host.script("runner", SUCCESS_RUNNER);

    let report = engine(host.config(nsjail, runner)).execute_script(MAIN_SCRIPT).await;

    assert!(report.outcome.is_success(), "{:?}", report.outcome);
    assert_eq!(report.tier, Some(SandboxTier::Direct));
    let calls = host.invocations();
    assert_eq!(calls.len(), 2, "{calls:?}");
    assert!(calls[1].starts_with("runner "));
    host.assert_no_workdirs_left();
}

#[tokio::test]
async fn test_missing_nsjail_falls_back_to_direct() {
    let _serial = SERIAL.lock().await;
    let host = FakeHost::new();
    let runner = host.script("runner", SUCCESS_RUNNER);

    let report = engine(host.config(host.path().join("no-nsjail"), runner))
        .execute_script(MAIN_SCRIPT)
        .await;

    assert!(report.outcome.is_success(), "{:?}", report.outcome);
    assert_eq!(report.tier, Some(SandboxTier::Direct));
}

#[tokio::test]
async fn test_direct_disabled_is_internal_error() {
    let _serial = SERIAL.lock().await;
    let host = FakeHost::new();
    let runner = host.script("runner", SUCCESS_RUNNER);
    let config = ExecConfig {
        allow_direct_fallback: false,
        ..host.config(host.path().join("no-nsjail"), runner)
    };

    let report = engine(config).execute_script(MAIN_SCRIPT).await;

    assert_eq!(error_code(&report.outcome), ErrorCode::ExecutionError);
    assert!(host.invocations().is_empty());
    host.assert_no_workdirs_left();
}

#[tokio::test]
async fn test_missing_runner_in_direct_is_internal_error() {
    let _serial = SERIAL.lock().await;
    let host = FakeHost::new();

    let report = engine(host.config(host.path().join("no-nsjail"), host.path().join("no-runner")))
        .execute_script(MAIN_SCRIPT)
        .await;

    assert_eq!(error_code(&report.outcome), ErrorCode::ExecutionError);
    assert_eq!(report.tier, Some(SandboxTier::Direct));
    host.assert_no_workdirs_left();
}

#[tokio::test]
async fn test_force_compat_starts_in_compat() {
    let _serial = SERIAL.lock().await;
    let host = FakeHost::new();
    let nsjail = host.script("nsjail", PASSTHROUGH_NSJAIL);
    let runner = host.script("runner", SUCCESS_RUNNER);
    let config = ExecConfig {
        force_compat: true,
        ..host.config(nsjail, runner)
    };

    let report = engine(config).execute_script(MAIN_SCRIPT).await;

    assert!(report.outcome.is_success());
    assert_eq!(report.tier, Some(SandboxTier::Compatibility));
    let calls = host.invocations();
    assert!(!calls[0].contains("--iface_no_lo"));
    assert!(calls[0].contains("--disable_clone_newns"));
}

// ============= Runner failures are never escalated =============

#[tokio::test]
async fn test_runner_failure_with_launch_markers_is_not_escalated() {
    let _serial = SERIAL.lock().await;
    let host = FakeHost::new();
    let nsjail = host.script("nsjail", PASSTHROUGH_NSJAIL);
    let runner = host.script(
        "runner",
        r#"
echo "Couldn't launch the child process" >&2
echo '{"error": {"code": "EXCEPTION", "message": "boom", "details": {"trace": "tb"}}}'
exit 1
"#,
    );

    let report = engine(host.config(nsjail, runner)).execute_script(MAIN_SCRIPT).await;

    let ExecutionOutcome::Failure { error } = &report.outcome else {
        panic!("expected failure");
    };
    assert_eq!(error.code, ErrorCode::Exception);
    assert_eq!(error.message, "boom");
    assert_eq!(report.tier, Some(SandboxTier::Strict));
    assert_eq!(host.invocations().len(), 2);
}

#[tokio::test]
async fn test_multiline_runner_output_is_protocol_violation() {
    let _serial = SERIAL.lock().await;
    let host = FakeHost::new();
    let nsjail = host.script("nsjail", PASSTHROUGH_NSJAIL);
    let runner = host.script(
        "runner",
        r#"
echo '{"result": 1, "stdout": ""}'
echo '{"result": 2, "stdout": ""}'
"#,
    );

    let report = engine(host.config(nsjail, runner)).execute_script(MAIN_SCRIPT).await;

    assert_eq!(error_code(&report.outcome), ErrorCode::BadRunnerOutput);
}

// ============= Timeout =============

#[tokio::test]
async fn test_timeout_reports_and_cleans_up() {
    let _serial = SERIAL.lock().await;
    let host = FakeHost::new();
    let nsjail = host.script("nsjail", PASSTHROUGH_NSJAIL);
    let runner = host.script("runner", "sleep 30\n");

    let started = std::time::Instant::now();
    let report = engine(host.config(nsjail, runner)).execute_script(MAIN_SCRIPT).await;

    assert_eq!(
        serde_json::to_value(&report.outcome).unwrap(),
        json!({"error": {"code": "TIMEOUT", "message": "Execution exceeded time limit"}})
    );
    assert_eq!(report.tier, Some(SandboxTier::Strict));
    // time limit 1s + 2s grace, with slack for slow machines
    assert!(started.elapsed() < std::time::Duration::from_secs(15));
    assert_eq!(host.invocations().len(), 2, "timeouts are never escalated");
    host.assert_no_workdirs_left();
}
