//! # Execution Engine
//!
//! Orchestrates one request end to end:
//!
//! 1. validate the body or script ([`crate::validator`])
//! 2. materialize a [`Workdir`]
//! 3. launch the current tier and classify a failed launch, escalating through
//!    [`TierSelector`] until an attempt settles
//! 4. translate the settled attempt into an [`ExecutionOutcome`]
//!
//! The workdir guard is dropped on every path, including timeouts and launch
//! failures. The engine holds only immutable state and is shared across requests
//! behind an `Arc`.

use crate::config::ExecConfig;
use crate::executor::{Attempt, ProcessExecutor};
use crate::sandbox::{
    CommandSpec, Escalation, EscalationError, LaunchError, LaunchFailure, LaunchFailureDetector,
    NsjailDiagnostics, SandboxTier, TierSelector,
};
use crate::translator::{ExecutionOutcome, timeout_outcome, translate_output};
use crate::validator::{validate_body, validate_script};
use crate::workdir::Workdir;
use safe_exec_common::{ErrorBody, ErrorCode};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Result of one request, with the tier whose run produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub outcome: ExecutionOutcome,
    /// `None` when the request never reached a sandbox.
    pub tier: Option<SandboxTier>,
}

impl ExecutionReport {
    fn rejected(outcome: ExecutionOutcome) -> Self {
        Self {
            outcome,
            tier: None,
        }
    }
}

pub struct Engine {
    config: Arc<ExecConfig>,
    selector: TierSelector,
    executor: ProcessExecutor,
    detector: Arc<dyn LaunchFailureDetector>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(config: Arc<ExecConfig>) -> Self {
        Self {
            selector: TierSelector::from_config(&config),
            executor: ProcessExecutor::new(config.wall_timeout(), config.max_capture_bytes),
            detector: Arc::new(NsjailDiagnostics),
            config,
        }
    }

    /// Replace the launch-failure detector.
    pub fn with_detector(mut self, detector: Arc<dyn LaunchFailureDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Validate a raw request body and execute the script it carries.
    pub async fn execute_body(&self, body: &[u8]) -> ExecutionReport {
        match validate_body(body, &self.config.script_limits) {
            Ok(script) => self.run_validated(&script).await,
            Err(err) => {
                debug!("Rejected request body: {}", err);
                ExecutionReport::rejected(ExecutionOutcome::failure(err.into()))
            }
        }
    }

    /// Validate and execute script text.
    pub async fn execute_script(&self, script: &str) -> ExecutionReport {
        match validate_script(script, &self.config.script_limits) {
            Ok(()) => self.run_validated(script).await,
            Err(err) => {
                debug!("Rejected script: {}", err);
                ExecutionReport::rejected(ExecutionOutcome::failure(err.into()))
            }
        }
    }

    async fn run_validated(&self, script: &str) -> ExecutionReport {
        let started = Instant::now();
        let workdir = match Workdir::create(&self.config.workdir_root, script) {
            Ok(workdir) => workdir,
            Err(e) => {
                error!(
                    "Failed to prepare workdir under {:?}: {}",
                    self.config.workdir_root, e
                );
                return ExecutionReport::rejected(internal_error("Failed to prepare workdir"));
            }
        };
        let request_id = workdir.id();

        let (outcome, tier) = self.escalate(&workdir).await;
        drop(workdir);

        info!(
            %request_id,
            tier = tier.map(SandboxTier::as_str).unwrap_or("none"),
            code = outcome.error_code().map(ErrorCode::as_str).unwrap_or("OK"),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Execution finished"
        );
        ExecutionReport { outcome, tier }
    }

    /// Run the tier machine until an attempt settles or it gives up.
    async fn escalate(&self, workdir: &Workdir) -> (ExecutionOutcome, Option<SandboxTier>) {
        let request_id = workdir.id();
        let mut tier = self.selector.initial();
        loop {
            let spec = CommandSpec::for_tier(
                tier,
                &self.config,
                workdir.script_path(),
                workdir.path(),
            );
            let failure = match self.executor.run(&spec).await {
                Ok(Attempt::TimedOut { elapsed }) => {
                    warn!(%request_id, %tier, ?elapsed, "Execution timed out");
                    return (timeout_outcome(), Some(tier));
                }
                Ok(Attempt::Exited(output)) => match self.detector.classify(&output) {
                    None => {
                        return (translate_output(&output.stdout, &output.stderr), Some(tier));
                    }
                    Some(failure) => {
                        debug!(
                            %request_id,
                            %tier,
                            ?failure,
                            stderr = %output.stderr.trim(),
                            "Launch failed"
                        );
                        match self.selector.escalate(tier, failure) {
                            Escalation::Settle => {
                                return (
                                    translate_output(&output.stdout, &output.stderr),
                                    Some(tier),
                                );
                            }
                            other => other,
                        }
                    }
                },
                Err(LaunchError::ProgramNotFound { program }) => {
                    debug!(%request_id, %tier, ?program, "Launch program not found");
                    self.selector.escalate(tier, LaunchFailure::ToolMissing)
                }
                Err(e) => Escalation::Fail(EscalationError::LaunchFailed(e.to_string())),
            };

            match failure {
                Escalation::Retry(next) => {
                    info!(%request_id, from = %tier, to = %next, "Escalating sandbox tier");
                    tier = next;
                }
                Escalation::Settle => {
                    // Only reachable for a missing program, which has no output.
                    return (internal_error("Sandbox launch failed"), Some(tier));
                }
                Escalation::Fail(reason) => {
                    error!(%request_id, %tier, "Execution could not start: {}", reason);
                    return (internal_error(&reason.to_string()), Some(tier));
                }
            }
        }
    }
}

fn internal_error(message: &str) -> ExecutionOutcome {
    ExecutionOutcome::failure(ErrorBody::new(ErrorCode::ExecutionError, message))
}
