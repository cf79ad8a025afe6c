//! # safe_exec
//!
//! Runs untrusted Python snippets inside nsjail and returns their JSON result and
//! printed output, or a structured error from one closed vocabulary.
//!
//! ## Pipeline
//!
//! ```text
//! body ─▶ validator ─▶ workdir ─▶ tier selector ⇄ executor ─▶ translator ─▶ outcome
//!                                      ▲              │
//!                                      └── detector ◀─┘
//! ```
//!
//! - **Validation** happens before any process exists: encoding, size, NUL bytes,
//!   Python syntax and a top-level `def main`.
//! - **Tier escalation** negotiates how nsjail can run on this host: strict
//!   isolation, then a compatibility profile without the namespaces the host
//!   refuses, then (optionally) the runner alone under rlimits.
//! - **Execution** enforces a wall-clock ceiling, bounds captured output and
//!   kills the child's whole process group on expiry.
//! - **Translation** reads the runner's single verdict line and maps every
//!   anomaly to an infrastructure error code.
//!
//! ## Modules
//!
//! - **`config`**: immutable [`ExecConfig`] and its clap/env front end.
//! - **`validator`**: static checks on untrusted input.
//! - **`sandbox`**: tiers, command construction, launch-failure detection.
//! - **`executor`**: child process supervision.
//! - **`workdir`**: per-request scratch directory guard.
//! - **`translator`**: verdict line to [`ExecutionOutcome`].
//! - **`engine`**: the orchestration of all of the above.

pub mod cli;
pub mod config;
pub mod engine;
pub mod executor;
pub mod sandbox;
pub mod translator;
pub mod utils;
pub mod validator;
pub mod workdir;

pub use config::{ConfigArgs, ConfigError, ExecConfig, ResourceLimits};
pub use engine::{Engine, ExecutionReport};
pub use sandbox::SandboxTier;
pub use translator::ExecutionOutcome;
pub use validator::{ScriptLimits, ValidationError};
