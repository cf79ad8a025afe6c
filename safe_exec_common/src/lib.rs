//! # safe_exec common vocabulary
//!
//! Types shared by both sides of the process boundary: the service that spawns
//! sandboxed children and the runner that executes inside them.
//!
//! - [`ErrorCode`]: the closed, machine-readable failure taxonomy. Validator,
//!   executor, runner and translator all report into this one vocabulary.
//! - [`Verdict`]: the single JSON line a runner writes to its real stdout.
//! - [`text`]: bounded-text helpers so no layer leaks unbounded diagnostics.

pub mod error_code;
pub mod text;
pub mod verdict;

pub use error_code::{ErrorClass, ErrorCode, UnknownErrorCode};
pub use verdict::{ErrorBody, Verdict};

/// Python grammar (major, minor) accepted by the static validator. A runner
/// embedding a different interpreter can disagree with it on newer syntax.
pub const PYTHON_GRAMMAR: (u32, u32) = (3, 11);
