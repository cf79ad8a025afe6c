//! # Response Translation
//!
//! Turns what an attempt left behind into an [`ExecutionOutcome`]. This is the
//! only place that reads the runner's verdict line, and it treats that line as
//! untrusted: anything other than exactly one JSON line is a protocol failure
//! reported as an infrastructure error, never as a user error.

use safe_exec_common::text::{DIAGNOSTIC_SNIPPET_CHARS, head_chars, tail_chars};
use safe_exec_common::{ErrorBody, ErrorCode};
use serde::Serialize;
use serde_json::{Map, Value};

pub const TIMEOUT_MESSAGE: &str = "Execution exceeded time limit";
const DEFAULT_FAILURE_MESSAGE: &str = "Execution failed";

/// What the caller of the pipeline sees.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExecutionOutcome {
    Success { result: Value, stdout: String },
    Failure { error: ErrorBody },
}

impl ExecutionOutcome {
    pub fn failure(error: ErrorBody) -> Self {
        ExecutionOutcome::Failure { error }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            ExecutionOutcome::Success { .. } => None,
            ExecutionOutcome::Failure { error } => Some(error.code),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }
}

pub fn timeout_outcome() -> ExecutionOutcome {
    ExecutionOutcome::failure(ErrorBody::new(ErrorCode::Timeout, TIMEOUT_MESSAGE))
}

/// Translate a finished attempt's captured streams.
pub fn translate_output(stdout: &str, stderr: &str) -> ExecutionOutcome {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return ExecutionOutcome::failure(
            ErrorBody::new(ErrorCode::EmptyOutput, "No output produced by runner")
                .with_detail("stderr", tail_chars(stderr, DIAGNOSTIC_SNIPPET_CHARS)),
        );
    }

    let lines = trimmed.lines().filter(|line| !line.trim().is_empty()).count();
    if lines > 1 {
        return ExecutionOutcome::failure(
            ErrorBody::new(
                ErrorCode::BadRunnerOutput,
                "Runner produced more than one output line",
            )
            .with_detail("stdout", head_chars(trimmed, DIAGNOSTIC_SNIPPET_CHARS))
            .with_detail("lines", lines),
        );
    }

    let payload: Value = match serde_json::from_str(trimmed) {
        Ok(payload) => payload,
        Err(_) => return non_json(trimmed),
    };
    let Value::Object(mut payload) = payload else {
        return non_json(trimmed);
    };

    if let Some(error) = payload.remove("error") {
        return ExecutionOutcome::failure(error_body_from(error));
    }

    ExecutionOutcome::Success {
        result: payload.remove("result").unwrap_or(Value::Null),
        stdout: match payload.remove("stdout") {
            Some(Value::String(stdout)) => stdout,
            _ => String::new(),
        },
    }
}

fn non_json(trimmed: &str) -> ExecutionOutcome {
    ExecutionOutcome::failure(
        ErrorBody::new(ErrorCode::BadRunnerOutput, "Runner produced non-JSON output")
            .with_detail("stdout", head_chars(trimmed, DIAGNOSTIC_SNIPPET_CHARS)),
    )
}

/// Read a runner error object leniently, filling in what is missing.
fn error_body_from(error: Value) -> ErrorBody {
    let mut error = match error {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let code = error
        .get("code")
        .and_then(Value::as_str)
        .and_then(|code| code.parse::<ErrorCode>().ok())
        .unwrap_or(ErrorCode::ExecutionError);
    let message = match error.remove("message") {
        Some(Value::String(message)) => message,
        _ => DEFAULT_FAILURE_MESSAGE.to_string(),
    };
    let details = match error.remove("details") {
        Some(Value::Object(details)) => Some(details),
        _ => None,
    };
    ErrorBody {
        code,
        message,
        details,
    }
}
