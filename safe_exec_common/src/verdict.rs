//! The runner verdict: exactly one JSON line on the runner's real stdout.
//!
//! A success line carries the JSON value `main()` returned plus whatever the
//! script printed. A failure line carries an [`ErrorBody`]. The two shapes never
//! overlap: a failure always has a top-level `error` key, a success never does.

use crate::error_code::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured failure payload, identical on the runner wire and in HTTP bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach one detail entry, creating the map on first use.
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Verdict {
    Failure { error: ErrorBody },
    Success { result: Value, stdout: String },
}

impl Verdict {
    pub fn success(result: Value, stdout: impl Into<String>) -> Self {
        Verdict::Success {
            result,
            stdout: stdout.into(),
        }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Verdict::Failure {
            error: ErrorBody::new(code, message),
        }
    }

    pub fn from_error(error: ErrorBody) -> Self {
        Verdict::Failure { error }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success { .. })
    }

    /// Serialize as a single line terminated by `\n`.
    ///
    /// `serde_json` escapes control characters inside strings, so the body
    /// never contains a raw newline.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Process exit status the runner should use after emitting this verdict.
    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Success { .. } => 0,
            Verdict::Failure { error } if error.code == ErrorCode::BadInvocation => 2,
            Verdict::Failure { .. } => 1,
        }
    }
}
