//! The closed failure vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every failure the service can report, on any layer.
///
/// Serialized as `SCREAMING_SNAKE_CASE` strings (`"NO_MAIN"`, `"TIMEOUT"`, ...),
/// which is also the form used on the wire between runner and service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadContentType,
    BadBody,
    BadScript,
    BadEncoding,
    BadInput,
    ScriptTooLarge,
    SyntaxError,
    NoMain,
    Timeout,
    EmptyOutput,
    ImportError,
    InvalidMain,
    Exception,
    NonJsonReturn,
    BadRunnerOutput,
    ExecutionError,
    BadInvocation,
}

/// Coarse grouping used to tell "your code is wrong" apart from
/// "the service could not run it".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request itself was not acceptable (wrong media type).
    Request,
    /// Rejected before any process was spawned.
    Validation,
    /// The submitted script misbehaved inside the sandbox.
    UserCode,
    /// The wall-clock ceiling was hit.
    Timeout,
    /// The service could not run the script or understand the runner.
    Infrastructure,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 17] = [
        ErrorCode::BadContentType,
        ErrorCode::BadBody,
        ErrorCode::BadScript,
        ErrorCode::BadEncoding,
        ErrorCode::BadInput,
        ErrorCode::ScriptTooLarge,
        ErrorCode::SyntaxError,
        ErrorCode::NoMain,
        ErrorCode::Timeout,
        ErrorCode::EmptyOutput,
        ErrorCode::ImportError,
        ErrorCode::InvalidMain,
        ErrorCode::Exception,
        ErrorCode::NonJsonReturn,
        ErrorCode::BadRunnerOutput,
        ErrorCode::ExecutionError,
        ErrorCode::BadInvocation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadContentType => "BAD_CONTENT_TYPE",
            ErrorCode::BadBody => "BAD_BODY",
            ErrorCode::BadScript => "BAD_SCRIPT",
            ErrorCode::BadEncoding => "BAD_ENCODING",
            ErrorCode::BadInput => "BAD_INPUT",
            ErrorCode::ScriptTooLarge => "SCRIPT_TOO_LARGE",
            ErrorCode::SyntaxError => "SYNTAX_ERROR",
            ErrorCode::NoMain => "NO_MAIN",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::EmptyOutput => "EMPTY_OUTPUT",
            ErrorCode::ImportError => "IMPORT_ERROR",
            ErrorCode::InvalidMain => "INVALID_MAIN",
            ErrorCode::Exception => "EXCEPTION",
            ErrorCode::NonJsonReturn => "NON_JSON_RETURN",
            ErrorCode::BadRunnerOutput => "BAD_RUNNER_OUTPUT",
            ErrorCode::ExecutionError => "EXECUTION_ERROR",
            ErrorCode::BadInvocation => "BAD_INVOCATION",
        }
    }

    pub fn class(self) -> ErrorClass {
        match self {
            ErrorCode::BadContentType => ErrorClass::Request,
            ErrorCode::BadBody
            | ErrorCode::BadScript
            | ErrorCode::BadEncoding
            | ErrorCode::BadInput
            | ErrorCode::ScriptTooLarge
            | ErrorCode::SyntaxError
            | ErrorCode::NoMain => ErrorClass::Validation,
            ErrorCode::ImportError
            | ErrorCode::InvalidMain
            | ErrorCode::Exception
            | ErrorCode::NonJsonReturn => ErrorClass::UserCode,
            ErrorCode::Timeout => ErrorClass::Timeout,
            ErrorCode::EmptyOutput
            | ErrorCode::BadRunnerOutput
            | ErrorCode::ExecutionError
            | ErrorCode::BadInvocation => ErrorClass::Infrastructure,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown error code '{0}'")]
pub struct UnknownErrorCode(pub String);

impl FromStr for ErrorCode {
    type Err = UnknownErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCode::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownErrorCode(s.to_string()))
    }
}
