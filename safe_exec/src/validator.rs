//! # Script Validation
//!
//! Static checks run on untrusted input before any process is spawned. The checks
//! run in a fixed order and the first failure wins:
//!
//! 1. the body is UTF-8 text holding a JSON object (`BAD_ENCODING`, `BAD_BODY`)
//! 2. `script` is a string (`BAD_SCRIPT`)
//! 3. the script fits the byte ceiling (`SCRIPT_TOO_LARGE`)
//! 4. the script holds no NUL byte (`BAD_INPUT`)
//! 5. the script parses as Python (`SYNTAX_ERROR`)
//! 6. the top level defines `def main` (`NO_MAIN`)
//!
//! Parsing uses `rustpython-parser`, which speaks the Python 3.11 grammar
//! ([`PYTHON_GRAMMAR`](safe_exec_common::PYTHON_GRAMMAR)). Syntax introduced
//! later, such as 3.12 nested same-quote f-strings, is a `SYNTAX_ERROR` here
//! even when the runner's interpreter would accept it; the runner warns on
//! stderr when its version differs. The AST is inspected and dropped. Nothing
//! here ever executes user code.

use rustpython_parser::{Parse, ast};
use safe_exec_common::{ErrorBody, ErrorCode};
use serde_json::Value;

/// Filename reported by the parser. Matches the module name the runner uses.
const SCRIPT_FILENAME: &str = "user_script.py";

/// Ceilings applied by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptLimits {
    pub max_script_bytes: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_script_bytes: 64 * 1024,
        }
    }
}

/// Why a request was rejected before execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Request body must be valid UTF-8")]
    BadEncoding,

    #[error("Request body must be a JSON object")]
    BadBody,

    #[error("'script' must be a string containing Python code")]
    BadScript,

    #[error("Script exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Script may not contain NUL bytes")]
    NulByte,

    #[error("{message} at line {line}:{column}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Script must define a function named main() that returns JSON")]
    NoMain,
}

impl ValidationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ValidationError::BadEncoding => ErrorCode::BadEncoding,
            ValidationError::BadBody => ErrorCode::BadBody,
            ValidationError::BadScript => ErrorCode::BadScript,
            ValidationError::TooLarge { .. } => ErrorCode::ScriptTooLarge,
            ValidationError::NulByte => ErrorCode::BadInput,
            ValidationError::Syntax { .. } => ErrorCode::SyntaxError,
            ValidationError::NoMain => ErrorCode::NoMain,
        }
    }

    pub fn to_error_body(&self) -> ErrorBody {
        let body = ErrorBody::new(self.code(), self.to_string());
        match self {
            ValidationError::Syntax { line, column, .. } => body
                .with_detail("line", *line)
                .with_detail("column", *column),
            _ => body,
        }
    }
}

impl From<ValidationError> for ErrorBody {
    fn from(err: ValidationError) -> Self {
        err.to_error_body()
    }
}

/// Validate a raw request body and return the script it carries.
pub fn validate_body(body: &[u8], limits: &ScriptLimits) -> Result<String, ValidationError> {
    let text = std::str::from_utf8(body).map_err(|_| ValidationError::BadEncoding)?;

    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) if has_lone_surrogate_escape(text) => return Err(ValidationError::BadEncoding),
        Err(_) => return Err(ValidationError::BadBody),
    };
    let Value::Object(mut object) = value else {
        return Err(ValidationError::BadBody);
    };

    let script = match object.remove("script") {
        Some(Value::String(script)) => script,
        _ => return Err(ValidationError::BadScript),
    };

    validate_script(&script, limits)?;
    Ok(script)
}

/// Validate script text that is already known to be a string.
pub fn validate_script(script: &str, limits: &ScriptLimits) -> Result<(), ValidationError> {
    if script.len() > limits.max_script_bytes {
        return Err(ValidationError::TooLarge {
            limit: limits.max_script_bytes,
        });
    }
    if script.contains('\0') {
        return Err(ValidationError::NulByte);
    }

    let suite = ast::Suite::parse(script, SCRIPT_FILENAME).map_err(|err| {
        let (line, column) = line_column(script, u32::from(err.offset) as usize);
        ValidationError::Syntax {
            message: err.error.to_string(),
            line,
            column,
        }
    })?;

    if !defines_top_level_main(&suite) {
        return Err(ValidationError::NoMain);
    }
    Ok(())
}

fn defines_top_level_main(suite: &[ast::Stmt]) -> bool {
    suite.iter().any(|stmt| match stmt {
        ast::Stmt::FunctionDef(def) => def.name.as_str() == "main",
        _ => false,
    })
}

/// 1-based line and column of a byte offset.
fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let prefix = source.get(..offset).unwrap_or(source);
    let line = prefix.matches('\n').count() + 1;
    let line_start = prefix.rfind('\n').map_or(0, |idx| idx + 1);
    let column = prefix[line_start..].chars().count() + 1;
    (line, column)
}

/// Whether JSON text carries a `\uXXXX` escape for an unpaired surrogate,
/// which has no UTF-8 representation.
fn has_lone_surrogate_escape(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut pending_high = false;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            if pending_high {
                return true;
            }
            i += 1;
            continue;
        }
        let Some(&kind) = bytes.get(i + 1) else {
            return pending_high;
        };
        if kind != b'u' {
            if pending_high {
                return true;
            }
            i += 2;
            continue;
        }
        let unit = bytes
            .get(i + 2..i + 6)
            .and_then(|hex| std::str::from_utf8(hex).ok())
            .and_then(|hex| u16::from_str_radix(hex, 16).ok());
        match unit {
            Some(0xD800..=0xDBFF) if pending_high => return true,
            Some(0xD800..=0xDBFF) => pending_high = true,
            Some(0xDC00..=0xDFFF) if pending_high => pending_high = false,
            Some(0xDC00..=0xDFFF) => return true,
            _ if pending_high => return true,
            _ => {}
        }
        i += 6;
    }
    pending_high
}
