//! Embedded interpreter side of the runner.
//!
//! The script is compiled from source into a fresh `user_script` module with no
//! package context, after `sys.path` has been scrubbed of the empty entry and the
//! current directory. Module-level code and `main()` both run with `sys.stdout`
//! pointed at an in-memory buffer, so user output can never reach the verdict
//! channel.

use pyo3::prelude::*;
use pyo3::types::{IntoPyDict, PyModule, PyString};
use safe_exec_common::text::truncate_with_marker;
use safe_exec_common::{ErrorBody, ErrorCode, PYTHON_GRAMMAR, Verdict};
use serde_json::Value;
use std::path::Path;

const MODULE_NAME: &str = "user_script";
const TRACEBACK_LIMIT: usize = 3;

/// Failures reported back to the service.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("{0}")]
    Import(String),

    #[error("Function main() not found")]
    NoMain,

    #[error("main is not callable")]
    InvalidMain,

    #[error("{message}")]
    Exception { message: String, trace: String },

    #[error("main() must return JSON-serializable value")]
    NonJsonReturn,

    #[error("Could not read captured output: {0}")]
    Capture(String),

    #[error("Interpreter setup failed: {0}")]
    Setup(String),
}

impl RunnerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RunnerError::Import(_) => ErrorCode::ImportError,
            RunnerError::NoMain => ErrorCode::NoMain,
            RunnerError::InvalidMain => ErrorCode::InvalidMain,
            RunnerError::Exception { .. } => ErrorCode::Exception,
            RunnerError::NonJsonReturn => ErrorCode::NonJsonReturn,
            RunnerError::Capture(_) | RunnerError::Setup(_) => ErrorCode::ExecutionError,
        }
    }

    pub fn into_verdict(self) -> Verdict {
        let body = ErrorBody::new(self.code(), self.to_string());
        let body = match self {
            RunnerError::Exception { trace, .. } => body.with_detail("trace", trace),
            _ => body,
        };
        Verdict::from_error(body)
    }
}

impl From<PyErr> for RunnerError {
    fn from(err: PyErr) -> Self {
        RunnerError::Setup(err.to_string())
    }
}

/// Execute the script at `path` and produce its verdict.
pub fn run_script(path: &Path, stdout_cap: usize) -> Verdict {
    pyo3::prepare_freethreaded_python();
    Python::with_gil(|py| match execute(py, path, stdout_cap) {
        Ok(verdict) => verdict,
        Err(err) => err.into_verdict(),
    })
}

fn execute(py: Python<'_>, path: &Path, stdout_cap: usize) -> Result<Verdict, RunnerError> {
    let source = std::fs::read_to_string(path).map_err(|e| RunnerError::Import(e.to_string()))?;
    let filename = path.to_string_lossy().into_owned();

    let sys = py.import_bound("sys")?;
    warn_on_grammar_mismatch(&sys)?;
    scrub_sys_path(&sys)?;

    let capture = py.import_bound("io")?.getattr("StringIO")?.call0()?;
    let real_stdout = sys.getattr("stdout")?;
    sys.setattr("stdout", &capture)?;
    let called = load_and_call(py, &sys, &source, &filename);
    sys.setattr("stdout", real_stdout)?;
    let result = called?;

    let captured: String = capture
        .call_method0("getvalue")
        .and_then(|value| value.extract())
        .map_err(|err| RunnerError::Capture(exception_message(py, &err)))?;
    let stdout = truncate_with_marker(&captured, stdout_cap).into_owned();

    let value = to_json(py, &result)?;
    Ok(Verdict::success(value, stdout))
}

/// The service validated the script against [`PYTHON_GRAMMAR`]; say so on
/// stderr when this interpreter speaks a different version.
fn warn_on_grammar_mismatch(sys: &Bound<'_, PyModule>) -> PyResult<()> {
    let info = sys.getattr("version_info")?;
    let running: (u32, u32) = (
        info.getattr("major")?.extract()?,
        info.getattr("minor")?.extract()?,
    );
    if running != PYTHON_GRAMMAR {
        eprintln!(
            "safe_exec_runner: interpreter is Python {}.{} but scripts are validated against the {}.{} grammar",
            running.0, running.1, PYTHON_GRAMMAR.0, PYTHON_GRAMMAR.1
        );
    }
    Ok(())
}

/// Drop `""`, `"."` and the working directory from `sys.path`.
fn scrub_sys_path(sys: &Bound<'_, PyModule>) -> PyResult<()> {
    let cwd = std::env::current_dir()
        .map(|dir| dir.to_string_lossy().into_owned())
        .unwrap_or_default();
    let entries: Vec<String> = sys.getattr("path")?.extract()?;
    let scrubbed: Vec<String> = entries
        .into_iter()
        .filter(|entry| !entry.is_empty() && entry != "." && *entry != cwd)
        .collect();
    sys.setattr("path", scrubbed)
}

fn load_and_call<'py>(
    py: Python<'py>,
    sys: &Bound<'py, PyModule>,
    source: &str,
    filename: &str,
) -> Result<Bound<'py, PyAny>, RunnerError> {
    let module = PyModule::new_bound(py, MODULE_NAME)?;
    module.setattr("__package__", py.None())?;
    module.setattr("__file__", filename)?;
    sys.getattr("modules")?.set_item(MODULE_NAME, &module)?;

    let builtins = py.import_bound("builtins")?;
    builtins
        .getattr("compile")
        .and_then(|compile| compile.call1((source, filename, "exec")))
        .and_then(|code| builtins.getattr("exec")?.call1((code, module.dict())))
        .map_err(|err| RunnerError::Import(exception_message(py, &err)))?;

    if !module.hasattr("main")? {
        return Err(RunnerError::NoMain);
    }
    let main = module.getattr("main")?;
    if !main.is_callable() {
        return Err(RunnerError::InvalidMain);
    }

    main.call0().map_err(|err| RunnerError::Exception {
        message: exception_message(py, &err),
        trace: format_traceback(py, &err),
    })
}

/// Serialize through `json.dumps(allow_nan=False)` and parse the text back.
///
/// `serde_json` keeps number literals verbatim, so integers past 64 bits and
/// floats come back digit for digit.
fn to_json(py: Python<'_>, value: &Bound<'_, PyAny>) -> Result<Value, RunnerError> {
    let kwargs = [("allow_nan", false)].into_py_dict_bound(py);
    let text: String = py
        .import_bound("json")?
        .getattr("dumps")?
        .call((value,), Some(&kwargs))
        .and_then(|dumped| dumped.extract())
        .map_err(|_| RunnerError::NonJsonReturn)?;
    serde_json::from_str(&text).map_err(|_| RunnerError::NonJsonReturn)
}

/// `str(exc)`, falling back to the full error description.
fn exception_message(py: Python<'_>, err: &PyErr) -> String {
    err.value_bound(py)
        .str()
        .map(|message| message.to_string_lossy().into_owned())
        .unwrap_or_else(|_| err.to_string())
}

fn format_traceback(py: Python<'_>, err: &PyErr) -> String {
    let formatted = || -> PyResult<String> {
        let kwargs = [("limit", TRACEBACK_LIMIT)].into_py_dict_bound(py);
        let lines = py.import_bound("traceback")?.getattr("format_exception")?.call(
            (
                err.get_type_bound(py),
                err.value_bound(py),
                err.traceback_bound(py),
            ),
            Some(&kwargs),
        )?;
        PyString::new_bound(py, "")
            .call_method1("join", (lines,))?
            .extract()
    };
    formatted().unwrap_or_else(|_| err.to_string())
}
