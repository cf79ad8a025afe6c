use std::path::PathBuf;

/// Errors raised while starting or supervising a child process.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Program '{program:?}' not found")]
    ProgramNotFound { program: PathBuf },

    #[error("Failed to spawn '{program:?}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for child process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Failed to read child output: {0}")]
    Capture(#[source] std::io::Error),
}

impl LaunchError {
    pub(crate) fn from_spawn(program: PathBuf, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            LaunchError::ProgramNotFound { program }
        } else {
            LaunchError::Spawn { program, source }
        }
    }
}

/// Why the tier machine gave up without a usable run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EscalationError {
    #[error("Sandbox could not start and direct fallback is disabled")]
    DirectFallbackDisabled,

    #[error("Runner could not be started: {0}")]
    RunnerUnavailable(String),

    #[error("Sandbox launch failed: {0}")]
    LaunchFailed(String),
}
