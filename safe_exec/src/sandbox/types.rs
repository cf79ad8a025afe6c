use std::fmt;
use std::process::ExitStatus;

/// Isolation strength of one attempt, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SandboxTier {
    /// Full nsjail namespace and process isolation.
    Strict,
    /// nsjail with the `clone(2)` namespace flags the host refuses turned off.
    Compatibility,
    /// The runner without any isolation wrapper; rlimits only.
    Direct,
}

impl SandboxTier {
    pub fn as_str(self) -> &'static str {
        match self {
            SandboxTier::Strict => "strict",
            SandboxTier::Compatibility => "compat",
            SandboxTier::Direct => "direct",
        }
    }

    pub fn uses_nsjail(self) -> bool {
        !matches!(self, SandboxTier::Direct)
    }
}

impl fmt::Display for SandboxTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an attempt never got the runner going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchFailure {
    /// The host refused to create one of the requested namespaces.
    NamespaceDenied,
    /// nsjail started but cannot work on this host at all.
    HostUnsupported,
    /// The program for this tier does not exist.
    ToolMissing,
}

/// What one finished attempt left behind.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}
