//! Classification of failed attempts into launch-failure classes.
//!
//! Escalation is driven purely by [`LaunchFailure`] values, so swapping the
//! isolation tool (or its diagnostics) means swapping the detector, never the
//! tier transitions.

use super::types::{LaunchFailure, RunOutput};

/// Decides whether a finished attempt failed to launch the runner at all.
pub trait LaunchFailureDetector: Send + Sync {
    /// `None` means the runner started and its output is the outcome.
    fn classify(&self, output: &RunOutput) -> Option<LaunchFailure>;
}

/// All of these must appear for a namespace refusal.
const NAMESPACE_DENIED_MARKERS: &[&str] = &["clone(", "Operation not permitted"];

/// Any of these means nsjail cannot work on this host.
const HOST_UNSUPPORTED_PATTERNS: &[&str] = &[
    // Capability handling missing from the kernel or runtime
    "PR_CAP_AMBIENT",
    // rlimit nsjail always sets, refused by some container runtimes
    "RLIMIT_RTPRIO",
    "Couldn't launch the child process",
];

/// Detector for nsjail's stderr diagnostics.
///
/// Only attempts that exited non-zero without writing anything to stdout are
/// inspected: any stdout text means the runner started, and user code could
/// otherwise print these markers to stderr to force a weaker tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct NsjailDiagnostics;

impl LaunchFailureDetector for NsjailDiagnostics {
    fn classify(&self, output: &RunOutput) -> Option<LaunchFailure> {
        if output.success() || !output.stdout.trim().is_empty() {
            return None;
        }
        classify_stderr(&output.stderr)
    }
}

/// Classify nsjail stderr text on its own.
pub fn classify_stderr(stderr: &str) -> Option<LaunchFailure> {
    if NAMESPACE_DENIED_MARKERS
        .iter()
        .all(|marker| stderr.contains(marker))
    {
        return Some(LaunchFailure::NamespaceDenied);
    }
    if HOST_UNSUPPORTED_PATTERNS
        .iter()
        .any(|pattern| stderr.contains(pattern))
    {
        return Some(LaunchFailure::HostUnsupported);
    }
    None
}
