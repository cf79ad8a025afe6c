//! Tier selection and escalation.
//!
//! ```text
//!            NamespaceDenied             HostUnsupported / ToolMissing
//!   Strict ------------------> Compat ------------------------------> Direct
//!     |                          |                                      |
//!     +--------------------------+---- HostUnsupported / ToolMissing ---+
//! ```
//!
//! Every other combination ends the machine. Launches are the only thing ever
//! retried; once the runner starts, its output is the outcome.

use super::error::EscalationError;
use super::types::{LaunchFailure, SandboxTier};
use crate::config::ExecConfig;

/// Where the machine goes after an attempt failed to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Escalation {
    /// Launch again in this tier.
    Retry(SandboxTier),
    /// Stop; the failed attempt's own output is the outcome.
    Settle,
    /// Stop without a usable run.
    Fail(EscalationError),
}

/// Stateless escalation policy derived from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierSelector {
    force_compat: bool,
    allow_direct_fallback: bool,
}

impl TierSelector {
    pub fn new(force_compat: bool, allow_direct_fallback: bool) -> Self {
        Self {
            force_compat,
            allow_direct_fallback,
        }
    }

    pub fn from_config(config: &ExecConfig) -> Self {
        Self::new(config.force_compat, config.allow_direct_fallback)
    }

    pub fn initial(&self) -> SandboxTier {
        if self.force_compat {
            SandboxTier::Compatibility
        } else {
            SandboxTier::Strict
        }
    }

    pub fn escalate(&self, tier: SandboxTier, failure: LaunchFailure) -> Escalation {
        match (tier, failure) {
            (SandboxTier::Strict, LaunchFailure::NamespaceDenied) => {
                Escalation::Retry(SandboxTier::Compatibility)
            }
            (SandboxTier::Compatibility, LaunchFailure::NamespaceDenied) => Escalation::Settle,
            (
                SandboxTier::Strict | SandboxTier::Compatibility,
                LaunchFailure::HostUnsupported | LaunchFailure::ToolMissing,
            ) => {
                if self.allow_direct_fallback {
                    Escalation::Retry(SandboxTier::Direct)
                } else {
                    Escalation::Fail(EscalationError::DirectFallbackDisabled)
                }
            }
            (SandboxTier::Direct, LaunchFailure::ToolMissing) => Escalation::Fail(
                EscalationError::RunnerUnavailable("runner binary not found".to_string()),
            ),
            (SandboxTier::Direct, _) => Escalation::Settle,
        }
    }
}
