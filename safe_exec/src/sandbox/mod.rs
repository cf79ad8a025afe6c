//! # Sandbox Tiers
//!
//! Negotiates *whether and how* nsjail can be used on the current host. It never
//! implements isolation itself.
//!
//! ## Tiers
//!
//! - **Strict**: nsjail with full namespace isolation, no loopback, rlimits and an
//!   unprivileged uid/gid.
//! - **Compatibility**: the same minus the namespaces the host refuses to create.
//! - **Direct**: the runner alone, for hosts where nsjail cannot start at all.
//!   The executor still applies the rlimits itself. Can be disabled.
//!
//! ## Architecture
//!
//! - [`CommandSpec`] describes one attempt for a given tier.
//! - [`LaunchFailureDetector`] turns a failed attempt into a [`LaunchFailure`].
//! - [`TierSelector`] maps `(tier, failure)` to the next step.

mod command;
mod detector;
mod error;
mod tier;
mod types;

pub use command::CommandSpec;
pub use detector::{LaunchFailureDetector, NsjailDiagnostics, classify_stderr};
pub use error::{EscalationError, LaunchError};
pub use tier::{Escalation, TierSelector};
pub use types::{LaunchFailure, RunOutput, SandboxTier};
