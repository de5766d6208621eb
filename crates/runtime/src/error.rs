//! Error types for the runtime crate

use thiserror::Error;

/// Faults propagated out of the bootstrap stages and the module's run step
///
/// Every kind is handled the same way by the invocation loop; the variants
/// exist so the log site can say which stage failed. Budget exhaustion is
/// deliberately absent: it is a guard outcome of the staged loader
/// (`StepOutcome::Deferred`), not a failure.
#[derive(Debug, Clone, Error)]
pub enum Fault {
    #[error("module artifact fetch failed: {reason}")]
    Fetch { reason: String },

    #[error("module compile failed: {reason}")]
    Compile { reason: String },

    #[error("module instantiation failed: {reason}")]
    Instantiate { reason: String },

    #[error("logging setup failed: {reason}")]
    LoggingSetup { reason: String },

    #[error("run step failed: {reason}")]
    Runtime { reason: String },
}

/// Result type alias for fault-propagating operations
pub type FaultResult<T> = Result<T, Fault>;
