//  ERRORS.rs
//
//  Description:
//!   Defines errors that occur in the `gsa-worker` crate: connecting to
//!   its dependencies at startup, and processing a delivered work item.

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};


/***** LIBRARY *****/
/// Fatal startup errors; any of these aborts the process (there is no
/// meaningful degraded mode for a worker that cannot reach its broker,
/// blackboard, or load its kernels).
#[derive(Debug)]
pub enum StartupError {
    Broker { err: gsa_shr::broker::Error },
    Blackboard { err: gsa_shr::blackboard::Error },
    KernelLoad { err: gsa_kernel::kernel::KernelError },
}

impl Display for StartupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use StartupError::*;
        match self {
            Broker { err } => write!(f, "Failed to connect to Broker: {err}"),
            Blackboard { err } => write!(f, "Failed to connect to Blackboard: {err}"),
            KernelLoad { err } => write!(f, "Failed to load a registered kernel's libraries: {err}"),
        }
    }
}

impl Error for StartupError {}



/// Errors raised while processing a single delivered analysis job. These
/// never escape the message loop; the worker logs them and moves on.
#[derive(Debug)]
pub enum ProcessError {
    /// The delivery's payload was not valid `AnalysisInput` JSON.
    MalformedPayload { err: serde_json::Error },
    /// The status record for this job was missing or unreadable.
    StatusUnavailable { job_id: String, err: gsa_shr::blackboard::Error },
    /// A Blackboard write failed (infrastructure failure).
    Blackboard { err: gsa_shr::blackboard::Error },
    /// A Broker publish failed while enqueuing a follow-up report job.
    Broker { err: gsa_shr::broker::Error },
    /// The requested method has no registered kernel.
    UnknownMethod { err: gsa_kernel::registry::Error },
    /// The inner kernel failed deterministically.
    Kernel { err: gsa_kernel::kernel::KernelError },
}

impl Display for ProcessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ProcessError::*;
        match self {
            MalformedPayload { err } => write!(f, "Failed to decode analysis work item: {err}"),
            StatusUnavailable { job_id, err } => write!(f, "Failed to read status for job '{job_id}': {err}"),
            Blackboard { err } => write!(f, "Blackboard operation failed: {err}"),
            Broker { err } => write!(f, "Broker operation failed: {err}"),
            UnknownMethod { err } => write!(f, "{err}"),
            Kernel { err } => write!(f, "{err}"),
        }
    }
}

impl Error for ProcessError {}
