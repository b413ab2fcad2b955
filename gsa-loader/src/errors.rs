//  ERRORS.rs
//
//  Description:
//!   Defines errors that occur in the `gsa-loader` crate: connecting to
//!   its dependencies at startup, and processing a delivered load job.

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};


/***** LIBRARY *****/
/// Fatal startup errors; any of these aborts the process.
#[derive(Debug)]
pub enum StartupError {
    Broker { err: gsa_shr::broker::Error },
    Blackboard { err: gsa_shr::blackboard::Error },
}

impl Display for StartupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use StartupError::*;
        match self {
            Broker { err } => write!(f, "Failed to connect to Broker: {err}"),
            Blackboard { err } => write!(f, "Failed to connect to Blackboard: {err}"),
        }
    }
}

impl Error for StartupError {}



/// Errors raised while processing a single delivered dataset load job. These
/// never escape the message loop; the loader logs them and moves on.
#[derive(Debug)]
pub enum ProcessError {
    /// The delivery's payload was not valid `DatasetLoadJob` JSON.
    MalformedPayload { err: serde_json::Error },
    /// The status record for this load was missing or unreadable.
    StatusUnavailable { loading_id: String, err: gsa_shr::blackboard::Error },
    /// A Blackboard operation failed.
    Blackboard { err: gsa_shr::blackboard::Error },
    /// Fetching the dataset from its source failed after exhausting retries.
    Fetch { attempts: usize, err: crate::fetcher::FetchError },
    /// The fetched matrix could not be parsed during the `converting` step.
    MalformedMatrix { err: gsa_kernel::kernel::KernelError },
}

impl Display for ProcessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ProcessError::*;
        match self {
            MalformedPayload { err } => write!(f, "Failed to decode dataset load work item: {err}"),
            StatusUnavailable { loading_id, err } => write!(f, "Failed to read status for load '{loading_id}': {err}"),
            Blackboard { err } => write!(f, "Blackboard operation failed: {err}"),
            Fetch { attempts, err } => write!(f, "{err} (after {attempts} attempt(s))"),
            MalformedMatrix { err } => write!(f, "{err}"),
        }
    }
}

impl Error for ProcessError {}
