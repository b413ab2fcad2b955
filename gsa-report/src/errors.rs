//  ERRORS.rs
//
//  Description:
//!   Defines errors that occur in the `gsa-report` crate: connecting to
//!   its dependencies at startup, building a single artifact, and
//!   processing a delivered report-generation job.

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



/// A single artifact's sub-step failed to produce output. Captured per
/// artifact so one failing kind never aborts the others, per the
/// partial-success policy.
#[derive(Debug)]
pub enum ArtifactError {
    Xlsx { err: String },
    Pdf { err: String },
    Smtp { err: String },
}

impl Display for ArtifactError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ArtifactError::*;
        match self {
            Xlsx { err } => write!(f, "Failed to build spreadsheet artifact: {err}"),
            Pdf { err } => write!(f, "Failed to build PDF artifact: {err}"),
            Smtp { err } => write!(f, "Failed to send e-mail notification: {err}"),
        }
    }
}

impl Error for ArtifactError {}



/// Errors raised while processing a single delivered report job. These
/// never escape the message loop; the generator logs them and moves on.
#[derive(Debug)]
pub enum ProcessError {
    /// The delivery's payload was not valid `ReportJob` JSON.
    MalformedPayload { err: serde_json::Error },
    /// The status record for this report was missing or unreadable.
    StatusUnavailable { job_id: String, err: gsa_shr::blackboard::Error },
    /// The referenced analysis result was missing or unreadable.
    ResultUnavailable { analysis_job_id: String, err: gsa_shr::blackboard::Error },
    ResultMissing { analysis_job_id: String },
    /// A Blackboard operation failed.
    Blackboard { err: gsa_shr::blackboard::Error },
}

impl Display for ProcessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ProcessError::*;
        match self {
            MalformedPayload { err } => write!(f, "Failed to decode report work item: {err}"),
            StatusUnavailable { job_id, err } => write!(f, "Failed to read status for report '{job_id}': {err}"),
            ResultUnavailable { analysis_job_id, err } => write!(f, "Failed to read analysis result '{analysis_job_id}': {err}"),
            ResultMissing { analysis_job_id } => write!(f, "Analysis result '{analysis_job_id}' does not exist"),
            Blackboard { err } => write!(f, "Blackboard operation failed: {err}"),
        }
    }
}

impl Error for ProcessError {}
