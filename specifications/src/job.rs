//  JOB.rs
//
//  Description:
//!   Defines the `Job` entity and its status record: the thing the
//!   Blackboard stores under `status:{job_id}` and that the API,
//!   workers and stall sweeper all read and mutate.

use std::fmt::{Display, Formatter, Result as FResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};


/***** ERRORS *****/
/// Errors that relate to status transitions.
#[derive(Debug)]
pub enum TransitionError {
    /// Attempted to transition out of a terminal state.
    AlreadyTerminal { job_id: String, state: JobState },
    /// Attempted to decrease progress while running.
    ProgressRegression { job_id: String, from: f64, to: f64 },
}

impl Display for TransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use TransitionError::*;
        match self {
            AlreadyTerminal { job_id, state } => write!(f, "Job '{job_id}' is already in terminal state '{state}'; no further transitions are allowed"),
            ProgressRegression { job_id, from, to } => write!(f, "Job '{job_id}' progress would regress from {from} to {to}; progress must be nondecreasing while running"),
        }
    }
}

impl std::error::Error for TransitionError {}



/***** LIBRARY *****/
/// The kind of job, which determines which queue it travels on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, StrumDisplay, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobKind {
    Analysis,
    Dataset,
    Report,
}

impl JobKind {
    /// Returns the Blackboard counter key and job-id prefix for this kind.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            JobKind::Analysis => "Analysis",
            JobKind::Dataset => "Load",
            JobKind::Report => "Report",
        }
    }

    /// Returns the name of the Broker queue this kind of job travels on.
    pub fn queue_name(&self) -> &'static str {
        match self {
            JobKind::Analysis => "analysis",
            JobKind::Dataset => "dataset",
            JobKind::Report => "report",
        }
    }
}

/// The lifecycle state of a job. Monotone: `running -> {complete, failed}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, StrumDisplay, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobState {
    Running,
    Complete,
    Failed,
}

impl JobState {
    /// Returns whether this state is terminal (no further transitions allowed).
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed)
    }
}

/// The status record stored under `status:{job_id}` on the Blackboard.
///
/// This is the sole authority on a job's lifecycle; the API, the owning
/// worker and the stall sweeper are the only writers, and every write
/// goes through `Blackboard::compare_and_set` so that concurrent retries
/// on the same `job_id` cannot observe a rollback.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StatusRecord {
    /// The job's opaque, globally-unique identifier.
    pub id: String,
    /// Which queue produced this job.
    pub kind: JobKind,
    /// When the job was admitted.
    pub created_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub state: JobState,
    /// Fraction complete in `[0, 1]`. Nondecreasing while `running`.
    pub progress: f64,
    /// Human-readable status line (e.g. "queued", "Starting analysis", a kernel error message).
    pub description: String,
    /// Opaque reference to the queued work item, for diagnostics.
    pub payload_ref: Option<String>,
    /// Present once `state == complete`: the key under which the result blob lives.
    pub result_ref: Option<String>,
    /// Present once `state == failed`: the error that caused the failure.
    pub error: Option<String>,
    /// Timestamp of the last progress update, used by the stall sweeper.
    pub last_update: DateTime<Utc>,
}

impl StatusRecord {
    /// Seeds a freshly-admitted, `running` status record with zero progress.
    pub fn seed(id: impl Into<String>, kind: JobKind, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            kind,
            created_at: now,
            state: JobState::Running,
            progress: 0.0,
            description: "queued".to_string(),
            payload_ref: None,
            result_ref: None,
            error: None,
            last_update: now,
        }
    }

    /// Applies a progress update, enforcing the nondecreasing-while-running invariant.
    pub fn with_progress(mut self, fraction: f64, description: impl Into<String>, now: DateTime<Utc>) -> Result<Self, TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::AlreadyTerminal { job_id: self.id.clone(), state: self.state });
        }
        if fraction < self.progress {
            return Err(TransitionError::ProgressRegression { job_id: self.id.clone(), from: self.progress, to: fraction });
        }
        self.progress = fraction.clamp(0.0, 1.0);
        self.description = description.into();
        self.last_update = now;
        Ok(self)
    }

    /// Transitions this record to `complete`, pointing at the given result key.
    pub fn complete(mut self, result_ref: impl Into<String>, now: DateTime<Utc>) -> Result<Self, TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::AlreadyTerminal { job_id: self.id.clone(), state: self.state });
        }
        self.state = JobState::Complete;
        self.progress = 1.0;
        self.description = "complete".to_string();
        self.result_ref = Some(result_ref.into());
        self.last_update = now;
        Ok(self)
    }

    /// Transitions this record to `failed`, retaining the last progress value.
    pub fn fail(mut self, description: impl Into<String>, now: DateTime<Utc>) -> Result<Self, TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::AlreadyTerminal { job_id: self.id.clone(), state: self.state });
        }
        let description = description.into();
        self.state = JobState::Failed;
        self.error = Some(description.clone());
        self.description = description;
        self.last_update = now;
        Ok(self)
    }
}



#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn seed_is_running_with_zero_progress() {
        let rec = StatusRecord::seed("Analysis00000001", JobKind::Analysis, now());
        assert_eq!(rec.state, JobState::Running);
        assert_eq!(rec.progress, 0.0);
    }

    #[test]
    fn progress_is_monotone() {
        let rec = StatusRecord::seed("Analysis00000001", JobKind::Analysis, now());
        let rec = rec.with_progress(0.5, "halfway", now()).unwrap();
        assert!(rec.with_progress(0.3, "regress", now()).is_err());
    }

    #[test]
    fn no_transition_out_of_terminal_state() {
        let rec = StatusRecord::seed("Analysis00000001", JobKind::Analysis, now());
        let rec = rec.complete("result:Analysis00000001", now()).unwrap();
        assert!(rec.clone().fail("late kernel error", now()).is_err());
        assert!(rec.with_progress(0.9, "too late", now()).is_err());
    }

    #[test]
    fn complete_forces_full_progress() {
        let rec = StatusRecord::seed("Analysis00000001", JobKind::Analysis, now());
        let rec = rec.complete("result:Analysis00000001", now()).unwrap();
        assert_eq!(rec.progress, 1.0);
        assert_eq!(rec.result_ref.as_deref(), Some("result:Analysis00000001"));
    }

    #[test]
    fn fail_retains_last_progress() {
        let rec = StatusRecord::seed("Analysis00000001", JobKind::Analysis, now());
        let rec = rec.with_progress(0.4, "working", now()).unwrap();
        let rec = rec.fail("kernel exploded", now()).unwrap();
        assert_eq!(rec.progress, 0.4);
        assert_eq!(rec.state, JobState::Failed);
    }
}
