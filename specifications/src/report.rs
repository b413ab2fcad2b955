//  REPORT.rs
//
//  Description:
//!   Defines `ReportArtifact` and `ReportStatus`, the records a Report
//!   Generator produces and that the API streams back via
//!   `/report_status/{id}`.

use std::fmt::{Display, Formatter, Result as FResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::Display as StrumDisplay;


/***** ERRORS *****/
#[derive(Debug)]
pub enum ReportTransitionError {
    AlreadyTerminal { job_id: String, state: ReportState },
}

impl Display for ReportTransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        match self {
            ReportTransitionError::AlreadyTerminal { job_id, state } => {
                write!(f, "Report '{job_id}' is already in terminal state '{state}'")
            }
        }
    }
}

impl std::error::Error for ReportTransitionError {}



/***** LIBRARY *****/
/// Which kind of artifact a report-generation request asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Spreadsheet,
    Pdf,
    Email,
}

impl ArtifactKind {
    /// Returns this artifact's weight toward overall report progress:
    /// spreadsheet 0.3, PDF 0.6, e-mail 0.1.
    pub fn weight(&self) -> f64 {
        match self {
            ArtifactKind::Spreadsheet => 0.3,
            ArtifactKind::Pdf => 0.6,
            ArtifactKind::Email => 0.1,
        }
    }

    /// Returns the canonical artifact name used in the `report:{job_id}:{name}` key
    /// and in `ReportStatus.reports[].name`.
    pub fn artifact_name(&self) -> &'static str {
        match self {
            ArtifactKind::Spreadsheet => "XLSX",
            ArtifactKind::Pdf => "PDF",
            ArtifactKind::Email => "EMAIL",
        }
    }
}

impl Display for ArtifactKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        write!(f, "{}", self.artifact_name())
    }
}



/// The work item the Analysis Worker publishes onto the `report` queue when
/// an admitted request carried a `report` or `email` common-scoped
/// parameter.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReportJob {
    /// The freshly allocated id for this report job itself.
    pub job_id: String,
    /// The already-`complete` analysis job whose result this report is drawn from.
    pub analysis_job_id: String,
    pub artifacts: Vec<ArtifactKind>,
    /// Present iff `artifacts` includes `Email`: the address to notify.
    pub email_address: Option<String>,
}



/// A single produced artifact, as listed in `ReportStatus.reports`. The `url`
/// points at an API endpoint that streams the underlying blob from
/// `report:{job_id}:{name}`; the blob itself is not carried inline.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ReportArtifact {
    pub name: String,
    pub url: String,
    pub mimetype: String,
}

impl ReportArtifact {
    pub fn new(kind: ArtifactKind, job_id: &str, mimetype: impl Into<String>, base_url: &str) -> Self {
        let name = kind.artifact_name().to_string();
        Self { url: format!("{base_url}/report/{job_id}/{name}"), name, mimetype: mimetype.into() }
    }
}



/// Lifecycle state of a report-generation job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, StrumDisplay)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReportState {
    Running,
    Complete,
    Failed,
}

impl ReportState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportState::Complete | ReportState::Failed)
    }
}



/// The status record stored under `status:{job_id}` for a report job, listing
/// whichever artifacts have been produced so far.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ReportStatus {
    pub id: String,
    /// The `analysis` job this report was generated from; must already be `complete`.
    pub analysis_job_id: String,
    pub state: ReportState,
    pub progress: f64,
    pub description: String,
    pub reports: Vec<ReportArtifact>,
    pub last_update: DateTime<Utc>,
}

impl ReportStatus {
    pub fn seed(id: impl Into<String>, analysis_job_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            analysis_job_id: analysis_job_id.into(),
            state: ReportState::Running,
            progress: 0.0,
            description: "queued".to_string(),
            reports: Vec::new(),
            last_update: now,
        }
    }

    /// Records a successfully produced artifact and bumps progress by its weight.
    pub fn record_artifact(mut self, artifact: ReportArtifact, weight: f64, now: DateTime<Utc>) -> Result<Self, ReportTransitionError> {
        if self.state.is_terminal() {
            return Err(ReportTransitionError::AlreadyTerminal { job_id: self.id.clone(), state: self.state });
        }
        self.progress = (self.progress + weight).min(1.0);
        self.reports.push(artifact);
        self.last_update = now;
        Ok(self)
    }

    /// Fails the report outright from any non-terminal state, bypassing the
    /// partial-success policy. Used by the stall sweeper, which
    /// must be able to promote a silently-stuck report to `failed` even if
    /// it had already produced an artifact.
    pub fn fail(mut self, description: impl Into<String>, now: DateTime<Utc>) -> Result<Self, ReportTransitionError> {
        if self.state.is_terminal() {
            return Err(ReportTransitionError::AlreadyTerminal { job_id: self.id.clone(), state: self.state });
        }
        self.state = ReportState::Failed;
        self.description = description.into();
        self.last_update = now;
        Ok(self)
    }

    /// Finalizes the report per the partial-success policy: `complete`
    /// if at least one artifact was produced (noting any failure in `description`),
    /// `failed` only if none were.
    pub fn finalize(mut self, failure_note: Option<String>, now: DateTime<Utc>) -> Result<Self, ReportTransitionError> {
        if self.state.is_terminal() {
            return Err(ReportTransitionError::AlreadyTerminal { job_id: self.id.clone(), state: self.state });
        }
        if self.reports.is_empty() {
            self.state = ReportState::Failed;
            self.description = failure_note.unwrap_or_else(|| "all report artifacts failed".to_string());
        } else {
            self.state = ReportState::Complete;
            self.progress = 1.0;
            self.description = match failure_note {
                Some(note) => format!("complete ({note})"),
                None => "complete".to_string(),
            };
        }
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
    fn weights_sum_to_one() {
        let total: f64 = [ArtifactKind::Spreadsheet, ArtifactKind::Pdf, ArtifactKind::Email].iter().map(|k| k.weight()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn partial_success_is_complete_with_note() {
        let status = ReportStatus::seed("Report00000001", "Analysis00000001", now());
        let status = status
            .record_artifact(ReportArtifact::new(ArtifactKind::Spreadsheet, "Analysis00000001", "application/vnd.ms-excel", "https://api.example.org/0.1"), 0.3, now())
            .unwrap();
        let status = status.finalize(Some("PDF generation failed".to_string()), now()).unwrap();
        assert_eq!(status.state, ReportState::Complete);
        assert_eq!(status.reports.len(), 1);
        assert!(status.description.contains("PDF generation failed"));
    }

    #[test]
    fn all_artifacts_failing_yields_failed_state() {
        let status = ReportStatus::seed("Report00000001", "Analysis00000001", now());
        let status = status.finalize(Some("all artifacts failed".to_string()), now()).unwrap();
        assert_eq!(status.state, ReportState::Failed);
    }

    #[test]
    fn no_transition_out_of_terminal() {
        let status = ReportStatus::seed("Report00000001", "Analysis00000001", now());
        let status = status.finalize(None, now()).unwrap();
        assert!(status.clone().finalize(None, now()).is_err());
        assert!(status
            .record_artifact(ReportArtifact::new(ArtifactKind::Pdf, "Analysis00000001", "application/pdf", "https://api.example.org/0.1"), 0.6, now())
            .is_err());
    }
}
