//  DATA.rs
//
//  Description:
//!   Defines `ExternalData`, the catalog entry a Dataset Loader produces
//!   and the API serves back to clients, plus the `DatasetLoadingStatus`
//!   state machine that tracks a loading job from admission to
//!   completion.

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::DatasetType;
use crate::param::Parameter;


/***** ERRORS *****/
#[derive(Debug)]
pub enum LoadingTransitionError {
    AlreadyTerminal { loading_id: String, state: LoadingState },
    /// Attempted to move to a state out of the declared forward sequence.
    OutOfSequence { loading_id: String, from: LoadingState, to: LoadingState },
}

impl Display for LoadingTransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use LoadingTransitionError::*;
        match self {
            AlreadyTerminal { loading_id, state } => write!(f, "Dataset load '{loading_id}' is already in terminal state '{state}'"),
            OutOfSequence { loading_id, from, to } => write!(f, "Dataset load '{loading_id}' cannot move from '{from}' to '{to}' out of sequence"),
        }
    }
}

impl std::error::Error for LoadingTransitionError {}



/***** LIBRARY *****/
/// The state machine a Dataset Loader job moves through:
/// `queued -> fetching -> converting -> indexing -> complete`, with
/// `failed` reachable from any non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingState {
    Queued,
    Fetching,
    Converting,
    Indexing,
    Complete,
    Failed,
}

impl LoadingState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadingState::Complete | LoadingState::Failed)
    }

    /// Returns the state that follows this one in the declared forward sequence,
    /// or `None` if this is already the last non-terminal state.
    fn next_in_sequence(&self) -> Option<LoadingState> {
        match self {
            LoadingState::Queued => Some(LoadingState::Fetching),
            LoadingState::Fetching => Some(LoadingState::Converting),
            LoadingState::Converting => Some(LoadingState::Indexing),
            LoadingState::Indexing => Some(LoadingState::Complete),
            LoadingState::Complete | LoadingState::Failed => None,
        }
    }
}

impl Display for LoadingState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        match self {
            LoadingState::Queued => write!(f, "queued"),
            LoadingState::Fetching => write!(f, "fetching"),
            LoadingState::Converting => write!(f, "converting"),
            LoadingState::Indexing => write!(f, "indexing"),
            LoadingState::Complete => write!(f, "complete"),
            LoadingState::Failed => write!(f, "failed"),
        }
    }
}



/// The status record stored under `status:{loading_id}` for a Dataset Loader job.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DatasetLoadingStatus {
    pub id: String,
    pub resource_id: String,
    pub state: LoadingState,
    pub progress: f64,
    pub description: String,
    /// Populated once `state == complete`: the id of the `ExternalData` record produced.
    pub dataset_id: Option<String>,
    pub error: Option<String>,
    pub last_update: DateTime<Utc>,
}

impl DatasetLoadingStatus {
    pub fn seed(id: impl Into<String>, resource_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            resource_id: resource_id.into(),
            state: LoadingState::Queued,
            progress: 0.0,
            description: "queued".to_string(),
            dataset_id: None,
            error: None,
            last_update: now,
        }
    }

    /// Advances to the next state in the declared sequence, carrying a progress fraction.
    pub fn advance(mut self, fraction: f64, description: impl Into<String>, now: DateTime<Utc>) -> Result<Self, LoadingTransitionError> {
        if self.state.is_terminal() {
            return Err(LoadingTransitionError::AlreadyTerminal { loading_id: self.id.clone(), state: self.state });
        }
        let next = self.state.next_in_sequence().ok_or_else(|| LoadingTransitionError::OutOfSequence {
            loading_id: self.id.clone(),
            from: self.state,
            to: self.state,
        })?;
        self.state = next;
        self.progress = fraction.clamp(0.0, 1.0);
        self.description = description.into();
        self.last_update = now;
        Ok(self)
    }

    /// Completes the load, recording which `ExternalData` record it produced.
    pub fn complete(mut self, dataset_id: impl Into<String>, now: DateTime<Utc>) -> Result<Self, LoadingTransitionError> {
        if self.state.is_terminal() {
            return Err(LoadingTransitionError::AlreadyTerminal { loading_id: self.id.clone(), state: self.state });
        }
        self.state = LoadingState::Complete;
        self.progress = 1.0;
        self.description = "complete".to_string();
        self.dataset_id = Some(dataset_id.into());
        self.last_update = now;
        Ok(self)
    }

    /// Fails the load from any non-terminal state (`failed` is reachable from anywhere).
    pub fn fail(mut self, description: impl Into<String>, now: DateTime<Utc>) -> Result<Self, LoadingTransitionError> {
        if self.state.is_terminal() {
            return Err(LoadingTransitionError::AlreadyTerminal { loading_id: self.id.clone(), state: self.state });
        }
        let description = description.into();
        self.state = LoadingState::Failed;
        self.error = Some(description.clone());
        self.description = description;
        self.last_update = now;
        Ok(self)
    }
}



/// A loaded, normalized external dataset, as stored under `dataset:{id}` and
/// served back to clients via `/data/summary/{dataset_id}` and `/data/examples`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExternalData {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub dataset_type: DatasetType,
    pub group: String,
    pub sample_ids: Vec<String>,
    /// Metadata name -> values, one per entry in `sample_ids`, same order.
    pub sample_metadata: HashMap<String, Vec<String>>,
    pub default_parameters: Vec<Parameter>,
}

impl ExternalData {
    /// Validates that every `sample_metadata` array has the same arity as `sample_ids`,
    /// the same arity as `sample_ids`.
    pub fn metadata_arity_matches(&self) -> bool {
        self.sample_metadata.values().all(|values| values.len() == self.sample_ids.len())
    }
}



/// A source descriptor served by `/data/sources`: where a dataset can be
/// fetched from, prior to any loading job being admitted against it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ExternalDatasource {
    pub resource_id: String,
    pub title: String,
    pub dataset_type: DatasetType,
    pub description: String,
}



/// The work item the API publishes onto the `dataset` queue on
/// `POST /data/load/{resource_id}`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DatasetLoadJob {
    pub loading_id: String,
    pub resource_id: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}



#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn advances_through_declared_sequence() {
        let status = DatasetLoadingStatus::seed("Load00000001", "EXAMPLE_MEL_RNA", now());
        assert_eq!(status.state, LoadingState::Queued);
        let status = status.advance(0.25, "fetching", now()).unwrap();
        assert_eq!(status.state, LoadingState::Fetching);
        let status = status.advance(0.5, "converting", now()).unwrap();
        assert_eq!(status.state, LoadingState::Converting);
        let status = status.advance(0.75, "indexing", now()).unwrap();
        assert_eq!(status.state, LoadingState::Indexing);
    }

    #[test]
    fn complete_sets_dataset_id() {
        let status = DatasetLoadingStatus::seed("Load00000001", "EXAMPLE_MEL_RNA", now());
        let status = status.complete("ds-abc123", now()).unwrap();
        assert_eq!(status.state, LoadingState::Complete);
        assert_eq!(status.dataset_id.as_deref(), Some("ds-abc123"));
    }

    #[test]
    fn fails_from_any_nonterminal_state() {
        let status = DatasetLoadingStatus::seed("Load00000001", "EXAMPLE_MEL_RNA", now());
        let status = status.advance(0.25, "fetching", now()).unwrap();
        let status = status.fail("remote host unreachable", now()).unwrap();
        assert_eq!(status.state, LoadingState::Failed);
    }

    #[test]
    fn no_transition_out_of_terminal() {
        let status = DatasetLoadingStatus::seed("Load00000001", "EXAMPLE_MEL_RNA", now());
        let status = status.complete("ds-abc123", now()).unwrap();
        assert!(status.clone().advance(0.1, "late", now()).is_err());
        assert!(status.fail("too late", now()).is_err());
    }

    #[test]
    fn metadata_arity_must_match_sample_ids() {
        let mut sample_metadata = HashMap::new();
        sample_metadata.insert("tissue".to_string(), vec!["liver".to_string()]);
        let data = ExternalData {
            id: "ds-abc123".into(),
            title: "Melanoma RNA-seq".into(),
            dataset_type: DatasetType("rnaseq_counts".into()),
            group: "melanoma".into(),
            sample_ids: vec!["s1".into(), "s2".into()],
            sample_metadata,
            default_parameters: vec![],
        };
        assert!(!data.metadata_arity_matches());
    }
}
