//  FETCHER.rs
//
//  Description:
//!   Defines `SourceFetcher`, the pluggable capability through which the
//!   Dataset Loader retrieves an external dataset's raw matrix and sample
//!   metadata, mirroring `gsa_kernel::Kernel`'s duck-typed dispatch
//!   pattern here with a single production implementation.
//!   `HttpSourceFetcher` is a plain `reqwest` GET against a templated URL,
//!   checked against the expected status before the body is read.

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FResult};

use async_trait::async_trait;
use serde::Deserialize;

use specifications::catalog::DatasetType;
use specifications::param::Parameter;


/***** ERRORS *****/
#[derive(Debug)]
pub enum FetchError {
    RequestError { url: String, err: reqwest::Error },
    BadStatus { url: String, status: reqwest::StatusCode },
    MalformedMetadata { url: String, err: serde_json::Error },
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use FetchError::*;
        match self {
            RequestError { url, err } => write!(f, "Request to '{url}' failed: {err}"),
            BadStatus { url, status } => write!(f, "Request to '{url}' returned unexpected status {status}"),
            MalformedMetadata { url, err } => write!(f, "Failed to parse metadata document at '{url}': {err}"),
        }
    }
}

impl std::error::Error for FetchError {}



/***** LIBRARY *****/
/// The raw material a fetch yields, prior to the Loader's own `converting`
/// step (tab-delimited-matrix validation via `gsa_kernel::ExpressionMatrix`).
#[derive(Clone, Debug)]
pub struct FetchedDataset {
    pub title: String,
    pub dataset_type: DatasetType,
    pub group: String,
    /// Raw tab-delimited expression/abundance matrix.
    pub matrix: String,
    /// Metadata name -> per-sample values, parallel to the matrix's sample columns.
    pub sample_metadata: HashMap<String, Vec<String>>,
}

/// The metadata document a source is expected to serve alongside its
/// matrix; shaped like `ExternalData` minus the fields the Loader derives
/// itself (`id` is allocated by the Loader, `sample_ids` are read off the
/// matrix header).
#[derive(Deserialize)]
struct RemoteMetadata {
    title: String,
    #[serde(rename = "type")]
    dataset_type: DatasetType,
    group: String,
    #[serde(default)]
    sample_metadata: HashMap<String, Vec<String>>,
}

/// The capability the `fetching` state dispatches through.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, resource_id: &str, parameters: &[Parameter]) -> Result<FetchedDataset, FetchError>;
}

/// Fetches a dataset's matrix and metadata documents from an HTTP source
/// registry, addressed as `{base_url}/{resource_id}/matrix.tsv` and
/// `{base_url}/{resource_id}/metadata.json`.
pub struct HttpSourceFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSourceFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await.map_err(|err| FetchError::RequestError { url: url.to_string(), err })?;
        if !response.status().is_success() {
            return Err(FetchError::BadStatus { url: url.to_string(), status: response.status() });
        }
        response.text().await.map_err(|err| FetchError::RequestError { url: url.to_string(), err })
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch(&self, resource_id: &str, _parameters: &[Parameter]) -> Result<FetchedDataset, FetchError> {
        let matrix_url = format!("{}/{resource_id}/matrix.tsv", self.base_url);
        let matrix = self.get_text(&matrix_url).await?;

        let metadata_url = format!("{}/{resource_id}/metadata.json", self.base_url);
        let raw_metadata = self.get_text(&metadata_url).await?;
        let metadata: RemoteMetadata =
            serde_json::from_str(&raw_metadata).map_err(|err| FetchError::MalformedMetadata { url: metadata_url, err })?;

        Ok(FetchedDataset {
            title: metadata.title,
            dataset_type: metadata.dataset_type,
            group: metadata.group,
            matrix,
            sample_metadata: metadata.sample_metadata,
        })
    }
}
