//  SPEC.rs
//
//  Description:
//!   Defines `Context`: the shared, `Clone`-cheap handle every warp route
//!   closes over, giving handlers access to the Broker, the Blackboard,
//!   the method/type catalog, the search index and the running config.

use std::sync::Arc;
use std::time::Duration;

use gsa_cfg::Config;
use gsa_search::SearchIndex;
use gsa_shr::blackboard::Blackboard;
use gsa_shr::broker::Broker;
use log::warn;
use specifications::catalog::Catalog;
use specifications::data::{ExternalData, ExternalDatasource};

use crate::errors::ApiError;

/// The context threaded into every warp filter chain, generalized from
/// a single backing store handle to the full set of capabilities this
/// service depends on.
#[derive(Clone)]
pub struct Context {
    pub broker: Arc<dyn Broker>,
    pub blackboard: Arc<dyn Blackboard>,
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
    pub search_index: Arc<SearchIndex>,
    pub data_sources: Arc<Vec<ExternalDatasource>>,
    /// Bundled example datasets served by `/data/examples` and looked up by
    /// `/data/summary/{id}` before falling back to a loader-produced
    /// `dataset:{id}` Blackboard record.
    pub examples: Arc<Vec<ExternalData>>,
}

impl Context {
    /// Admits `queue` against its configured ceiling, retrying a handful of
    /// times with a short backoff before failing closed: a queue hovering
    /// right at the ceiling gets a few chances to drain before a client
    /// sees a `503`.
    pub async fn admit_queue(&self, queue: &str) -> Result<(), ApiError> {
        let max_tries = self.config.max_message_tries.max(1);
        let mut last_len = 0;
        for attempt in 1..=max_tries {
            last_len = self.broker.queue_length(queue).await.map_err(|err| ApiError::Admission { err: err.to_string() })?;
            if last_len < self.config.max_queue_length {
                return Ok(());
            }
            warn!("Queue '{queue}' at or above its ceiling of {} (attempt {attempt}/{max_tries})", self.config.max_queue_length);
            if attempt < max_tries {
                tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
            }
        }
        Err(ApiError::Admission { err: format!("queue '{queue}' still at its ceiling of {} after {max_tries} attempt(s) (currently {last_len})", self.config.max_queue_length) })
    }
}
