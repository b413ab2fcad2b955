//  DATA.rs
//
//  Description:
//!   Implements the `/data/*` endpoints: the static source/example
//!   catalog, dataset-load admission, and the loading-status/summary
//!   reads.

use std::collections::HashMap;

use chrono::Utc;
use log::{debug, info};
use warp::{Rejection, Reply};

use specifications::data::{DatasetLoadJob, DatasetLoadingStatus};
use specifications::job::JobKind;
use specifications::param::Parameter;

use crate::errors::ApiError;
use crate::spec::Context;


/***** HELPERS *****/
fn reject(err: ApiError) -> Rejection {
    warp::reject::custom(err)
}



/***** LIBRARY *****/
/// `GET /data/sources`
pub async fn sources(context: Context) -> Result<impl Reply, Rejection> {
    info!("Handling GET on '/data/sources'");
    Ok(warp::reply::json(context.data_sources.as_ref()))
}

/// `GET /data/examples`. An optional `?q=` query string ranks and filters
/// results through the search index built at startup from the
/// example-dataset catalog.
pub async fn examples(query: HashMap<String, String>, context: Context) -> Result<impl Reply, Rejection> {
    info!("Handling GET on '/data/examples'");
    match query.get("q") {
        None => Ok(warp::reply::json(context.examples.as_ref())),
        Some(q) => {
            let ranked_ids = context.search_index.query(q);
            let matched: Vec<_> = ranked_ids
                .iter()
                .filter_map(|id| context.examples.iter().find(|entry| &entry.id == id))
                .collect();
            Ok(warp::reply::json(&matched))
        }
    }
}

/// `POST /data/load/{resource_id}`: admits a Dataset job analogously
/// against the `dataset` queue, allocating a `LoadId`.
pub async fn load(resource_id: String, parameters: Vec<Parameter>, context: Context) -> Result<impl Reply, Rejection> {
    info!("Handling POST on '/data/load/{resource_id}'");

    let counter = context.blackboard.atomic_increment("counter:dataset").await.map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;
    let loading_id = format!("{}{counter:08}", JobKind::Dataset.id_prefix());
    debug!("Admitting dataset load '{loading_id}' for resource '{resource_id}'");

    let status = DatasetLoadingStatus::seed(&loading_id, &resource_id, Utc::now());
    let encoded = serde_json::to_vec(&status).map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;
    context
        .blackboard
        .compare_and_set(&format!("status:{loading_id}"), None, encoded, Some(context.config.status_ttl()))
        .await
        .map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;

    context.admit_queue("dataset").await.map_err(reject)?;

    let job = DatasetLoadJob { loading_id: loading_id.clone(), resource_id, parameters };
    let payload = serde_json::to_vec(&job).map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;
    context
        .broker
        .publish("dataset", &loading_id, &payload, context.config.max_message_tries)
        .await
        .map_err(|err| reject(ApiError::Admission { err: err.to_string() }))?;
    gsa_shr::blackboard::track(context.blackboard.as_ref(), gsa_shr::blackboard::TRACKED_DATASET, &loading_id)
        .await
        .map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;

    Ok(loading_id)
}

/// `GET /data/status/{loading_id}`
pub async fn status(loading_id: String, context: Context) -> Result<impl Reply, Rejection> {
    info!("Handling GET on '/data/status/{loading_id}'");
    let raw = context.blackboard.get(&format!("status:{loading_id}")).await.map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;
    let raw = raw.ok_or_else(|| reject(ApiError::NotFound { what: "dataset loading status".to_string(), id: loading_id.clone() }))?;
    let record: DatasetLoadingStatus = serde_json::from_slice(&raw).map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;
    Ok(warp::reply::json(&record))
}

/// `GET /data/summary/{dataset_id}`: checks the bundled examples first,
/// then a loader-produced `dataset:{id}` Blackboard record.
pub async fn summary(dataset_id: String, context: Context) -> Result<impl Reply, Rejection> {
    info!("Handling GET on '/data/summary/{dataset_id}'");
    if let Some(entry) = context.examples.iter().find(|entry| entry.id == dataset_id) {
        return Ok(warp::reply::json(entry));
    }

    let raw = context.blackboard.get(&format!("dataset:{dataset_id}")).await.map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;
    let raw = raw.ok_or_else(|| reject(ApiError::NotFound { what: "dataset".to_string(), id: dataset_id.clone() }))?;
    let entry: specifications::data::ExternalData = serde_json::from_slice(&raw).map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;
    Ok(warp::reply::json(&entry))
}
