//  LOADER.rs
//
//  Description:
//!   Implements the Dataset Loader's message loop: consumes
//!   `DatasetLoadJob`s off the `dataset` queue, drives a loading job
//!   through `queued -> fetching -> converting -> indexing -> complete`,
//!   and writes the resulting `ExternalData` record to the Blackboard.
//!   Shares the same consume/ack/retry shape as `gsa-worker`'s own
//!   message loop, since both workers share the same Broker/Blackboard
//!   pair.

use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};

use gsa_kernel::kernel::ExpressionMatrix;
use gsa_shr::broker::Delivery;
use specifications::data::{DatasetLoadJob, DatasetLoadingStatus, ExternalData, LoadingTransitionError};
use specifications::param::Parameter;

use crate::errors::ProcessError;
use crate::spec::Context;

/***** CONSTANTS *****/
const DATASET_QUEUE: &str = "dataset";
/// How many times `fetch_with_retries` will call the fetcher for a single
/// dataset load before giving up and failing the job.
const FETCH_MAX_ATTEMPTS: usize = 3;


/***** LIBRARY *****/
/// Runs the loader's message loop forever, logging non-fatal errors and
/// moving on to the next delivery.
pub async fn run(context: Context) {
    info!("Dataset loader entering message loop on queue '{DATASET_QUEUE}'");
    loop {
        let delivery = match context.broker.consume(DATASET_QUEUE).await {
            Ok(delivery) => delivery,
            Err(err) => {
                error!("Failed to consume from queue '{DATASET_QUEUE}': {err}");
                continue;
            }
        };
        if let Err(err) = process_delivery(&context, delivery).await {
            warn!("Failed to process dataset load delivery: {err}");
        }
    }
}

async fn ack(context: &Context, delivery: Delivery) {
    if let Err(err) = context.broker.ack(DATASET_QUEUE, delivery).await {
        warn!("Failed to acknowledge delivery on queue '{DATASET_QUEUE}': {err}");
    }
}

/// Processes a single delivery through to completion or failure.
///
/// # Errors
/// Returns early without acking on a Broker/Blackboard infrastructure
/// failure, so the Broker redelivers the message; all other failures
/// (malformed payload, fetch failure, malformed matrix) ack the delivery
/// after recording `failed` on the job's status.
async fn process_delivery(context: &Context, delivery: Delivery) -> Result<(), ProcessError> {
    let job: DatasetLoadJob = match serde_json::from_slice(&delivery.payload) {
        Ok(job) => job,
        Err(err) => {
            ack(context, delivery).await;
            return Err(ProcessError::MalformedPayload { err });
        }
    };

    let Some(loading_id) = delivery.job_id.clone() else {
        warn!("Delivery on queue '{DATASET_QUEUE}' carried no job id; dropping");
        ack(context, delivery).await;
        return Ok(());
    };

    let raw_status = context
        .blackboard
        .get(&format!("status:{loading_id}"))
        .await
        .map_err(|err| ProcessError::StatusUnavailable { loading_id: loading_id.clone(), err })?;
    let Some(raw_status) = raw_status else {
        warn!("No status record found for dataset load '{loading_id}'; dropping");
        ack(context, delivery).await;
        return Ok(());
    };
    let status: DatasetLoadingStatus = match serde_json::from_slice(&raw_status) {
        Ok(status) => status,
        Err(err) => {
            ack(context, delivery).await;
            return Err(ProcessError::MalformedPayload { err });
        }
    };
    if status.state.is_terminal() {
        debug!("Dataset load '{loading_id}' is already in terminal state '{}'; dropping", status.state);
        ack(context, delivery).await;
        return Ok(());
    }

    match run_pipeline(context, &loading_id, &job).await {
        Ok(()) => {
            ack(context, delivery).await;
            Ok(())
        }
        Err(err @ (ProcessError::Blackboard { .. } | ProcessError::StatusUnavailable { .. })) => Err(err),
        Err(err) => {
            transition_loading(context, &loading_id, |status| status.fail(err.to_string(), Utc::now()))
                .await
                .map_err(|e| ProcessError::Blackboard { err: e })?;
            ack(context, delivery).await;
            Err(err)
        }
    }
}

/// Drives the load through `fetching -> converting -> indexing -> complete`,
/// short-circuiting via the dataset cache when an identical `resource_id` +
/// parameter set has already been loaded.
async fn run_pipeline(context: &Context, loading_id: &str, job: &DatasetLoadJob) -> Result<(), ProcessError> {
    let cache_key = dataset_cache_key(&job.resource_id, &job.parameters);
    if let Some(raw) = context.blackboard.get(&cache_key).await.map_err(|err| ProcessError::Blackboard { err })? {
        let dataset_id = String::from_utf8_lossy(&raw).to_string();
        debug!("Dataset load '{loading_id}' hit the cache for resource '{}': reusing '{dataset_id}'", job.resource_id);
        transition_loading(context, loading_id, |status| status.complete(dataset_id.clone(), Utc::now()))
            .await
            .map_err(|err| ProcessError::Blackboard { err })?;
        return Ok(());
    }

    transition_loading(context, loading_id, |status| status.advance(0.1, "fetching", Utc::now()))
        .await
        .map_err(|err| ProcessError::Blackboard { err })?;
    let fetched = fetch_with_retries(context, &job.resource_id, &job.parameters).await?;

    transition_loading(context, loading_id, |status| status.advance(0.5, "converting", Utc::now()))
        .await
        .map_err(|err| ProcessError::Blackboard { err })?;
    let matrix = ExpressionMatrix::parse(&fetched.matrix).map_err(|err| ProcessError::MalformedMatrix { err })?;

    transition_loading(context, loading_id, |status| status.advance(0.8, "indexing", Utc::now()))
        .await
        .map_err(|err| ProcessError::Blackboard { err })?;
    let dataset_id = format!("ds-{loading_id}");
    let data = ExternalData {
        id: dataset_id.clone(),
        title: fetched.title,
        dataset_type: fetched.dataset_type,
        group: fetched.group,
        sample_ids: matrix.sample_labels,
        sample_metadata: fetched.sample_metadata,
        default_parameters: vec![],
    };
    let encoded = serde_json::to_vec(&data).expect("ExternalData is always serializable");
    context
        .blackboard
        .put(&format!("dataset:{dataset_id}"), encoded, Some(context.config.dataset_cache_ttl()))
        .await
        .map_err(|err| ProcessError::Blackboard { err })?;
    context
        .blackboard
        .put(&cache_key, dataset_id.clone().into_bytes(), Some(context.config.dataset_cache_ttl()))
        .await
        .map_err(|err| ProcessError::Blackboard { err })?;

    transition_loading(context, loading_id, |status| status.complete(dataset_id.clone(), Utc::now()))
        .await
        .map_err(|err| ProcessError::Blackboard { err })?;
    gsa_shr::blackboard::untrack(context.blackboard.as_ref(), gsa_shr::blackboard::TRACKED_DATASET, loading_id)
        .await
        .map_err(|err| ProcessError::Blackboard { err })?;
    Ok(())
}

/// Calls the fetcher up to `FETCH_MAX_ATTEMPTS` times, backing off between
/// attempts, before surfacing the last error. An upstream source registry
/// blip should not immediately fail a load that would have succeeded on
/// a second try.
async fn fetch_with_retries(context: &Context, resource_id: &str, parameters: &[Parameter]) -> Result<crate::fetcher::FetchedDataset, ProcessError> {
    let mut last_err = None;
    for attempt in 1..=FETCH_MAX_ATTEMPTS {
        match context.fetcher.fetch(resource_id, parameters).await {
            Ok(fetched) => return Ok(fetched),
            Err(err) => {
                warn!("Attempt {attempt}/{FETCH_MAX_ATTEMPTS} to fetch resource '{resource_id}' failed: {err}");
                last_err = Some(err);
                if attempt < FETCH_MAX_ATTEMPTS {
                    tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
                }
            }
        }
    }
    Err(ProcessError::Fetch { attempts: FETCH_MAX_ATTEMPTS, err: last_err.expect("loop ran at least once") })
}

/// Derives the idempotence cache key for a `resource_id` + parameter set:
/// identical requests (same resource, same parameter values) land on the
/// same key regardless of the order parameters were submitted in.
fn dataset_cache_key(resource_id: &str, parameters: &[Parameter]) -> String {
    let mut pairs: Vec<String> = parameters.iter().map(|p| format!("{}={}", p.name, p.value)).collect();
    pairs.sort();
    format!("dataset_cache:{resource_id}:{}", pairs.join("&"))
}

/// Reads, transforms and compare-and-set writes the loading status record,
/// retrying indefinitely on a concurrent CAS loss (the loader is the sole
/// owner of jobs it consumed off the queue, so a retry always succeeds
/// eventually). Mirrors `gsa-worker`'s own `transition_status` helper.
async fn transition_loading<F>(context: &Context, loading_id: &str, f: F) -> Result<(), gsa_shr::blackboard::Error>
where
    F: Fn(DatasetLoadingStatus) -> Result<DatasetLoadingStatus, LoadingTransitionError>,
{
    loop {
        let key = format!("status:{loading_id}");
        let Some(raw) = context.blackboard.get(&key).await? else {
            warn!("Status record for dataset load '{loading_id}' disappeared mid-transition");
            return Ok(());
        };
        let status: DatasetLoadingStatus = match serde_json::from_slice(&raw) {
            Ok(status) => status,
            Err(err) => {
                warn!("Status record for dataset load '{loading_id}' is corrupt: {err}");
                return Ok(());
            }
        };
        let Ok(next) = f(status) else {
            return Ok(());
        };
        let encoded = serde_json::to_vec(&next).expect("DatasetLoadingStatus is always serializable");
        if context.blackboard.compare_and_set(&key, Some(&raw), encoded, Some(context.config.status_ttl())).await? {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
