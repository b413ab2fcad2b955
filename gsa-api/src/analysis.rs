//  ANALYSIS.rs
//
//  Description:
//!   Implements the admission contract for `POST /analysis` and the
//!   `/status/{id}` and `/result/{id}` read endpoints.

use chrono::Utc;
use log::{debug, info, warn};
use warp::reply::Response;
use warp::{Rejection, Reply};

use specifications::analysis::AnalysisInput;
use specifications::job::{JobKind, JobState, StatusRecord};

use crate::body;
use crate::errors::ApiError;
use crate::spec::Context;


/***** HELPERS *****/
fn reject(err: ApiError) -> Rejection {
    warp::reject::custom(err)
}

/// Runs every admission-time check: method existence, per-dataset type
/// acceptance, cross-field design validation, and parameter
/// coercion against the method's declared `ParameterSpec`s.
/// Unknown parameters are dropped with a warning rather than failing
/// closed; only a failed *coercion* does.
fn validate_admission(input: &AnalysisInput, context: &Context) -> Result<(), ApiError> {
    let method = context.catalog.get(&input.method_name).map_err(|_| ApiError::UnknownMethod { method: input.method_name.clone() })?;

    for dataset in &input.datasets {
        context.catalog.check_accepts(&input.method_name, &dataset.dataset_type).map_err(|err| ApiError::Validation { err: err.to_string() })?;
    }

    input.validate().map_err(|err| ApiError::Validation { err: err.to_string() })?;

    let all_params = input.parameters.iter().chain(input.datasets.iter().flat_map(|d| d.parameters.iter()));
    for param in all_params {
        match method.parameters.iter().find(|spec| spec.name == param.name) {
            Some(spec) => {
                param.coerce(spec).map_err(|err| ApiError::Validation { err: err.to_string() })?;
            }
            None => warn!("Ignoring unknown parameter '{}' for method '{}'", param.name, input.method_name),
        }
    }

    Ok(())
}

async fn load_status_record(context: &Context, job_id: &str) -> Result<StatusRecord, Rejection> {
    let raw = context.blackboard.get(&format!("status:{job_id}")).await.map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;
    let raw = raw.ok_or_else(|| reject(ApiError::NotFound { what: "status".to_string(), id: job_id.to_string() }))?;
    serde_json::from_slice(&raw).map_err(|err| reject(ApiError::Backend { err: err.to_string() }))
}



/***** LIBRARY *****/
/// `POST /analysis` admission contract.
pub async fn submit(raw_body: bytes::Bytes, context: Context) -> Result<impl Reply, Rejection> {
    info!("Handling POST on '/analysis'");

    // Steps 1-2: parse (JSON or gzip) and validate.
    let input: AnalysisInput = body::decode_json(raw_body).await.map_err(reject)?;
    validate_admission(&input, &context).map_err(reject)?;

    // Step 3: allocate job_id from the monotonic per-kind counter.
    let counter = context.blackboard.atomic_increment("counter:analysis").await.map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;
    let job_id = format!("{}{counter:08}", JobKind::Analysis.id_prefix());
    debug!("Admitting analysis job '{job_id}' for method '{}'", input.method_name);

    // Step 4: seed status.
    let status = StatusRecord::seed(&job_id, JobKind::Analysis, Utc::now());
    let encoded = serde_json::to_vec(&status).map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;
    context
        .blackboard
        .compare_and_set(&format!("status:{job_id}"), None, encoded, Some(context.config.status_ttl()))
        .await
        .map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;

    // Step 5: publish the normalized work item, honoring the queue-length ceiling.
    context.admit_queue("analysis").await.map_err(reject)?;
    let payload = serde_json::to_vec(&input).map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;
    context
        .broker
        .publish("analysis", &job_id, &payload, context.config.max_message_tries)
        .await
        .map_err(|err| reject(ApiError::Admission { err: err.to_string() }))?;
    gsa_shr::blackboard::track(context.blackboard.as_ref(), gsa_shr::blackboard::TRACKED_ANALYSIS, &job_id)
        .await
        .map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;

    // Step 6.
    Ok(job_id)
}

/// `GET /status/{id}`
pub async fn status(job_id: String, context: Context) -> Result<impl Reply, Rejection> {
    info!("Handling GET on '/status/{job_id}'");
    let record = load_status_record(&context, &job_id).await?;
    Ok(warp::reply::json(&record))
}

/// `GET /result/{id}` — `200` only once `state == complete`: a result
/// blob exists on the Blackboard iff the corresponding status is
/// complete.
pub async fn result(job_id: String, context: Context) -> Result<impl Reply, Rejection> {
    info!("Handling GET on '/result/{job_id}'");
    let record = load_status_record(&context, &job_id).await?;
    if record.state != JobState::Complete {
        return Err(reject(ApiError::NotReady { id: job_id, state: record.state.to_string() }));
    }

    let blob = context.blackboard.get(&format!("result:{job_id}")).await.map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;
    let blob = blob.ok_or_else(|| reject(ApiError::NotFound { what: "result".to_string(), id: job_id.clone() }))?;

    let response: Response = warp::http::Response::builder()
        .header("Content-Type", "application/json")
        .body(warp::hyper::Body::from(blob))
        .map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;
    Ok(response)
}
