//  REPORT.rs
//
//  Description:
//!   Implements `GET /report_status/{id}` and the artifact byte-stream
//!   endpoint the URLs in `ReportStatus.reports[].url` point at
//!   the URLs point at.

use log::info;
use warp::reply::Response;
use warp::{Rejection, Reply};

use specifications::report::ReportStatus;

use crate::errors::ApiError;
use crate::spec::Context;


/***** HELPERS *****/
fn reject(err: ApiError) -> Rejection {
    warp::reject::custom(err)
}



/***** LIBRARY *****/
/// `GET /report_status/{id}`
pub async fn status(job_id: String, context: Context) -> Result<impl Reply, Rejection> {
    info!("Handling GET on '/report_status/{job_id}'");
    let raw = context.blackboard.get(&format!("status:{job_id}")).await.map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;
    let raw = raw.ok_or_else(|| reject(ApiError::NotFound { what: "report status".to_string(), id: job_id.clone() }))?;
    let record: ReportStatus = serde_json::from_slice(&raw).map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;
    Ok(warp::reply::json(&record))
}

/// `GET /report/{job_id}/{name}`: streams the artifact blob a Report
/// Generator wrote under `report:{job_id}:{name}`.
pub async fn artifact(job_id: String, name: String, context: Context) -> Result<impl Reply, Rejection> {
    info!("Handling GET on '/report/{job_id}/{name}'");
    let blob = context
        .blackboard
        .get(&format!("report:{job_id}:{name}"))
        .await
        .map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;
    let blob = blob.ok_or_else(|| reject(ApiError::NotFound { what: "report artifact".to_string(), id: format!("{job_id}:{name}") }))?;

    let response: Response = warp::http::Response::builder()
        .header("Content-Disposition", format!("attachment; filename=\"{name}\""))
        .body(warp::hyper::Body::from(blob))
        .map_err(|err| reject(ApiError::Backend { err: err.to_string() }))?;
    Ok(response)
}
