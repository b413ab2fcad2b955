//  ERRORS.rs
//
//  Description:
//!   Defines `ApiError`, the warp-rejectable error type every handler in
//!   this crate returns, and its taxonomy-to-status-code mapping. The
//!   API never leaks stack detail; user-facing messages come from
//!   `description` fields only.

use std::fmt::{Display, Formatter, Result as FResult};

use warp::http::StatusCode;
use warp::{Rejection, Reply};


/***** ERRORS *****/
/// Every way a handler in this crate can fail, tagged with the HTTP status
/// it maps to. `ValidationError` and `AdmissionError` are the only kinds
/// the API itself raises; `KernelError`/`InfrastructureError` surface
/// only indirectly, as an absent or `running` status record.
#[derive(Debug)]
pub enum ApiError {
    /// Request body was not valid JSON (after optional gzip decompression).
    MalformedBody { err: String },
    /// Cross-field validation failed at admission.
    Validation { err: String },
    /// `method_name` is not in the advertised catalog.
    UnknownMethod { method: String },
    /// Broker or Blackboard unavailable during admission, after exhausting retries.
    Admission { err: String },
    /// No status/result/dataset record exists under the requested id.
    NotFound { what: String, id: String },
    /// A result was requested but the job has not reached `complete`.
    NotReady { id: String, state: String },
    /// A Blackboard read/write failed outside the admission path.
    Backend { err: String },
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ApiError::*;
        match self {
            MalformedBody { err } => write!(f, "Malformed request body: {err}"),
            Validation { err } => write!(f, "{err}"),
            UnknownMethod { method } => write!(f, "No analysis method named '{method}' is registered"),
            Admission { err } => write!(f, "Failed to admit request: {err}"),
            NotFound { what, id } => write!(f, "No {what} found for id '{id}'"),
            NotReady { id, state } => write!(f, "Job '{id}' is not ready: state is '{state}'"),
            Backend { err } => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl warp::reject::Reject for ApiError {}



/// Converts a rejection chain into the response this service promises:
/// `400` for malformed bodies, `404` for unknown methods/ids, `406` for
/// cross-field validation failures and not-ready results, `503` for
/// admission failures, `500` for anything warp itself couldn't route.
pub async fn recover(rejection: Rejection) -> Result<impl Reply, std::convert::Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(err) = rejection.find::<ApiError>() {
        match err {
            ApiError::MalformedBody { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
            ApiError::UnknownMethod { .. } | ApiError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
            ApiError::Validation { .. } | ApiError::NotReady { .. } => (StatusCode::NOT_ACCEPTABLE, err.to_string()),
            ApiError::Admission { .. } => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
            ApiError::Backend { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "an internal error has occurred".to_string()),
        }
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "an internal error has occurred".to_string())
    };

    Ok(warp::reply::with_status(message, status))
}
