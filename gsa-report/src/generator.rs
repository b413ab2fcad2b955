//  GENERATOR.rs
//
//  Description:
//!   Implements the Report Generator's message loop: consumes
//!   `ReportJob`s off the `report` queue, reads the referenced
//!   analysis result, and produces each requested artifact as an
//!   independent, weighted sub-step, under a partial-success policy.
//!   Shares the same consume/ack/retry shape as `gsa-worker`'s own
//!   message loop.

use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};

use gsa_shr::broker::Delivery;
use specifications::analysis::AnalysisResult;
use specifications::report::{ArtifactKind, ReportArtifact, ReportJob, ReportStatus, ReportTransitionError};

use crate::artifacts;
use crate::errors::{ArtifactError, ProcessError};
use crate::spec::Context;

/***** CONSTANTS *****/
const REPORT_QUEUE: &str = "report";


/***** LIBRARY *****/
/// Runs the generator's message loop forever, logging non-fatal errors and
/// moving on to the next delivery.
pub async fn run(context: Context) {
    info!("Report generator entering message loop on queue '{REPORT_QUEUE}'");
    loop {
        let delivery = match context.broker.consume(REPORT_QUEUE).await {
            Ok(delivery) => delivery,
            Err(err) => {
                error!("Failed to consume from queue '{REPORT_QUEUE}': {err}");
                continue;
            }
        };
        if let Err(err) = process_delivery(&context, delivery).await {
            warn!("Failed to process report delivery: {err}");
        }
    }
}

async fn ack(context: &Context, delivery: Delivery) {
    if let Err(err) = context.broker.ack(REPORT_QUEUE, delivery).await {
        warn!("Failed to acknowledge delivery on queue '{REPORT_QUEUE}': {err}");
    }
}

/// Processes a single delivery through to completion or failure.
///
/// # Errors
/// Returns early without acking on a Blackboard infrastructure failure, so
/// the Broker redelivers the message. A missing analysis result fails the
/// report outright (there is nothing to report on); per-artifact failures
/// are handled by the partial-success policy in `run_pipeline` and never
/// propagate here.
async fn process_delivery(context: &Context, delivery: Delivery) -> Result<(), ProcessError> {
    let job: ReportJob = match serde_json::from_slice(&delivery.payload) {
        Ok(job) => job,
        Err(err) => {
            ack(context, delivery).await;
            return Err(ProcessError::MalformedPayload { err });
        }
    };

    let raw_status = context
        .blackboard
        .get(&format!("status:{}", job.job_id))
        .await
        .map_err(|err| ProcessError::StatusUnavailable { job_id: job.job_id.clone(), err })?;
    let Some(raw_status) = raw_status else {
        warn!("No status record found for report '{}'; dropping", job.job_id);
        ack(context, delivery).await;
        return Ok(());
    };
    let status: ReportStatus = match serde_json::from_slice(&raw_status) {
        Ok(status) => status,
        Err(err) => {
            ack(context, delivery).await;
            return Err(ProcessError::MalformedPayload { err });
        }
    };
    if status.state.is_terminal() {
        debug!("Report '{}' is already in terminal state '{}'; dropping", job.job_id, status.state);
        ack(context, delivery).await;
        return Ok(());
    }

    match run_pipeline(context, &job).await {
        Ok(()) => {
            ack(context, delivery).await;
            Ok(())
        }
        Err(err @ (ProcessError::Blackboard { .. } | ProcessError::StatusUnavailable { .. } | ProcessError::ResultUnavailable { .. })) => Err(err),
        Err(err) => {
            transition_report(context, &job.job_id, |status| status.fail(err.to_string(), Utc::now()))
                .await
                .map_err(|e| ProcessError::Blackboard { err: e })?;
            ack(context, delivery).await;
            Err(err)
        }
    }
}

/// Reads the analysis result and produces each requested artifact, then
/// finalizes the report per the partial-success policy.
async fn run_pipeline(context: &Context, job: &ReportJob) -> Result<(), ProcessError> {
    let raw_result = context
        .blackboard
        .get(&format!("result:{}", job.analysis_job_id))
        .await
        .map_err(|err| ProcessError::ResultUnavailable { analysis_job_id: job.analysis_job_id.clone(), err })?;
    let Some(raw_result) = raw_result else {
        return Err(ProcessError::ResultMissing { analysis_job_id: job.analysis_job_id.clone() });
    };
    let result: AnalysisResult = serde_json::from_slice(&raw_result).map_err(|err| ProcessError::MalformedPayload { err })?;

    let mut failure_note: Option<String> = None;
    for kind in &job.artifacts {
        let outcome = build_artifact(context, *kind, &result, job).await;
        match outcome {
            Ok(bytes) => {
                let mimetype = match kind {
                    ArtifactKind::Spreadsheet => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                    ArtifactKind::Pdf => "application/pdf",
                    ArtifactKind::Email => "text/plain",
                };
                context
                    .blackboard
                    .put(&format!("report:{}:{}", job.job_id, kind.artifact_name()), bytes, Some(context.config.result_ttl()))
                    .await
                    .map_err(|err| ProcessError::Blackboard { err })?;

                let artifact = ReportArtifact::new(*kind, &job.job_id, mimetype, &context.config.notification_base_url);
                transition_report(context, &job.job_id, |status| status.record_artifact(artifact.clone(), kind.weight(), Utc::now()))
                    .await
                    .map_err(|err| ProcessError::Blackboard { err })?;
            }
            Err(err) => {
                warn!("Artifact '{kind}' failed for report '{}': {err}", job.job_id);
                failure_note = Some(err.to_string());
            }
        }
    }

    transition_report(context, &job.job_id, |status| status.finalize(failure_note.clone(), Utc::now()))
        .await
        .map_err(|err| ProcessError::Blackboard { err })?;
    gsa_shr::blackboard::untrack(context.blackboard.as_ref(), gsa_shr::blackboard::TRACKED_REPORT, &job.job_id)
        .await
        .map_err(|err| ProcessError::Blackboard { err })?;
    Ok(())
}

async fn build_artifact(context: &Context, kind: ArtifactKind, result: &AnalysisResult, job: &ReportJob) -> Result<Vec<u8>, ArtifactError> {
    match kind {
        ArtifactKind::Spreadsheet => artifacts::build_spreadsheet(result),
        ArtifactKind::Pdf => artifacts::build_pdf(result),
        ArtifactKind::Email => {
            let address = job.email_address.as_deref().ok_or_else(|| ArtifactError::Smtp { err: "no e-mail address was provided".to_string() })?;
            artifacts::send_email(&context.config.smtp_server, address, &job.analysis_job_id).await
        }
    }
}

/// Reads, transforms and compare-and-set writes the report status record,
/// retrying indefinitely on a concurrent CAS loss. Mirrors `gsa-worker`'s
/// and `gsa-loader`'s own transition helpers.
async fn transition_report<F>(context: &Context, job_id: &str, f: F) -> Result<(), gsa_shr::blackboard::Error>
where
    F: Fn(ReportStatus) -> Result<ReportStatus, ReportTransitionError>,
{
    loop {
        let key = format!("status:{job_id}");
        let Some(raw) = context.blackboard.get(&key).await? else {
            warn!("Status record for report '{job_id}' disappeared mid-transition");
            return Ok(());
        };
        let status: ReportStatus = match serde_json::from_slice(&raw) {
            Ok(status) => status,
            Err(err) => {
                warn!("Status record for report '{job_id}' is corrupt: {err}");
                return Ok(());
            }
        };
        let Ok(next) = f(status) else {
            return Ok(());
        };
        let encoded = serde_json::to_vec(&next).expect("ReportStatus is always serializable");
        if context.blackboard.compare_and_set(&key, Some(&raw), encoded, Some(context.config.status_ttl())).await? {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
