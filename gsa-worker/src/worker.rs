//  WORKER.rs
//
//  Description:
//!   Implements the Analysis Worker's message loop: pull a job off the
//!   `analysis` queue, dispatch it to the registered kernel, and write
//!   results and progress back to the Blackboard.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use gsa_kernel::kernel::{Groups, KernelError, ProgressCallback};
use gsa_kernel::registry::KernelRegistry;
use gsa_shr::blackboard::TRACKED_REPORT;
use gsa_shr::broker::Delivery;
use specifications::analysis::{AnalysisInput, AnalysisResult, Dataset, DatasetResult};
use specifications::job::{JobKind, StatusRecord, TransitionError};
use specifications::param::{resolve_dataset_parameter, Parameter, ParameterScope};
use specifications::report::{ArtifactKind, ReportJob, ReportStatus};

use crate::errors::ProcessError;
use crate::spec::{Context, ProgressReporter};


/***** CONSTANTS *****/
const ANALYSIS_QUEUE: &str = "analysis";
const REPORT_QUEUE: &str = "report";


/***** ENTRYPOINT *****/
/// Runs the consume loop forever. Each delivery is processed to completion
/// (or to a logged, non-fatal error) before the next is pulled, mirroring
/// the Broker's implicit `prefetch = 1`; running several of these
/// concurrently is how an operator scales out per-instance parallelism.
pub async fn run(context: Context) {
    loop {
        let delivery = match context.broker.consume(ANALYSIS_QUEUE).await {
            Ok(delivery) => delivery,
            Err(err) => {
                error!("Failed to consume from '{ANALYSIS_QUEUE}': {err}");
                continue;
            }
        };

        if let Err(err) = process_delivery(&context, delivery).await {
            warn!("Failed to process analysis delivery: {err}");
        }
    }
}

/// Carries out the full consume-dispatch-report protocol over a single
/// delivered `AnalysisInput`.
async fn process_delivery(context: &Context, delivery: Delivery) -> Result<(), ProcessError> {
    let input: AnalysisInput = serde_json::from_slice(&delivery.payload).map_err(|err| ProcessError::MalformedPayload { err })?;
    let job_id = match &delivery.job_id {
        Some(job_id) => job_id.clone(),
        None => {
            warn!("Analysis delivery carries no job id; acking and dropping");
            ack(context, delivery).await;
            return Ok(());
        }
    };

    // Step 1: a missing or already-terminal status means this job was
    // cancelled, evicted, or redelivered after it already finished.
    let key = format!("status:{job_id}");
    let raw = match context.blackboard.get(&key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("Job '{job_id}': status record absent; dropping delivery");
            ack(context, delivery).await;
            return Ok(());
        }
        Err(err) => return Err(ProcessError::StatusUnavailable { job_id, err }),
    };
    let record: StatusRecord = serde_json::from_slice(&raw).map_err(|err| ProcessError::MalformedPayload { err })?;
    if record.state.is_terminal() {
        debug!("Job '{job_id}': already in terminal state '{}'; dropping delivery", record.state);
        ack(context, delivery).await;
        return Ok(());
    }

    // Step 2: announce we've started.
    transition_status(context, &job_id, |record| record.with_progress(0.0, "Starting analysis", Utc::now())).await?;

    // Steps 3-4: dispatch to the kernel, draining progress through a
    // rate-limited background task while the (possibly blocking) kernel runs.
    let (tx, rx) = mpsc::unbounded_channel();
    let drain_handle = tokio::spawn(drain_progress(context.clone(), job_id.clone(), rx));

    let kernels = context.kernels.clone();
    let config = context.config.clone();
    let input_for_kernel = input.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let reporter = ProgressReporter::new(tx);
        process_datasets(&kernels, &input_for_kernel, &config, &reporter)
    })
    .await;
    drain_handle.abort();

    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            error!("Job '{job_id}': kernel task panicked: {err}");
            Err(ProcessError::Kernel { err: KernelError::ComputationError { reason: "kernel task panicked".to_string() } })
        }
    };

    match result {
        // Step 5: success.
        Ok(result) => {
            let result_key = format!("result:{job_id}");
            let encoded = serde_json::to_vec(&result).map_err(|err| ProcessError::MalformedPayload { err })?;
            context.blackboard.put(&result_key, encoded, Some(context.config.result_ttl())).await.map_err(|err| ProcessError::Blackboard { err })?;
            transition_status(context, &job_id, move |record| record.complete(result_key.clone(), Utc::now())).await?;

            // Step 6: enqueue a report job if the request asked for one.
            if let Err(err) = maybe_enqueue_report(context, &job_id, &input).await {
                warn!("Job '{job_id}': failed to enqueue follow-up report job: {err}");
            }
        }
        // Step 7: the kernel failed deterministically, or named an
        // unregistered method; either way record the message and move on.
        Err(ProcessError::Kernel { err }) => {
            let message = err.to_string();
            transition_status(context, &job_id, move |record| record.fail(message.clone(), Utc::now())).await?;
        }
        Err(ProcessError::UnknownMethod { err }) => {
            let message = err.to_string();
            transition_status(context, &job_id, move |record| record.fail(message.clone(), Utc::now())).await?;
        }
        // Step 8: anything else is an infrastructure failure; propagate
        // without acking so the Broker redelivers.
        Err(other) => return Err(other),
    }

    ack(context, delivery).await;
    Ok(())
}

async fn ack(context: &Context, delivery: Delivery) {
    if let Err(err) = context.broker.ack(ANALYSIS_QUEUE, delivery).await {
        warn!("Failed to ack analysis delivery: {err}");
    }
}

/// Retries a status read-modify-write against a possible concurrent CAS
/// loss. Unlike the stall sweeper (which owns no particular job and simply
/// waits for its next tick on a loss), the worker owns this job outright
/// and keeps retrying until the write lands.
async fn transition_status<F>(context: &Context, job_id: &str, f: F) -> Result<(), ProcessError>
where
    F: Fn(StatusRecord) -> Result<StatusRecord, TransitionError>,
{
    let key = format!("status:{job_id}");
    loop {
        let raw = match context.blackboard.get(&key).await.map_err(|err| ProcessError::Blackboard { err })? {
            Some(raw) => raw,
            None => return Ok(()),
        };
        let record: StatusRecord = serde_json::from_slice(&raw).map_err(|err| ProcessError::MalformedPayload { err })?;
        let next = match f(record) {
            Ok(next) => next,
            Err(_) => return Ok(()),
        };
        let encoded = serde_json::to_vec(&next).map_err(|err| ProcessError::MalformedPayload { err })?;
        match context.blackboard.compare_and_set(&key, Some(&raw), encoded, Some(context.config.status_ttl())).await {
            Ok(true) => return Ok(()),
            Ok(false) => continue,
            Err(err) => return Err(ProcessError::Blackboard { err }),
        }
    }
}

/// Drains progress updates off `rx`, rate-limiting actual Blackboard writes
/// to `config.progress_update_interval()` and keeping only the latest
/// pending update between flushes.
async fn drain_progress(context: Context, job_id: String, mut rx: mpsc::UnboundedReceiver<(f64, String)>) {
    let interval = context.config.progress_update_interval();
    let mut last_flush = Instant::now().checked_sub(interval).unwrap_or_else(Instant::now);
    let mut pending: Option<(f64, String)> = None;

    loop {
        match rx.recv().await {
            Some(update) => pending = Some(update),
            None => return,
        }
        if last_flush.elapsed() < interval {
            continue;
        }
        if let Some((fraction, message)) = pending.take() {
            let now = Utc::now();
            let result = transition_status(&context, &job_id, move |record| record.with_progress(fraction, message.clone(), now)).await;
            if let Err(err) = result {
                warn!("Job '{job_id}': failed to write progress update: {err}");
            }
            last_flush = Instant::now();
        }
    }
}

/// A `ProgressCallback` that rescales a per-dataset `[0, 1]` fraction into
/// `[base, base + span]` of the overall job, so multi-dataset jobs report
/// smooth, monotone overall progress instead of resetting per dataset.
struct ScopedProgress<'a> {
    inner: &'a dyn ProgressCallback,
    base: f64,
    span: f64,
}

impl<'a> ProgressCallback for ScopedProgress<'a> {
    fn report(&self, fraction: f64, message: &str) {
        self.inner.report((self.base + fraction * self.span).clamp(0.0, 1.0), message);
    }
}

/// Runs the kernel dispatch over every dataset in `input`. Intended to
/// run inside `spawn_blocking`: `Kernel::process` is a synchronous
/// call that may block for minutes.
fn process_datasets(kernels: &KernelRegistry, input: &AnalysisInput, config: &gsa_cfg::Config, progress: &dyn ProgressCallback) -> Result<AnalysisResult, ProcessError> {
    let kernel = kernels.get(&input.method_name).map_err(|err| ProcessError::UnknownMethod { err })?;

    let dataset_count = input.datasets.len().max(1) as f64;
    let mut results = Vec::with_capacity(input.datasets.len());
    for (idx, dataset) in input.datasets.iter().enumerate() {
        let parameters = resolve_parameters(input, dataset);
        let prepared = kernel.prepare(&dataset.data, dataset.design.as_ref(), &dataset.dataset_type, &parameters).map_err(|err| ProcessError::Kernel { err })?;

        let gene_indices: Vec<usize> = (0..prepared.matrix.gene_ids.len()).collect();
        let groups = match &dataset.design {
            Some(design) => Groups::from_design(design, &prepared.matrix).map_err(|err| ProcessError::Kernel { err })?,
            None => Groups { group1_indices: Vec::new(), group2_indices: Vec::new() },
        };

        let scoped = ScopedProgress { inner: progress, base: idx as f64 / dataset_count, span: 1.0 / dataset_count };
        let table = kernel.process(&prepared, &gene_indices, &groups, &scoped).map_err(|err| ProcessError::Kernel { err })?;
        let fold_changes = dataset.design.as_ref().and_then(|design| kernel.gene_fold_changes(&prepared, design, &groups));

        results.push(DatasetResult {
            dataset_name: dataset.name.clone(),
            results: table.to_tsv(),
            fold_changes: fold_changes.map(|fc| fc.to_tsv()),
            reactome_links: Vec::new(),
            mappings: std::collections::HashMap::new(),
        });
    }

    Ok(AnalysisResult { release: config.pathway_release.clone(), results })
}

/// Builds the fully resolved parameter set a single dataset's kernel call
/// sees: analysis-scoped parameters apply to every dataset as given;
/// dataset-scoped parameters set at the analysis level serve as a default,
/// overridden by a same-named parameter declared on the dataset itself.
fn resolve_parameters(input: &AnalysisInput, dataset: &Dataset) -> HashMap<String, Parameter> {
    let analysis_level: HashMap<String, Parameter> = input.parameters.iter().cloned().map(|p| (p.name.clone(), p)).collect();
    let dataset_level: HashMap<String, Parameter> = dataset.parameters.iter().cloned().map(|p| (p.name.clone(), p)).collect();

    let mut names: Vec<&String> = analysis_level.keys().chain(dataset_level.keys()).collect();
    names.sort();
    names.dedup();

    names
        .into_iter()
        .filter_map(|name| resolve_dataset_parameter(name, &analysis_level, &dataset_level))
        .map(|param| (param.name.clone(), param.clone()))
        .collect()
}

/// Reads the `report`/`email` common-scoped parameters off an admitted
/// request and, if either is present, seeds a `ReportStatus`, publishes a
/// `ReportJob` onto the `report` queue, and tracks it for the stall sweeper.
async fn maybe_enqueue_report(context: &Context, analysis_job_id: &str, input: &AnalysisInput) -> Result<(), ProcessError> {
    let (artifacts, email_address) = requested_artifacts(input);
    if artifacts.is_empty() {
        return Ok(());
    }

    let counter = context.blackboard.atomic_increment("counter:report").await.map_err(|err| ProcessError::Blackboard { err })?;
    let report_job_id = format!("{}{counter:08}", JobKind::Report.id_prefix());

    let now = Utc::now();
    let status = ReportStatus::seed(report_job_id.clone(), analysis_job_id.to_string(), now);
    let key = format!("status:{report_job_id}");
    let encoded = serde_json::to_vec(&status).map_err(|err| ProcessError::MalformedPayload { err })?;
    context.blackboard.compare_and_set(&key, None, encoded, Some(context.config.status_ttl())).await.map_err(|err| ProcessError::Blackboard { err })?;

    let job = ReportJob { job_id: report_job_id.clone(), analysis_job_id: analysis_job_id.to_string(), artifacts, email_address };
    let payload = serde_json::to_vec(&job).map_err(|err| ProcessError::MalformedPayload { err })?;
    context
        .broker
        .publish(REPORT_QUEUE, &report_job_id, &payload, context.config.max_message_tries)
        .await
        .map_err(|err| ProcessError::Broker { err })?;

    gsa_shr::blackboard::track(context.blackboard.as_ref(), TRACKED_REPORT, &report_job_id).await.map_err(|err| ProcessError::Blackboard { err })?;

    info!("Job '{analysis_job_id}': enqueued report job '{report_job_id}'");
    Ok(())
}

fn requested_artifacts(input: &AnalysisInput) -> (Vec<ArtifactKind>, Option<String>) {
    let mut artifacts = Vec::new();
    let mut email_address = None;
    for param in &input.parameters {
        if param.scope != ParameterScope::Common {
            continue;
        }
        match param.name.as_str() {
            "report" if param.value == "true" => {
                artifacts.push(ArtifactKind::Spreadsheet);
                artifacts.push(ArtifactKind::Pdf);
            }
            "email" => {
                email_address = Some(param.value.clone());
                artifacts.push(ArtifactKind::Email);
            }
            _ => {}
        }
    }
    (artifacts, email_address)
}
