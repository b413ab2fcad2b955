//  SPEC.rs
//
//  Description:
//!   Defines `Context`, the shared handle threaded through the worker's
//!   message loop, and `ProgressReporter`, the rate-limited progress
//!   callback a kernel's `process` step writes through: an explicit
//!   channel rather than exceptions.

use std::sync::Arc;

use gsa_cfg::Config;
use gsa_kernel::KernelRegistry;
use gsa_shr::blackboard::Blackboard;
use gsa_shr::broker::Broker;
use tokio::sync::mpsc::UnboundedSender;

/// The context every worker loop iteration closes over.
#[derive(Clone)]
pub struct Context {
    pub broker: Arc<dyn Broker>,
    pub blackboard: Arc<dyn Blackboard>,
    pub config: Arc<Config>,
    pub kernels: Arc<KernelRegistry>,
}

/// A `gsa_kernel::ProgressCallback` the worker hands to a kernel's `process`
/// step, which may run on a blocking thread for minutes. `report` is
/// synchronous and merely forwards onto an unbounded channel; the
/// async loop in `worker.rs` drains it and performs the actual
/// rate-limited Blackboard write via this explicit channel rather than
/// exceptions.
pub struct ProgressReporter {
    sender: UnboundedSender<(f64, String)>,
}

impl ProgressReporter {
    pub fn new(sender: UnboundedSender<(f64, String)>) -> Self {
        Self { sender }
    }
}

impl gsa_kernel::kernel::ProgressCallback for ProgressReporter {
    fn report(&self, fraction: f64, message: &str) {
        // The receiver may already be gone if the job finished between the
        // kernel's last progress call and now; nothing useful to do about it.
        let _ = self.sender.send((fraction, message.to_string()));
    }
}
