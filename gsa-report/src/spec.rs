//  SPEC.rs
//
//  Description:
//!   Defines `Context`, the shared handle threaded through the report
//!   generator's message loop.

use std::sync::Arc;

use gsa_cfg::Config;
use gsa_shr::blackboard::Blackboard;
use gsa_shr::broker::Broker;

/// The context every report-generator loop iteration closes over.
#[derive(Clone)]
pub struct Context {
    pub broker: Arc<dyn Broker>,
    pub blackboard: Arc<dyn Blackboard>,
    pub config: Arc<Config>,
}
