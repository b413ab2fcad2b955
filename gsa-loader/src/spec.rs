//  SPEC.rs
//
//  Description:
//!   Defines `Context`, the shared handle threaded through the loader's
//!   message loop.

use std::sync::Arc;

use gsa_cfg::Config;
use gsa_shr::blackboard::Blackboard;
use gsa_shr::broker::Broker;

use crate::fetcher::SourceFetcher;

/// The context every loader loop iteration closes over.
#[derive(Clone)]
pub struct Context {
    pub broker: Arc<dyn Broker>,
    pub blackboard: Arc<dyn Blackboard>,
    pub config: Arc<Config>,
    pub fetcher: Arc<dyn SourceFetcher>,
}
