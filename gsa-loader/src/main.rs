//  MAIN.rs
//
//  Description:
//!   Entrypoint to the `gsa-loader` service.

use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use log::{debug, error, LevelFilter};

use gsa_cfg::Config;
use gsa_shr::blackboard::{Blackboard, MokaBlackboard, ScyllaBlackboard};
use gsa_shr::broker::{Broker, KafkaBroker};

use gsa_loader::fetcher::HttpSourceFetcher;
use gsa_loader::loader;
use gsa_loader::spec::Context;


/***** CONSTANTS *****/
const MOKA_MAX_CAPACITY: u64 = 1_000_000;
const QUEUES: [&str; 3] = ["analysis", "dataset", "report"];


/***** ARGUMENTS *****/
#[derive(Parser)]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct Opts {
    /// Base URL of the source registry datasets are fetched from, addressed
    /// as `{source_base_url}/{resource_id}/matrix.tsv` and `.../metadata.json`.
    #[clap(long, default_value = "http://127.0.0.1:8081", env = "GSA_SOURCE_BASE_URL")]
    source_base_url: String,

    #[clap(flatten)]
    config: Config,
}


/***** ENTRYPOINT *****/
#[tokio::main]
async fn main() {
    dotenv().ok();
    let opts = Opts::parse();

    let mut logger = env_logger::builder();
    logger.format_module_path(false);
    if opts.config.debug {
        logger.filter_level(LevelFilter::Debug).init();
    } else {
        logger.filter_level(LevelFilter::Info).init();
    }

    let blackboard: Arc<dyn Blackboard> = if opts.config.blackboard_in_memory {
        debug!("Using the in-memory Blackboard (--blackboard-in-memory)");
        Arc::new(MokaBlackboard::new(MOKA_MAX_CAPACITY))
    } else {
        debug!("Connecting to Blackboard cluster '{}'...", opts.config.blackboard);
        let hosts: Vec<&str> = opts.config.blackboard.split(',').collect();
        match ScyllaBlackboard::connect(&hosts, opts.config.blackboard_keyspace.as_str()).await {
            Ok(blackboard) => Arc::new(blackboard),
            Err(err) => {
                error!("Failed to connect to Blackboard: {err}");
                std::process::exit(1);
            }
        }
    };

    debug!("Connecting to Broker '{}'...", opts.config.broker);
    let broker = match KafkaBroker::connect(opts.config.broker.as_str(), &QUEUES, blackboard.clone(), opts.config.max_delivery_count).await {
        Ok(broker) => Arc::new(broker) as Arc<dyn Broker>,
        Err(err) => {
            error!("Failed to connect to Broker: {err}");
            std::process::exit(1);
        }
    };

    debug!("Fetching datasets from source '{}'", opts.source_base_url);
    let fetcher = Arc::new(HttpSourceFetcher::new(opts.source_base_url.clone()));

    let context = Context { broker, blackboard, config: Arc::new(opts.config.clone()), fetcher };

    loader::run(context).await;
}
