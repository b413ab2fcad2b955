//  MAIN.rs
//
//  Description:
//!   Entrypoint to the `gsa-worker` service.

use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use log::{debug, error, LevelFilter};

use gsa_cfg::Config;
use gsa_kernel::KernelRegistry;
use gsa_kernel::ora::OraKernel;
use gsa_kernel::ssgsea::SsgseaKernel;
use gsa_shr::blackboard::{Blackboard, MokaBlackboard, ScyllaBlackboard};
use gsa_shr::broker::{Broker, KafkaBroker};

use gsa_worker::spec::Context;
use gsa_worker::worker;


/***** CONSTANTS *****/
const MOKA_MAX_CAPACITY: u64 = 1_000_000;
const QUEUES: [&str; 3] = ["analysis", "dataset", "report"];


/***** ARGUMENTS *****/
#[derive(Parser)]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct Opts {
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

    let mut kernels = KernelRegistry::new();
    kernels.register(Arc::new(OraKernel::new()));
    kernels.register(Arc::new(SsgseaKernel::new()));
    if let Err(err) = kernels.load_all() {
        error!("Failed to load a kernel's libraries: {err}");
        std::process::exit(1);
    }
    debug!("Registered kernels: {}", kernels.method_names().collect::<Vec<_>>().join(", "));

    let context = Context { broker, blackboard, config: Arc::new(opts.config.clone()), kernels: Arc::new(kernels) };

    worker::run(context).await;
}
