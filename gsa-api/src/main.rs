//  MAIN.rs
//
//  Description:
//!   Entrypoint to the `gsa-api` service.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use log::{debug, error, LevelFilter};
use warp::Filter;

use gsa_cfg::Config;
use gsa_shr::blackboard::{Blackboard, MokaBlackboard, ScyllaBlackboard};
use gsa_shr::broker::{Broker, KafkaBroker};

use gsa_api::spec::Context;
use gsa_api::{analysis, catalog, data, errors, report, sweeper};


/***** CONSTANTS *****/
/// In-memory Blackboard capacity when `--blackboard-in-memory` is set.
const MOKA_MAX_CAPACITY: u64 = 1_000_000;
const QUEUES: [&str; 3] = ["analysis", "dataset", "report"];


/***** ARGUMENTS *****/
#[derive(Parser)]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct Opts {
    /// Service address.
    #[clap(short, long, default_value = "127.0.0.1:8080", env = "ADDRESS")]
    address: String,

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

    let catalog_entries = match gsa_search::catalog::load_catalog(&opts.config.data_catalog) {
        Ok(entries) => entries,
        Err(err) => {
            error!("Failed to load data catalog '{}': {err}", opts.config.data_catalog.display());
            Vec::new()
        }
    };
    let whitelist = opts.config.search_whitelist.as_ref().and_then(|path| match gsa_search::catalog::load_id_list(path) {
        Ok(ids) => Some(ids),
        Err(err) => {
            error!("Failed to load search whitelist '{}': {err}", path.display());
            None
        }
    });
    let blacklist = opts.config.search_blacklist.as_ref().and_then(|path| match gsa_search::catalog::load_id_list(path) {
        Ok(ids) => Some(ids),
        Err(err) => {
            error!("Failed to load search blacklist '{}': {err}", path.display());
            None
        }
    });
    let search_index = gsa_search::SearchIndex::build(&catalog_entries, whitelist.as_ref(), blacklist.as_ref());
    debug!("Search index built over {} dataset(s)", search_index.len());

    let context = Context {
        broker,
        blackboard,
        config: Arc::new(opts.config.clone()),
        catalog: Arc::new(catalog::builtin_catalog()),
        search_index: Arc::new(search_index),
        data_sources: Arc::new(catalog::builtin_data_sources()),
        examples: Arc::new(catalog::builtin_examples()),
    };

    tokio::spawn(sweeper::run(context.clone()));

    let with_context = warp::any().map(move || context.clone());

    let methods = warp::path("methods").and(warp::path::end()).and(warp::get()).and(with_context.clone()).and_then(catalog::methods);
    let types = warp::path("types").and(warp::path::end()).and(warp::get()).and(with_context.clone()).and_then(catalog::types);

    let submit_analysis = warp::path("analysis")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::bytes())
        .and(with_context.clone())
        .and_then(analysis::submit);
    let get_status = warp::path("status")
        .and(warp::path::param())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context.clone())
        .and_then(analysis::status);
    let get_result = warp::path("result")
        .and(warp::path::param())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context.clone())
        .and_then(analysis::result);

    let report_status = warp::path("report_status")
        .and(warp::path::param())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context.clone())
        .and_then(report::status);
    let report_artifact = warp::path("report")
        .and(warp::path::param())
        .and(warp::path::param())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context.clone())
        .and_then(report::artifact);

    let data_sources = warp::path!("data" / "sources").and(warp::path::end()).and(warp::get()).and(with_context.clone()).and_then(data::sources);
    let data_examples = warp::path!("data" / "examples")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<std::collections::HashMap<String, String>>())
        .and(with_context.clone())
        .and_then(data::examples);
    let data_load = warp::path!("data" / "load" / String)
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context.clone())
        .and_then(data::load);
    let data_status = warp::path!("data" / "status" / String).and(warp::path::end()).and(warp::get()).and(with_context.clone()).and_then(data::status);
    let data_summary = warp::path!("data" / "summary" / String).and(warp::path::end()).and(warp::get()).and(with_context.clone()).and_then(data::summary);

    let routes = warp::path("0.1").and(
        methods
            .or(types)
            .or(submit_analysis)
            .or(get_status)
            .or(get_result)
            .or(report_status)
            .or(report_artifact)
            .or(data_sources)
            .or(data_examples)
            .or(data_load)
            .or(data_status)
            .or(data_summary),
    );
    let routes = routes.recover(errors::recover).with(warp::log("gsa-api"));

    let address: SocketAddr = match opts.address.parse() {
        Ok(address) => address,
        Err(err) => {
            error!("Failed to parse given address: {err}");
            std::process::exit(1);
        }
    };
    warp::serve(routes).run(address).await;
}
