//  CONFIG.rs
//
//  Description:
//!   Defines `Config`: the environment/CLI-derived settings record every
//!   service is started with. This replaces the source's process-wide
//!   normalization globals with a single explicit value threaded down
//!   the call chain, including into the inner kernel, rather than
//!   global mutable state for normalization options.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};


/***** LIBRARY *****/
/// Settings shared by `gsa-api`, `gsa-worker`, `gsa-loader` and
/// `gsa-report`, sourced from the environment (optionally via a `.env`
/// file).
///
/// Every service embeds this with `#[clap(flatten)]` in its own `Opts`
/// so that role-specific flags (e.g. the API's bind address) live
/// alongside the ambient ones without duplicating their parsing.
#[derive(Clone, Debug, Parser, Serialize, Deserialize)]
pub struct Config {
    /// Comma-separated list of Broker (Kafka) bootstrap servers.
    #[clap(long, default_value = "127.0.0.1:9092", env = "GSA_BROKER")]
    pub broker: String,

    /// Comma-separated list of Blackboard (Scylla) cluster nodes.
    #[clap(long, default_value = "127.0.0.1:9042", env = "GSA_BLACKBOARD")]
    pub blackboard: String,

    /// Keyspace the Blackboard schema lives under.
    #[clap(long, default_value = "gsa", env = "GSA_BLACKBOARD_KEYSPACE")]
    pub blackboard_keyspace: String,

    /// Use the in-memory Blackboard instead of the durable Scylla-backed one.
    /// Intended for local development and tests.
    #[clap(long, env = "GSA_BLACKBOARD_IN_MEMORY")]
    pub blackboard_in_memory: bool,

    /// Hard ceiling on a Broker queue's length; admission returns 503 at or
    /// above this.
    #[clap(long, default_value_t = 10_000, env = "GSA_MAX_QUEUE_LENGTH")]
    pub max_queue_length: usize,

    /// How many times the API retries a Broker publish before returning 503.
    #[clap(long, default_value_t = 3, env = "GSA_MAX_MESSAGE_TRIES")]
    pub max_message_tries: usize,

    /// How many times a single message may be redelivered off a Broker queue
    /// before it is dead-lettered (acked and dropped without being processed).
    #[clap(long, default_value_t = 5, env = "GSA_MAX_DELIVERY_COUNT")]
    pub max_delivery_count: u32,

    /// Seconds of silence on a `running` analysis job before the stall
    /// sweeper promotes it to `failed`.
    #[clap(long, default_value_t = 900, env = "GSA_MAX_WORKER_TIMEOUT_SECS")]
    pub max_worker_timeout_secs: u64,

    /// Seconds of silence on a `running` dataset-loading job before the
    /// stall sweeper promotes it to `failed`.
    #[clap(long, default_value_t = 1800, env = "GSA_LOADING_MAX_TIMEOUT_SECS")]
    pub loading_max_timeout_secs: u64,

    /// Minimum interval between progress writes from a single job, to
    /// avoid write thrash.
    #[clap(long, default_value_t = 2, env = "GSA_PROGRESS_UPDATE_INTERVAL_SECS")]
    pub progress_update_interval_secs: u64,

    /// How long a `status:{job_id}` record survives on the Blackboard.
    #[clap(long, default_value_t = 86_400, env = "GSA_STATUS_TTL_SECS")]
    pub status_ttl_secs: u64,

    /// How long a `result:{job_id}` blob survives on the Blackboard.
    #[clap(long, default_value_t = 604_800, env = "GSA_RESULT_TTL_SECS")]
    pub result_ttl_secs: u64,

    /// How long a loaded dataset is considered fresh enough to short-circuit
    /// a repeat load of the same resource+parameter pair.
    #[clap(long, default_value_t = 3600, env = "GSA_DATASET_CACHE_TTL_SECS")]
    pub dataset_cache_ttl_secs: u64,

    /// Path to the curated dataset search-index whitelist.
    #[clap(long, env = "GSA_SEARCH_WHITELIST")]
    pub search_whitelist: Option<PathBuf>,

    /// Path to the curated dataset search-index blacklist.
    #[clap(long, env = "GSA_SEARCH_BLACKLIST")]
    pub search_blacklist: Option<PathBuf>,

    /// Path to the example-dataset catalog consulted at search-index build
    /// time.
    #[clap(long, default_value = "/etc/gsa/data-catalog.yml", env = "GSA_DATA_CATALOG")]
    pub data_catalog: PathBuf,

    /// Identifier of the pathway-database release results are generated
    /// against, recorded in `AnalysisResult.release`.
    #[clap(long, default_value = "unspecified", env = "GSA_PATHWAY_RELEASE")]
    pub pathway_release: String,

    /// SMTP relay used by the Report Generator for notification e-mail.
    #[clap(long, default_value = "127.0.0.1:25", env = "GSA_SMTP_SERVER")]
    pub smtp_server: String,

    /// Address operator notifications go to on an unexpected promotion to
    /// `failed`.
    #[clap(long, default_value = "ops@localhost", env = "GSA_MAIL_ERROR_ADDRESS")]
    pub mail_error_address: String,

    /// Base URL the API is reachable at, used to build artifact URLs in
    /// `ReportStatus` records.
    #[clap(long, default_value = "http://localhost:8080/0.1", env = "GSA_NOTIFICATION_BASE_URL")]
    pub notification_base_url: String,

    /// Print debug-level logging.
    #[clap(short, long, env = "DEBUG")]
    pub debug: bool,
}

impl Config {
    pub fn max_worker_timeout(&self) -> Duration {
        Duration::from_secs(self.max_worker_timeout_secs)
    }

    pub fn loading_max_timeout(&self) -> Duration {
        Duration::from_secs(self.loading_max_timeout_secs)
    }

    pub fn progress_update_interval(&self) -> Duration {
        Duration::from_secs(self.progress_update_interval_secs)
    }

    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    pub fn dataset_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.dataset_cache_ttl_secs)
    }
}



#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn config_derive_is_well_formed() {
        // Exercises clap's own validation of the derive macro output
        // (duplicate flags, conflicting defaults, etc.) without touching argv.
        Config::command().debug_assert();
    }

    #[test]
    fn timeout_helpers_convert_seconds() {
        let config = Config::parse_from(["gsa-test", "--max-worker-timeout-secs", "42"]);
        assert_eq!(config.max_worker_timeout(), Duration::from_secs(42));
    }
}
