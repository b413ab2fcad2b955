//  LIB.rs
//
//  Description:
//!   The `gsa-api` service is the single HTTP entrypoint for the GSA
//!   orchestrator: admits analysis and dataset-load requests onto the
//!   Broker, serves status/result/report reads off the Blackboard, and
//!   runs the stall sweeper that promotes silently-stuck jobs to
//!   `failed`.

pub mod analysis;
pub mod body;
pub mod catalog;
pub mod data;
pub mod errors;
pub mod report;
pub mod spec;
pub mod sweeper;
