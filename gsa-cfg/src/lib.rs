//  LIB.rs
//
//  Description:
//!   The `gsa-cfg` crate provides the configuration record every service
//!   is started with, replacing the source's process-wide normalization
//!   globals (`edger.norm.function`, `continuous.norm.function`,
//!   `sample.groups`) with a single explicit record passed down the call
//!   chain. It also hosts the ambient
//!   environment/CLI parsing every service shares.

pub mod config;

pub use config::Config;
