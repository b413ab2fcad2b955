//  LIB.rs
//
//  Description:
//!   The `gsa-shr` crate defines the Broker and Blackboard client
//!   abstractions shared by every service (`gsa-api`, `gsa-worker`,
//!   `gsa-loader`, `gsa-report`). This crate differs from
//!   `specifications` in that it does not aim to standardize wire
//!   types, but rather provide a common implementation of the
//!   infrastructure those types travel over.

pub mod blackboard;
pub mod broker;
