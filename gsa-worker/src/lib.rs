//  LIB.rs
//
//  Description:
//!   The `gsa-worker` service pulls analysis jobs off the `analysis`
//!   queue, dispatches them to the registered statistical kernel, and
//!   writes results and progress back to the Blackboard.

pub mod errors;
pub mod spec;
pub mod worker;
