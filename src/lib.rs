//! mrkit — a single-machine MapReduce engine.
//!
//! Partitions input files into map tasks, hands them to a pool of worker
//! processes speaking a tarpc-based master/worker protocol, routes
//! intermediate key-value pairs to a fixed number of reducer partitions by
//! hash, and emits one reduce output per partition.

pub mod mr;
