//! picdeck library
//!
//! Randomized, recency-biased picture batches over a record store and a blob
//! store that are kept consistent without a shared transaction. The binary
//! wires these pieces together; tests and embedders use them directly.

pub mod app;
pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod services;
pub mod storage;
