//! # queuectl
//!
//! Persistent, multi-worker job queue for shell commands.
//!
//! Jobs live in one SQLite table shared by every worker. Workers claim the
//! oldest eligible job with a single conditional update, run it, and write
//! back completion, a backoff-delayed retry, or a move to the dead-letter
//! queue. Processing leases let crashed workers' jobs be recovered without
//! disturbing live ones.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod telemetry;
