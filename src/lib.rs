//! Traceo Match - asynchronous face-matching pipeline
//!
//! Compares newly registered homeless people against the missing persons
//! registry through a bounded worker pool, persists likely matches for human
//! review and alerts on strong ones.

pub mod config;
pub mod core;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use crate::core::{MatchEngine, MatchError, MatchingPolicy, PoolConfig, WorkerPool};
pub use models::{Admission, Job, JobKind, Match, MatchStatus};
