// Core pipeline exports
pub mod filters;
pub mod matcher;
pub mod pool;

pub use filters::{birth_date_window, matches_candidate_filter, CandidateSelector};
pub use matcher::{FaceMatchReport, MatchEngine, MatchError, MatchingPolicy};
pub use pool::{JobProcessor, PoolConfig, PoolStats, WorkerPool};
