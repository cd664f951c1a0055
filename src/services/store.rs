use crate::models::{Candidate, CandidateFilter, Match, MatchStatus, Subject};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when reading or writing registry records
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("SQLx error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Match {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: MatchStatus,
        to: MatchStatus,
    },
}

/// Record store consumed by the matching pipeline
///
/// Implementations must be safe to share between workers; the pipeline
/// imposes no locking of its own.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a homeless registry record, `StoreError::NotFound` when absent
    async fn find_subject_by_id(&self, id: &str) -> Result<Subject, StoreError>;

    /// Missing person records admitted by `filter`, at most `filter.limit` of them
    async fn find_candidates(&self, filter: &CandidateFilter)
        -> Result<Vec<Candidate>, StoreError>;

    async fn create_match(&self, m: &Match) -> Result<(), StoreError>;

    async fn find_match_by_id(&self, id: &str) -> Result<Match, StoreError>;

    async fn find_matches_by_subject(&self, subject_id: &str) -> Result<Vec<Match>, StoreError>;

    async fn find_matches_by_query(&self, query_id: &str) -> Result<Vec<Match>, StoreError>;

    /// Move a pending match to a terminal status and stamp `reviewed_at`
    ///
    /// Returns `StoreError::InvalidTransition` when the stored status does not
    /// allow the move.
    async fn update_match_status(&self, id: &str, status: MatchStatus)
        -> Result<Match, StoreError>;
}
