use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::core::matches_candidate_filter;
use crate::models::{Candidate, CandidateFilter, Match, MatchStatus, Subject};
use crate::services::store::{RecordStore, StoreError};

/// In-process record store
///
/// Keeps candidates and matches in insertion order. Used for local runs,
/// tests and benchmarks where no database is available.
#[derive(Debug, Default)]
pub struct MemoryStore {
    subjects: RwLock<HashMap<String, Subject>>,
    candidates: RwLock<Vec<Candidate>>,
    matches: RwLock<Vec<Match>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_subject(&self, subject: Subject) {
        self.subjects.write().await.insert(subject.id.clone(), subject);
    }

    pub async fn insert_candidate(&self, candidate: Candidate) {
        self.candidates.write().await.push(candidate);
    }

    /// All stored matches, oldest first
    pub async fn matches(&self) -> Vec<Match> {
        self.matches.read().await.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_subject_by_id(&self, id: &str) -> Result<Subject, StoreError> {
        self.subjects
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("homeless {}", id)))
    }

    async fn find_candidates(
        &self,
        filter: &CandidateFilter,
    ) -> Result<Vec<Candidate>, StoreError> {
        let today = Utc::now().date_naive();
        let candidates = self.candidates.read().await;

        Ok(candidates
            .iter()
            .filter(|c| matches_candidate_filter(c, filter, today))
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn create_match(&self, m: &Match) -> Result<(), StoreError> {
        let mut matches = self.matches.write().await;
        if matches.iter().any(|existing| existing.id == m.id) {
            return Err(StoreError::InvalidData(format!("duplicate match id {}", m.id)));
        }
        matches.push(m.clone());
        Ok(())
    }

    async fn find_match_by_id(&self, id: &str) -> Result<Match, StoreError> {
        self.matches
            .read()
            .await
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("match {}", id)))
    }

    async fn find_matches_by_subject(&self, subject_id: &str) -> Result<Vec<Match>, StoreError> {
        Ok(self
            .matches
            .read()
            .await
            .iter()
            .filter(|m| m.subject_id == subject_id)
            .cloned()
            .collect())
    }

    async fn find_matches_by_query(&self, query_id: &str) -> Result<Vec<Match>, StoreError> {
        Ok(self
            .matches
            .read()
            .await
            .iter()
            .filter(|m| m.query_id == query_id)
            .cloned()
            .collect())
    }

    async fn update_match_status(
        &self,
        id: &str,
        status: MatchStatus,
    ) -> Result<Match, StoreError> {
        let mut matches = self.matches.write().await;
        let m = matches
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("match {}", id)))?;

        if !m.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                from: m.status,
                to: status,
            });
        }

        m.status = status;
        m.reviewed_at = Some(Utc::now());
        Ok(m.clone())
    }
}
