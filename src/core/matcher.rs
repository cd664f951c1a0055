use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::filters::CandidateSelector;
use crate::core::pool::JobProcessor;
use crate::models::{age_on, Gender, Job, JobKind, Match, MatchStatus};
use crate::services::{FaceComparer, FaceDescriber, Notifier, OracleError, RecordStore, StoreError};

/// Errors surfaced by the match decision engine
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Subject not found: {0}")]
    SubjectNotFound(String),

    #[error("Match not found: {0}")]
    MatchNotFound(String),

    #[error("Invalid match: {0}")]
    InvalidMatch(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),
}

/// Thresholds and bounds applied by the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchingPolicy {
    /// Minimum similarity persisted as a match
    pub creation_threshold: f64,
    /// Minimum similarity that alerts a human
    pub notify_threshold: f64,
    pub age_window_years: i32,
    pub candidate_limit: usize,
    pub notify_timeout: Duration,
}

impl Default for MatchingPolicy {
    fn default() -> Self {
        Self {
            creation_threshold: 0.6,
            notify_threshold: 0.8,
            age_window_years: 15,
            candidate_limit: 20,
            notify_timeout: Duration::from_secs(30),
        }
    }
}

/// Counters for one face matching pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaceMatchReport {
    pub candidates: usize,
    pub compared: usize,
    pub oracle_failures: usize,
    pub created: usize,
    pub persist_failures: usize,
    pub notified: usize,
}

/// Match decision engine
///
/// Runs a subject through the candidate selector and the comparison oracle,
/// persists every verdict above the creation threshold and alerts for those
/// above the notify threshold.
///
/// # Failure containment
/// - A missing subject aborts the job before any side effect
/// - Oracle and persistence failures only cost the candidate at hand
/// - Notifications run detached and never affect the job
pub struct MatchEngine {
    store: Arc<dyn RecordStore>,
    comparer: Arc<dyn FaceComparer>,
    describer: Option<Arc<dyn FaceDescriber>>,
    notifier: Option<Arc<dyn Notifier>>,
    selector: CandidateSelector,
    policy: MatchingPolicy,
}

impl MatchEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        comparer: Arc<dyn FaceComparer>,
        policy: MatchingPolicy,
    ) -> Self {
        Self {
            store,
            comparer,
            describer: None,
            notifier: None,
            selector: CandidateSelector::new(policy.age_window_years, policy.candidate_limit),
            policy,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_describer(mut self, describer: Arc<dyn FaceDescriber>) -> Self {
        self.describer = Some(describer);
        self
    }

    pub fn policy(&self) -> &MatchingPolicy {
        &self.policy
    }

    /// Run one full matching pass for a homeless registry record
    ///
    /// Candidates are compared one at a time so a job never holds more than
    /// one oracle call in flight.
    pub async fn process_face_matching(
        &self,
        homeless_id: &str,
    ) -> Result<FaceMatchReport, MatchError> {
        let subject = self
            .store
            .find_subject_by_id(homeless_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => MatchError::SubjectNotFound(homeless_id.to_string()),
                other => MatchError::Store(other),
            })?;

        let mut report = FaceMatchReport::default();

        let Some(subject_photo) = subject.photo() else {
            warn!(homeless_id, "Homeless has no photo, skipping face matching");
            return Ok(report);
        };

        let candidates = self.selector.select(self.store.as_ref(), &subject).await?;
        report.candidates = candidates.len();

        info!(homeless_id, candidates = candidates.len(), "Face matching started");

        for candidate in &candidates {
            let Some(candidate_photo) = candidate.photo() else {
                continue;
            };

            let comparison = match self.comparer.compare_faces(subject_photo, candidate_photo).await {
                Ok(c) => c,
                Err(e) => {
                    error!(
                        homeless_id,
                        missing_id = %candidate.id,
                        error = %e,
                        "Face comparison failed"
                    );
                    report.oracle_failures += 1;
                    continue;
                }
            };
            report.compared += 1;

            let score = comparison.similarity_score;
            info!(homeless_id, missing_id = %candidate.id, score, "Face comparison result");

            if score < self.policy.creation_threshold {
                continue;
            }

            let m = Match::pending(homeless_id, &candidate.id, score, &comparison.analysis);
            if let Err(e) = self.persist(&m).await {
                error!(
                    homeless_id,
                    missing_id = %candidate.id,
                    error = %e,
                    "Saving match failed"
                );
                report.persist_failures += 1;
                continue;
            }
            report.created += 1;

            if score >= self.policy.notify_threshold {
                if let Some(notifier) = &self.notifier {
                    self.dispatch_notification(
                        Arc::clone(notifier),
                        candidate.name.clone(),
                        score,
                        comparison.analysis,
                    );
                    report.notified += 1;
                }
            }
        }

        info!(
            homeless_id,
            compared = report.compared,
            created = report.created,
            "Face matching finished"
        );

        Ok(report)
    }

    async fn persist(&self, m: &Match) -> Result<(), MatchError> {
        m.validate()?;
        self.store.create_match(m).await?;
        Ok(())
    }

    /// Fire-and-forget alert with its own deadline
    ///
    /// The task is not tied to the job: aborting the job leaves it running
    /// and the job never waits for it.
    fn dispatch_notification(
        &self,
        notifier: Arc<dyn Notifier>,
        name: String,
        score: f64,
        analysis: String,
    ) {
        let deadline = self.policy.notify_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(
                deadline,
                notifier.notify_potential_match(&name, score, &analysis),
            )
            .await
            {
                Ok(Ok(())) => debug!(name = %name, score, "Match notification sent"),
                Ok(Err(e)) => error!(error = %e, "Match notification failed"),
                Err(_) => error!(timeout_secs = deadline.as_secs(), "Match notification timed out"),
            }
        });
    }

    /// Prepare a missing person record for age progression
    ///
    /// Computes the current age and, when a describer is configured, asks the
    /// oracle for a facial description of a person of that age and gender.
    /// Returns the description, if any.
    pub async fn process_age_progression(
        &self,
        missing_id: &str,
        photo_url: Option<&str>,
        birth_date: Option<NaiveDate>,
        gender: Option<Gender>,
    ) -> Result<Option<String>, MatchError> {
        let Some(photo_url) = photo_url.filter(|p| !p.trim().is_empty()) else {
            warn!(missing_id, "Missing person has no photo, skipping age progression");
            return Ok(None);
        };

        let current_age = birth_date
            .map(|b| age_on(b, Utc::now().date_naive()))
            .unwrap_or(0);

        let Some(describer) = &self.describer else {
            info!(missing_id, current_age, "No face describer configured, skipping age progression");
            return Ok(None);
        };

        let description = describer.describe_face(photo_url, current_age, gender).await?;
        info!(
            missing_id,
            current_age,
            description_len = description.len(),
            "Face described for age progression"
        );
        debug!(missing_id, description = %description, "Face description");

        Ok(Some(description))
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Match, MatchError> {
        if id.is_empty() {
            return Err(MatchError::InvalidMatch("id is required".into()));
        }
        self.store.find_match_by_id(id).await.map_err(|e| match e {
            StoreError::NotFound(_) => MatchError::MatchNotFound(id.to_string()),
            other => MatchError::Store(other),
        })
    }

    pub async fn find_by_subject(&self, homeless_id: &str) -> Result<Vec<Match>, MatchError> {
        Ok(self.store.find_matches_by_subject(homeless_id).await?)
    }

    pub async fn find_by_query(&self, missing_id: &str) -> Result<Vec<Match>, MatchError> {
        Ok(self.store.find_matches_by_query(missing_id).await?)
    }

    /// Review a match: `status` must be "confirmed" or "rejected" and the
    /// match must still be pending
    pub async fn update_status(&self, id: &str, status: &str) -> Result<Match, MatchError> {
        let status: MatchStatus = status.parse()?;
        if !status.is_terminal() {
            return Err(MatchError::InvalidMatch(format!(
                "cannot move a match back to {}",
                status
            )));
        }

        self.store
            .update_match_status(id, status)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => MatchError::MatchNotFound(id.to_string()),
                StoreError::InvalidTransition { from, to, .. } => MatchError::InvalidMatch(format!(
                    "match {} is already {}, cannot move to {}",
                    id, from, to
                )),
                other => MatchError::Store(other),
            })
    }
}

#[async_trait]
impl JobProcessor for MatchEngine {
    async fn process(&self, job: &Job) -> Result<(), MatchError> {
        match job.kind {
            JobKind::FaceMatching => self
                .process_face_matching(&job.target_id)
                .await
                .map(|_| ()),
            JobKind::AgeProgression => self
                .process_age_progression(
                    &job.target_id,
                    job.photo_url.as_deref(),
                    job.birth_date,
                    job.gender,
                )
                .await
                .map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = MatchingPolicy::default();
        assert_eq!(policy.creation_threshold, 0.6);
        assert_eq!(policy.notify_threshold, 0.8);
        assert_eq!(policy.age_window_years, 15);
        assert_eq!(policy.candidate_limit, 20);
        assert_eq!(policy.notify_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_error_messages() {
        let err = MatchError::SubjectNotFound("h1".to_string());
        assert_eq!(err.to_string(), "Subject not found: h1");

        let err = MatchError::from(StoreError::NotFound("m1".to_string()));
        assert!(matches!(err, MatchError::Store(_)));
    }
}
