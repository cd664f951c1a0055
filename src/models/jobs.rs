use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Gender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    AgeProgression,
    FaceMatching,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::AgeProgression => "age_progression",
            JobKind::FaceMatching => "face_matching",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of deferred work handed to the worker pool
///
/// Jobs live only in memory between submission and processing. `photo_url`,
/// `birth_date` and `gender` are read by age progression jobs only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub kind: JobKind,
    pub target_id: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<Gender>,
}

impl Job {
    pub fn face_matching(homeless_id: impl Into<String>) -> Self {
        Self {
            kind: JobKind::FaceMatching,
            target_id: homeless_id.into(),
            photo_url: None,
            birth_date: None,
            gender: None,
        }
    }

    pub fn age_progression(
        missing_id: impl Into<String>,
        photo_url: Option<String>,
        birth_date: Option<NaiveDate>,
        gender: Option<Gender>,
    ) -> Self {
        Self {
            kind: JobKind::AgeProgression,
            target_id: missing_id.into(),
            photo_url,
            birth_date,
            gender,
        }
    }
}

/// Result of offering a job to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Queue full or closed; the job will never run
    Dropped,
}

/// Terminal state of an accepted job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    TimedOut,
}
