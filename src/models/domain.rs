use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::core::MatchError;

/// Returned when a stored or submitted string is not a known enum value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl FromStr for Gender {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(UnknownVariant::new("gender", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkinColor {
    White,
    Brown,
    Black,
    Yellow,
}

impl SkinColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkinColor::White => "white",
            SkinColor::Brown => "brown",
            SkinColor::Black => "black",
            SkinColor::Yellow => "yellow",
        }
    }
}

impl FromStr for SkinColor {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "white" => Ok(SkinColor::White),
            "brown" => Ok(SkinColor::Brown),
            "black" => Ok(SkinColor::Black),
            "yellow" => Ok(SkinColor::Yellow),
            other => Err(UnknownVariant::new("skin color", other)),
        }
    }
}

/// Eligibility status of a missing person record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingStatus {
    Disappeared,
    Found,
}

impl MissingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingStatus::Disappeared => "disappeared",
            MissingStatus::Found => "found",
        }
    }
}

impl FromStr for MissingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disappeared" => Ok(MissingStatus::Disappeared),
            "found" => Ok(MissingStatus::Found),
            other => Err(UnknownVariant::new("missing status", other)),
        }
    }
}

/// Whole years elapsed between `birth_date` and `today`
pub fn age_on(birth_date: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth_date.year();
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }
    age
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// A homeless registry record driving a face matching job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    pub gender: Gender,
    pub skin: SkinColor,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl Subject {
    /// Age today; records without a birth date count as 0
    pub fn age(&self) -> i32 {
        self.age_on(Utc::now().date_naive())
    }

    pub fn age_on(&self, today: NaiveDate) -> i32 {
        self.birth_date.map(|b| age_on(b, today)).unwrap_or(0)
    }

    pub fn photo(&self) -> Option<&str> {
        non_empty(&self.photo_url)
    }
}

/// A missing person record from the candidate population
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    pub gender: Gender,
    pub skin: SkinColor,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub status: MissingStatus,
}

impl Candidate {
    pub fn age(&self) -> i32 {
        self.age_on(Utc::now().date_naive())
    }

    pub fn age_on(&self, today: NaiveDate) -> i32 {
        self.birth_date.map(|b| age_on(b, today)).unwrap_or(0)
    }

    pub fn photo(&self) -> Option<&str> {
        non_empty(&self.photo_url)
    }
}

/// Query contract bounding the candidate search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFilter {
    pub gender: Gender,
    pub skin: SkinColor,
    pub min_age: i32,
    pub max_age: i32,
    pub status: MissingStatus,
    pub limit: usize,
}

/// Review state of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "match_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Confirmed => "confirmed",
            MatchStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, MatchStatus::Pending)
    }

    /// Transitions only ever go from Pending to one terminal state
    pub fn can_transition_to(&self, next: MatchStatus) -> bool {
        *self == MatchStatus::Pending && next.is_terminal()
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MatchStatus::Pending),
            "confirmed" => Ok(MatchStatus::Confirmed),
            "rejected" => Ok(MatchStatus::Rejected),
            other => Err(MatchError::InvalidMatch(format!("invalid status {:?}", other))),
        }
    }
}

/// Durable record of a high-similarity comparison
///
/// `subject_id` is the homeless record that drove the job and `query_id` is
/// the missing person it resembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub subject_id: String,
    pub query_id: String,
    pub score: f64,
    pub status: MatchStatus,
    pub analysis: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Match {
    /// New match awaiting review, with a freshly generated id
    pub fn pending(
        subject_id: impl Into<String>,
        query_id: impl Into<String>,
        score: f64,
        analysis: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject_id.into(),
            query_id: query_id.into(),
            score,
            status: MatchStatus::Pending,
            analysis: analysis.into(),
            created_at: Utc::now(),
            reviewed_at: None,
        }
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.subject_id.is_empty() {
            return Err(MatchError::InvalidMatch("subject_id is required".into()));
        }
        if self.query_id.is_empty() {
            return Err(MatchError::InvalidMatch("query_id is required".into()));
        }
        if !(0.0..=1.0).contains(&self.score) {
            return Err(MatchError::InvalidMatch(
                "score must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }
}

/// Qualitative confidence reported by the comparison oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Verdict returned by the comparison oracle for two face photos
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceComparison {
    pub similarity_score: f64,
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub matching_features: Vec<String>,
    #[serde(default)]
    pub different_features: Vec<String>,
    pub confidence: Confidence,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_age_before_and_after_birthday() {
        let birth = date(1980, 6, 15);
        assert_eq!(age_on(birth, date(2025, 6, 14)), 44);
        assert_eq!(age_on(birth, date(2025, 6, 15)), 45);
        assert_eq!(age_on(birth, date(2025, 12, 31)), 45);
    }

    #[test]
    fn test_age_without_birth_date_is_zero() {
        let subject = Subject {
            id: "h1".to_string(),
            name: "Carlos".to_string(),
            birth_date: None,
            gender: Gender::Male,
            skin: SkinColor::Brown,
            photo_url: None,
        };
        assert_eq!(subject.age(), 0);
    }

    #[test]
    fn test_blank_photo_is_absent() {
        let mut subject = Subject {
            id: "h1".to_string(),
            name: "Carlos".to_string(),
            birth_date: None,
            gender: Gender::Male,
            skin: SkinColor::Brown,
            photo_url: Some("  ".to_string()),
        };
        assert!(subject.photo().is_none());

        subject.photo_url = Some("http://photo1.jpg".to_string());
        assert_eq!(subject.photo(), Some("http://photo1.jpg"));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("confirmed".parse::<MatchStatus>().unwrap(), MatchStatus::Confirmed);
        assert!(matches!(
            "invalid".parse::<MatchStatus>(),
            Err(MatchError::InvalidMatch(_))
        ));
        assert!("Female".parse::<Gender>().is_err());
        assert_eq!("yellow".parse::<SkinColor>().unwrap(), SkinColor::Yellow);
    }

    #[test]
    fn test_status_transitions_are_monotonic() {
        assert!(MatchStatus::Pending.can_transition_to(MatchStatus::Confirmed));
        assert!(MatchStatus::Pending.can_transition_to(MatchStatus::Rejected));
        assert!(!MatchStatus::Pending.can_transition_to(MatchStatus::Pending));
        assert!(!MatchStatus::Confirmed.can_transition_to(MatchStatus::Rejected));
        assert!(!MatchStatus::Rejected.can_transition_to(MatchStatus::Pending));
    }

    #[test]
    fn test_match_validate() {
        let m = Match::pending("h1", "m1", 0.5, "analysis");
        assert!(m.validate().is_ok());
        assert_eq!(m.status, MatchStatus::Pending);
        assert!(m.reviewed_at.is_none());
    }

    #[test]
    fn test_match_validate_missing_fields() {
        let m = Match::pending("", "", 0.5, "");
        assert!(matches!(m.validate(), Err(MatchError::InvalidMatch(_))));
    }

    #[test]
    fn test_match_validate_score_out_of_range() {
        let m = Match::pending("h1", "m1", 1.5, "");
        assert!(matches!(m.validate(), Err(MatchError::InvalidMatch(_))));
    }

    #[test]
    fn test_face_comparison_deserialize() {
        let json = r#"{
            "similarity_score": 0.72,
            "analysis": "formato do rosto semelhante",
            "matching_features": ["eyes", "nose"],
            "confidence": "medium"
        }"#;

        let comparison: FaceComparison = serde_json::from_str(json).unwrap();
        assert_eq!(comparison.similarity_score, 0.72);
        assert_eq!(comparison.confidence, Confidence::Medium);
        assert!(comparison.different_features.is_empty());
    }
}
