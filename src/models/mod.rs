// Model exports
pub mod domain;
pub mod jobs;

pub use domain::{
    age_on, Candidate, CandidateFilter, Confidence, FaceComparison, Gender, Match, MatchStatus,
    MissingStatus, SkinColor, Subject, UnknownVariant,
};
pub use jobs::{Admission, Job, JobKind, JobOutcome};
