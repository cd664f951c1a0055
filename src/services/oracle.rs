use crate::models::{FaceComparison, Gender};
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by the face comparison oracle
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Image download failed: {0}")]
    ImageDownload(String),

    #[error("API returned error: {0}")]
    Api(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Scores the visual similarity of two face photos
#[async_trait]
pub trait FaceComparer: Send + Sync {
    async fn compare_faces(
        &self,
        photo_a: &str,
        photo_b: &str,
    ) -> Result<FaceComparison, OracleError>;
}

/// Produces a textual description of a face, used for age progression
#[async_trait]
pub trait FaceDescriber: Send + Sync {
    async fn describe_face(
        &self,
        photo_url: &str,
        current_age: i32,
        gender: Option<Gender>,
    ) -> Result<String, OracleError>;
}
