use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    Api(String),
}

/// Best-effort outbound alert sink
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_potential_match(
        &self,
        name: &str,
        score: f64,
        analysis: &str,
    ) -> Result<(), NotificationError>;
}
