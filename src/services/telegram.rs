use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::services::notifier::{NotificationError, Notifier};

/// Longest analysis excerpt carried in an alert
const ANALYSIS_EXCERPT_CHARS: usize = 200;

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Markdown alert for a high-similarity match
pub fn format_potential_match(name: &str, score: f64, analysis: &str) -> String {
    format!(
        "🔍 *Possível correspondência!*\n*Nome*: _{}_\n*Score*: {:.0}%\n*Análise*: {}",
        name,
        score * 100.0,
        truncate(analysis, ANALYSIS_EXCERPT_CHARS)
    )
}

/// Telegram bot notification sink
pub struct TelegramNotifier {
    api_base: String,
    bot_token: String,
    chat_id: String,
    client: Client,
}

impl TelegramNotifier {
    pub fn new(
        api_base: String,
        bot_token: String,
        chat_id: String,
    ) -> Result<Self, NotificationError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            api_base,
            bot_token,
            chat_id,
            client,
        })
    }

    pub async fn send_message(&self, message: &str) -> Result<(), NotificationError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        );

        let payload = json!({
            "chat_id": self.chat_id,
            "text": message,
            "parse_mode": "Markdown",
        });

        let response = self.client.post(&url).json(&payload).send().await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            tracing::error!(status = status.as_u16(), "Telegram API error");
            return Err(NotificationError::Api(format!(
                "telegram api returned status {}",
                status
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_potential_match(
        &self,
        name: &str,
        score: f64,
        analysis: &str,
    ) -> Result<(), NotificationError> {
        tracing::info!(name, score, "Potential match found");
        self.send_message(&format_potential_match(name, score, analysis))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_format_potential_match() {
        let message = format_potential_match("João", 0.856, "olhos e nariz semelhantes");
        assert_eq!(
            message,
            "🔍 *Possível correspondência!*\n*Nome*: _João_\n*Score*: 86%\n*Análise*: olhos e nariz semelhantes"
        );
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let analysis = "ã".repeat(250);
        let truncated = truncate(&analysis, ANALYSIS_EXCERPT_CHARS);
        assert_eq!(truncated.chars().count(), ANALYSIS_EXCERPT_CHARS + 3);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate("short", 200), "short");
    }

    #[tokio::test]
    async fn test_send_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bottest-token/sendMessage")
            .match_body(mockito::Matcher::PartialJson(json!({
                "chat_id": "42",
                "parse_mode": "Markdown",
            })))
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let notifier =
            TelegramNotifier::new(server.url(), "test-token".to_string(), "42".to_string()).unwrap();

        assert_ok!(notifier.notify_potential_match("João", 0.9, "semelhantes").await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_message_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bottest-token/sendMessage")
            .with_status(403)
            .create_async()
            .await;

        let notifier =
            TelegramNotifier::new(server.url(), "test-token".to_string(), "42".to_string()).unwrap();

        let err = assert_err!(notifier.send_message("hello").await);
        assert!(matches!(err, NotificationError::Api(_)));
    }
}
