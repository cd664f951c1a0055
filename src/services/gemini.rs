use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::models::{FaceComparison, Gender};
use crate::services::oracle::{FaceComparer, FaceDescriber, OracleError};

const COMPARE_PROMPT: &str = r#"Analyze these two facial photos and compare them.
Consider: facial structure, eye shape and color, nose shape, lip shape,
skin tone, face shape, distinguishing features.

Respond in JSON format:
{
    "similarity_score": 0.0-1.0,
    "analysis": "detailed explanation in Portuguese",
    "matching_features": ["feature1", "feature2"],
    "different_features": ["feature1", "feature2"],
    "confidence": "high" | "medium" | "low"
}

Be conservative with scores. Only score above 0.7 if there is strong facial resemblance.
Consider that one photo may be older (age difference is expected)."#;

fn describe_prompt(current_age: i32, gender: Option<Gender>) -> String {
    format!(
        "Describe this person's facial features in detail for age progression.\n\
         Current age: {} years old. Gender: {}.\n\
         Focus on: bone structure, eye shape, nose shape, lip shape, skin characteristics,\n\
         hair pattern, distinguishing marks.\n\
         Be specific and detailed. Respond in English.",
        current_age,
        gender.map(|g| g.as_str()).unwrap_or("unknown")
    )
}

/// Concatenated text parts of the first candidate in a generateContent response
pub fn extract_text(response: &Value) -> String {
    response
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Inner text of a ```json fenced block, or the trimmed text when unfenced
pub fn strip_json_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```") {
        let rest = &trimmed[start + 3..];
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }
    trimmed
}

/// Parse the model's comparison verdict
pub fn parse_comparison(text: &str) -> Result<FaceComparison, OracleError> {
    let body = strip_json_fence(text);
    let comparison: FaceComparison = serde_json::from_str(body).map_err(|e| {
        OracleError::InvalidResponse(format!("parsing comparison json: {} (raw: {})", e, body))
    })?;

    if !(0.0..=1.0).contains(&comparison.similarity_score) {
        return Err(OracleError::InvalidResponse(format!(
            "similarity score {} outside [0, 1]",
            comparison.similarity_score
        )));
    }

    Ok(comparison)
}

/// Gemini vision client acting as the face comparison oracle
///
/// Photos are downloaded and sent inline; the model is asked for a JSON
/// verdict.
pub struct GeminiClient {
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    client: Client,
}

impl GeminiClient {
    pub fn new(
        endpoint: String,
        api_key: String,
        model: String,
        temperature: f32,
        request_timeout: Duration,
    ) -> Result<Self, OracleError> {
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            endpoint,
            api_key,
            model,
            temperature,
            client,
        })
    }

    /// Download an image, returning its bytes and MIME type
    async fn download_image(&self, url: &str) -> Result<(Vec<u8>, String), OracleError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| OracleError::ImageDownload(format!("fetching {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(OracleError::ImageDownload(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or("image/jpeg")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| OracleError::ImageDownload(format!("reading {}: {}", url, e)))?;

        Ok((bytes.to_vec(), mime))
    }

    fn image_part(data: &[u8], mime: &str) -> Value {
        json!({
            "inline_data": {
                "mime_type": mime,
                "data": STANDARD.encode(data),
            }
        })
    }

    /// Call generateContent and return the response text
    async fn generate(&self, parts: Vec<Value>, json_response: bool) -> Result<String, OracleError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        );

        let mut generation_config = json!({ "temperature": self.temperature });
        if json_response {
            generation_config["responseMimeType"] = json!("application/json");
        }

        let payload = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": generation_config,
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "Unable to read body".to_string());
            tracing::error!("Gemini generateContent failed: {} - {}", status, body);
            return Err(OracleError::Api(format!("generateContent returned {}", status)));
        }

        let json: Value = response.json().await?;
        let text = extract_text(&json);
        if text.is_empty() {
            return Err(OracleError::InvalidResponse("response has no text parts".into()));
        }

        Ok(text)
    }
}

#[async_trait]
impl FaceComparer for GeminiClient {
    async fn compare_faces(
        &self,
        photo_a: &str,
        photo_b: &str,
    ) -> Result<FaceComparison, OracleError> {
        let (image_a, mime_a) = self.download_image(photo_a).await?;
        let (image_b, mime_b) = self.download_image(photo_b).await?;

        let parts = vec![
            Self::image_part(&image_a, &mime_a),
            Self::image_part(&image_b, &mime_b),
            json!({ "text": COMPARE_PROMPT }),
        ];

        let text = self.generate(parts, true).await?;
        parse_comparison(&text)
    }
}

#[async_trait]
impl FaceDescriber for GeminiClient {
    async fn describe_face(
        &self,
        photo_url: &str,
        current_age: i32,
        gender: Option<Gender>,
    ) -> Result<String, OracleError> {
        let (image, mime) = self.download_image(photo_url).await?;

        let parts = vec![
            Self::image_part(&image, &mime),
            json!({ "text": describe_prompt(current_age, gender) }),
        ];

        self.generate(parts, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Confidence;

    const VERDICT: &str = r#"{"similarity_score": 0.85, "analysis": "mesmo formato de rosto", "matching_features": ["eyes"], "different_features": ["hair"], "confidence": "high"}"#;

    fn gemini_body(text: &str) -> String {
        json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }], "role": "model" }
            }]
        })
        .to_string()
    }

    fn create_client(endpoint: String) -> GeminiClient {
        GeminiClient::new(
            endpoint,
            "test-key".to_string(),
            "gemini-2.0-flash".to_string(),
            0.4,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_strip_json_fence() {
        assert_eq!(strip_json_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_json_fence("```\n{\"a\": 1}```"), "{\"a\": 1}");
        assert_eq!(strip_json_fence("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(strip_json_fence("Here you go:\n```json {\"a\": 1} ``` done"), "{\"a\": 1}");
    }

    #[test]
    fn test_describe_prompt_carries_age_and_gender() {
        let prompt = describe_prompt(30, Some(Gender::Male));
        assert!(prompt.contains("Current age: 30 years old. Gender: male."));

        let prompt = describe_prompt(7, None);
        assert!(prompt.contains("Current age: 7 years old. Gender: unknown."));
    }

    #[test]
    fn test_parse_comparison() {
        let comparison = parse_comparison(&format!("```json\n{}\n```", VERDICT)).unwrap();
        assert_eq!(comparison.similarity_score, 0.85);
        assert_eq!(comparison.confidence, Confidence::High);
        assert_eq!(comparison.matching_features, vec!["eyes"]);
    }

    #[test]
    fn test_parse_comparison_rejects_out_of_range() {
        let text = r#"{"similarity_score": 1.4, "analysis": "", "confidence": "low"}"#;
        assert!(matches!(parse_comparison(text), Err(OracleError::InvalidResponse(_))));
    }

    #[test]
    fn test_parse_comparison_rejects_garbage() {
        assert!(matches!(parse_comparison("not json"), Err(OracleError::InvalidResponse(_))));
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"a\"" }, { "text": ": 1}" }] } }]
        });
        assert_eq!(extract_text(&response), "{\"a\": 1}");
        assert_eq!(extract_text(&json!({})), "");
    }

    #[tokio::test]
    async fn test_compare_faces_round_trip() {
        let mut server = mockito::Server::new_async().await;

        let photo_a = server
            .mock("GET", "/a.jpg")
            .with_header("content-type", "image/png")
            .with_body([1u8, 2, 3])
            .create_async()
            .await;
        let photo_b = server
            .mock("GET", "/b.jpg")
            .with_header("content-type", "image/jpeg")
            .with_body([4u8, 5, 6])
            .create_async()
            .await;
        let generate = server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_query(mockito::Matcher::UrlEncoded("key".into(), "test-key".into()))
            .match_body(mockito::Matcher::PartialJson(json!({
                "contents": [{ "parts": [
                    { "inline_data": { "mime_type": "image/png", "data": STANDARD.encode([1u8, 2, 3]) } },
                    { "inline_data": { "mime_type": "image/jpeg", "data": STANDARD.encode([4u8, 5, 6]) } },
                    { "text": COMPARE_PROMPT }
                ] }],
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .with_header("content-type", "application/json")
            .with_body(gemini_body(VERDICT))
            .create_async()
            .await;

        let client = create_client(server.url());
        let comparison = client
            .compare_faces(&format!("{}/a.jpg", server.url()), &format!("{}/b.jpg", server.url()))
            .await
            .unwrap();

        assert_eq!(comparison.similarity_score, 0.85);
        photo_a.assert_async().await;
        photo_b.assert_async().await;
        generate.assert_async().await;
    }

    #[tokio::test]
    async fn test_compare_faces_image_download_failure() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/missing.jpg").with_status(404).create_async().await;

        let client = create_client(server.url());
        let result = client
            .compare_faces(&format!("{}/missing.jpg", server.url()), "http://unused")
            .await;

        assert!(matches!(result, Err(OracleError::ImageDownload(_))));
    }

    #[tokio::test]
    async fn test_api_error_status() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/a.jpg").with_body([1u8]).create_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(429)
            .with_body("quota exceeded")
            .create_async()
            .await;

        let client = create_client(server.url());
        let result = client.describe_face(&format!("{}/a.jpg", server.url()), 40, None).await;

        assert!(matches!(result, Err(OracleError::Api(_))));
    }

    #[tokio::test]
    async fn test_describe_face() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/a.jpg").with_body([1u8]).create_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_query(mockito::Matcher::Any)
            .match_body(mockito::Matcher::Regex("Current age: 52 years old. Gender: female.".into()))
            .with_body(gemini_body("Oval face, deep-set eyes."))
            .create_async()
            .await;

        let client = create_client(server.url());
        let description = client
            .describe_face(&format!("{}/a.jpg", server.url()), 52, Some(Gender::Female))
            .await
            .unwrap();

        assert_eq!(description, "Oval face, deep-set eyes.");
    }
}
