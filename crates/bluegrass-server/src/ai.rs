use async_trait::async_trait;
use bluegrass_core::summary::parse_ai_text;
use serde::Serialize;
use tracing::warn;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Seam over the text-generation backend. The summarizer only depends on
/// this trait, so its constraint and repair logic runs against a fake in
/// tests.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn is_configured(&self) -> bool;

    fn model(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, String>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Live client for the messages API. Failures degrade to a null summary,
/// never to an ingest abort.
#[derive(Clone)]
pub struct AiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AiClient {
    pub fn new(client: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl TextGenerator for AiClient {
    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, String> {
        let request = GenerateRequest {
            model: self.model.clone(),
            max_tokens,
            temperature,
            messages: vec![Message {
                role: "user".into(),
                content: prompt.into(),
            }],
        };

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("AI request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "AI backend error");
            return Err(format!("AI backend error: {status}"));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse AI response: {e}"))?;

        parse_ai_text(&value)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "Empty response from AI backend".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_only_with_api_key() {
        let client = reqwest::Client::new();
        let blank = AiClient::new(client.clone(), String::new(), "m".into());
        assert!(!blank.is_configured());

        let keyed = AiClient::new(client, "sk-test".into(), "m".into());
        assert!(keyed.is_configured());
        assert_eq!(keyed.model(), "m");
    }
}
