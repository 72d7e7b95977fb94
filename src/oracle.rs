// src/oracle.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::OracleSection;
use crate::error::OracleError;

/// A single request/response exchange with the external extraction oracle.
/// Injected into the extractor at construction so tests can substitute a
/// deterministic fake.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    /// Send a system instruction and a user payload, return the raw
    /// completion text.
    async fn complete(&self, system: &str, user: &str) -> Result<String, OracleError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Oracle backed by an OpenAI-style `/chat/completions` endpoint.
pub struct ChatOracle {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl ChatOracle {
    pub fn new(section: &OracleSection, api_key: String) -> Self {
        info!(url = %section.base_url, model = %section.model, "Using chat oracle backend");
        Self {
            client: Client::new(),
            base_url: section.base_url.clone(),
            model: section.model.clone(),
            api_key,
            timeout: Duration::from_secs(section.timeout_secs),
        }
    }
}

#[async_trait]
impl ExtractionOracle for ChatOracle {
    async fn complete(&self, system: &str, user: &str) -> Result<String, OracleError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: 0.1,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status { status, body });
        }

        let chat_response: ChatResponse = response.json().await?;
        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(OracleError::EmptyResponse)
    }
}

/// Extract the outermost JSON object from a completion that may be wrapped
/// in code fences or surrounded by commentary.
pub fn extract_json_object(s: &str) -> Result<&str, OracleError> {
    let s = s
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let start = s.find('{').ok_or(OracleError::NoJsonObject)?;
    let end = s.rfind('}').ok_or(OracleError::NoJsonObject)?;
    if end <= start {
        return Err(OracleError::NoJsonObject);
    }
    Ok(&s[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfences_json() {
        let fenced = "```json\n{\"vendor\": \"Acme\"}\n```";
        assert_eq!(extract_json_object(fenced).unwrap(), "{\"vendor\": \"Acme\"}");
    }

    #[test]
    fn skips_surrounding_commentary() {
        let noisy = "Here is the data: {\"a\": 1} hope that helps";
        assert_eq!(extract_json_object(noisy).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn rejects_text_without_object() {
        assert!(extract_json_object("no json here").is_err());
        assert!(extract_json_object("} backwards {").is_err());
    }
}
