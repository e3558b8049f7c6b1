//! Chat-completion backed generator (OpenRouter-compatible API).
//!
//! Only the type label and the *shape* of the original (letters and digits
//! masked) leave the process; the sensitive value itself is never sent.

use super::transform::shape_of;
use super::{Generator, GeneratorError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "openai/gpt-3.5-turbo";

const SYSTEM_PROMPT: &str = "You are a fake information generator for document redaction. \
Given a PII/PHI type and the shape of the value it replaces (A = uppercase letter, \
a = lowercase letter, 9 = digit), produce one realistic but fictitious replacement with \
similar formatting. Names are full names, addresses include street, city, state and zip, \
phone numbers use (XXX) XXX-XXXX, SSNs use XXX-XX-XXXX, dates use MM/DD/YYYY. \
Output strictly as JSON: {\"replacement\": \"...\"}";

/// Settings for [`OpenRouterGenerator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl OpenRouterConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: default_model(),
            base_url: default_base_url(),
        }
    }

    /// Reads `OPENROUTER_API_KEY` (required), `OPENROUTER_MODEL` and
    /// `OPENROUTER_BASE_URL` (optional).
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY").ok()?;
        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var("OPENROUTER_MODEL") {
            config.model = model;
        }
        if let Ok(base_url) = std::env::var("OPENROUTER_BASE_URL") {
            config.base_url = base_url;
        }
        Some(config)
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// [`Generator`] calling a chat-completion endpoint.
pub struct OpenRouterGenerator {
    client: reqwest::Client,
    config: OpenRouterConfig,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ReplacementPayload {
    replacement: String,
}

impl OpenRouterGenerator {
    pub fn new(config: OpenRouterConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Generator for OpenRouterGenerator {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn generate(&self, pii_type: &str, original: &str) -> Result<String, GeneratorError> {
        let body = json!({
            "model": self.config.model,
            "temperature": 0,
            "max_tokens": 128,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": format!("Type: {}\nShape: {}", pii_type, shape_of(original))},
            ],
        });

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GeneratorError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GeneratorError::Request(format!(
                "HTTP {} from {}",
                response.status(),
                self.endpoint()
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::Request(e.to_string()))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GeneratorError::Empty(pii_type.to_string()))?;

        debug!(pii_type, "generator responded");
        parse_replacement(&content).ok_or_else(|| GeneratorError::Empty(pii_type.to_string()))
    }
}

/// Extracts the replacement from a model reply: the JSON payload if present,
/// else the first non-empty line.
fn parse_replacement(content: &str) -> Option<String> {
    let trimmed = content.trim();
    let json_part = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&trimmed[start..=end]),
        _ => None,
    };

    if let Some(payload) = json_part.and_then(|j| serde_json::from_str::<ReplacementPayload>(j).ok()) {
        let value = payload.replacement.trim().to_string();
        return (!value.is_empty()).then_some(value);
    }

    trimmed
        .lines()
        .map(|l| l.trim().trim_matches('"'))
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_reply() {
        let reply = "Sure!\n```json\n{\"replacement\": \"Jordan Ellis\"}\n```";
        assert_eq!(parse_replacement(reply), Some("Jordan Ellis".to_string()));
    }

    #[test]
    fn test_parse_plain_reply() {
        assert_eq!(
            parse_replacement("\n\"Avery Collins\"\n"),
            Some("Avery Collins".to_string())
        );
        assert_eq!(parse_replacement("  \n "), None);
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let mut config = OpenRouterConfig::new("key");
        config.base_url = "http://localhost:9999/v1/".to_string();
        let generator = OpenRouterGenerator::new(config);
        assert_eq!(generator.endpoint(), "http://localhost:9999/v1/chat/completions");
    }
}
