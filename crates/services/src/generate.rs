//! Text generation service client
//!
//! Calls a chat-completions endpoint and returns either plain reply text or,
//! when the model answered with a styled clip plan, the parsed plan.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::ServiceError;

/// Generation service configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Chat-completions endpoint URL
    pub url: String,
    /// Bearer token
    pub api_key: String,
    /// Model identifier
    pub model: String,
    /// System prompt prepended to every request
    pub system_prompt: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9001/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            system_prompt: String::new(),
        }
    }
}

/// One line of a styled clip plan: what to say and in which style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyledLine {
    /// Emotion/style tag for synthesis and rendering
    #[serde(alias = "emotion")]
    pub style: String,
    /// The text to speak
    pub text: String,
}

/// Generated reply: plain text, or a structured plan of styled lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedReply {
    Text(String),
    ClipPlan(Vec<StyledLine>),
}

impl GeneratedReply {
    /// The reply rendered as display text
    pub fn display_text(&self) -> String {
        match self {
            GeneratedReply::Text(text) => text.clone(),
            GeneratedReply::ClipPlan(lines) => lines
                .iter()
                .map(|l| l.text.as_str())
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// Parse model output into a reply.
///
/// A JSON array of `{style|emotion, text}` objects is a clip plan; anything
/// else is plain text.
pub fn parse_reply(content: &str) -> GeneratedReply {
    match serde_json::from_str::<Vec<StyledLine>>(content.trim()) {
        Ok(lines) if !lines.is_empty() => GeneratedReply::ClipPlan(lines),
        _ => GeneratedReply::Text(content.to_string()),
    }
}

/// Text generation collaborator
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a reply to the user's text
    async fn generate(&self, text: &str) -> Result<GeneratedReply, ServiceError>;
}

/// HTTP chat-completions client
pub struct HttpGenerator {
    client: reqwest::Client,
    config: GeneratorConfig,
}

impl HttpGenerator {
    /// Create a new client
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        let mut messages = Vec::new();
        if !self.config.system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": self.config.system_prompt}));
        }
        messages.push(json!({"role": "user", "content": text}));

        json!({
            "model": self.config.model,
            "messages": messages,
        })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, text: &str) -> Result<GeneratedReply, ServiceError> {
        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(text))
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = response.json().await?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                ServiceError::MissingResult("chat completion carried no content".to_string())
            })?;

        tracing::info!(chars = content.len(), "Generation result received");
        Ok(parse_reply(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_text() {
        let reply = parse_reply("Hello there, nice to meet you.");
        assert_eq!(
            reply,
            GeneratedReply::Text("Hello there, nice to meet you.".to_string())
        );
    }

    #[test]
    fn test_parse_clip_plan() {
        let content = r#"[
            {"emotion": "happy", "text": "Great news!"},
            {"style": "calm", "text": "Let me explain."}
        ]"#;

        match parse_reply(content) {
            GeneratedReply::ClipPlan(lines) => {
                assert_eq!(lines.len(), 2);
                assert_eq!(lines[0].style, "happy");
                assert_eq!(lines[0].text, "Great news!");
                assert_eq!(lines[1].style, "calm");
            }
            other => panic!("expected clip plan, got {:?}", other),
        }
    }

    #[test]
    fn test_json_without_plan_shape_is_text() {
        let content = r#"{"type": "noop"}"#;
        assert!(matches!(parse_reply(content), GeneratedReply::Text(_)));

        let content = "[]";
        assert!(matches!(parse_reply(content), GeneratedReply::Text(_)));
    }

    #[test]
    fn test_display_text_joins_plan_lines() {
        let reply = GeneratedReply::ClipPlan(vec![
            StyledLine {
                style: "happy".to_string(),
                text: "One. ".to_string(),
            },
            StyledLine {
                style: "calm".to_string(),
                text: "Two.".to_string(),
            },
        ]);
        assert_eq!(reply.display_text(), "One. Two.");
    }

    #[test]
    fn test_request_body_shape() {
        let generator = HttpGenerator::new(GeneratorConfig {
            system_prompt: "You are an assistant.".to_string(),
            ..GeneratorConfig::default()
        });

        let body = generator.request_body("hi");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "hi");
    }
}
