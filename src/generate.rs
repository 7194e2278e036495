//! Review generation via an OpenAI-compatible chat endpoint.
//!
//! Formats the grounded prompt, wraps it in the generation model's delimiter
//! framing, and issues one synchronous chat-completions call. Transport
//! failures and non-success statuses are fatal here; retrying a generation
//! call is never correct at this layer.

use crate::error::{OptionExt, Result, ScholarError};
use crate::pipeline::PipelineContext;
use crate::prompts::review::build_review_prompt;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Preamble token expected by the generation model.
const PROMPT_PREAMBLE: &str = "<|begin_of_text|>";

/// Generation requests may run for minutes.
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// A single chat turn. Closed over exactly the three roles the serialization
/// format defines; other roles are unrepresentable.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    System(String),
    User(String),
    Assistant(String),
}

impl ChatMessage {
    /// Total serialization into the model's role-delimiter format.
    pub fn serialize(&self) -> String {
        match self {
            ChatMessage::System(content) => format!("<|system|>\n{}\n", content.trim()),
            ChatMessage::User(content) => format!("<|user|>\n{}\n", content.trim()),
            ChatMessage::Assistant(content) => format!("<|assistant|>\n{}\n", content.trim()),
        }
    }
}

/// Wrap a fully formatted prompt in the model's framing: the preamble token,
/// one user turn, and an open assistant turn with no content, signaling the
/// model to continue.
pub fn frame_prompt(prompt: &str) -> String {
    format!(
        "{}{}<|assistant|>\n",
        PROMPT_PREAMBLE,
        ChatMessage::User(prompt.to_string()).serialize()
    )
}

/// Generation endpoint configuration.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:38011/v1".to_string(),
            api_key: String::new(),
            model: "OpenSciLM/Llama-3.1_OpenScholar-8B".to_string(),
            temperature: 0.7,
            max_tokens: 3000,
        }
    }
}

/// OpenAI-compatible API response structures
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Client for the generation endpoint, holding one long-lived HTTP handle.
pub struct ReviewGenerator {
    client: reqwest::Client,
    config: GeneratorConfig,
}

impl ReviewGenerator {
    /// Create a new ReviewGenerator.
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ScholarError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Generate the review for an assembled pipeline context.
    ///
    /// Returns the first choice's content verbatim.
    pub async fn generate(&self, context: &PipelineContext) -> Result<String> {
        let prompt = build_review_prompt(
            &context.reference_block,
            &context.citation_block,
            &context.target_abstract,
            &context.innovation_summary,
        );
        let framed = frame_prompt(&prompt);

        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "user", "content": framed}
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "stream": false
        });

        let api_url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        info!(
            model = %self.config.model,
            prompt_chars = framed.len(),
            "Requesting review generation"
        );

        let response = self
            .client
            .post(&api_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(ScholarError::Network)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ScholarError::Api {
                code: status.as_u16() as i32,
                message: format!("Generation API error: {} - {}", status, error_text),
            });
        }

        let api_response: ChatCompletionResponse = response.json().await.map_err(|e| {
            ScholarError::Parse(format!("Failed to parse generation response: {}", e))
        })?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_parse("generation response contained no choices")?;

        debug!(chars = content.len(), "Review generated");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_context() -> PipelineContext {
        PipelineContext {
            keywords: vec!["generative ai".to_string()],
            target_abstract: "We propose a thing.".to_string(),
            innovation_summary: "The thing is new.".to_string(),
            reference_block: "Title: T. Abstract: A.\n".to_string(),
            citation_block: "[0] Title: T. Abstract: A.\n".to_string(),
        }
    }

    #[test]
    fn test_serialize_all_roles() {
        assert_eq!(
            ChatMessage::System("sys".to_string()).serialize(),
            "<|system|>\nsys\n"
        );
        assert_eq!(
            ChatMessage::User("usr".to_string()).serialize(),
            "<|user|>\nusr\n"
        );
        assert_eq!(
            ChatMessage::Assistant("out".to_string()).serialize(),
            "<|assistant|>\nout\n"
        );
    }

    #[test]
    fn test_frame_prompt_shape() {
        let framed = frame_prompt("hello");
        assert_eq!(framed, "<|begin_of_text|><|user|>\nhello\n<|assistant|>\n");
    }

    #[tokio::test]
    async fn test_generate_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("We propose a thing."))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"choices": [{"message": {"content": "A fine review."}},
                                {"message": {"content": "ignored"}}]}"#,
            ))
            .mount(&server)
            .await;

        let generator = ReviewGenerator::new(GeneratorConfig {
            base_url: server.uri(),
            ..GeneratorConfig::default()
        })
        .expect("Failed to build generator");

        let review = generator
            .generate(&test_context())
            .await
            .expect("Generation failed");
        assert_eq!(review, "A fine review.");
    }

    #[tokio::test]
    async fn test_generate_non_success_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;

        let generator = ReviewGenerator::new(GeneratorConfig {
            base_url: server.uri(),
            ..GeneratorConfig::default()
        })
        .expect("Failed to build generator");

        let err = generator
            .generate(&test_context())
            .await
            .expect_err("Expected API error");
        match err {
            ScholarError::Api { code, .. } => assert_eq!(code, 500),
            other => panic!("Unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_empty_choices_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"choices": []}"#))
            .mount(&server)
            .await;

        let generator = ReviewGenerator::new(GeneratorConfig {
            base_url: server.uri(),
            ..GeneratorConfig::default()
        })
        .expect("Failed to build generator");

        let err = generator
            .generate(&test_context())
            .await
            .expect_err("Expected parse error");
        assert!(matches!(err, ScholarError::Parse(_)));
    }
}
