//! Inference capability consumed by the pipeline.
//!
//! The pipeline only sees [`InferenceClient`]. [`OpenRouterClient`] is the
//! production implementation: text-only prompts go through a `rig` agent,
//! prompts with document or image attachments go through the chat
//! completions endpoint directly with base64 data URLs.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{Client, StatusCode};
use rig::{client::CompletionClient, completion::Prompt, providers::openrouter};
use serde_json::{Value, json};
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::InferenceConfig;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("invalid API key")]
    Unauthorized,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("inference service error ({0})")]
    ServiceUnavailable(u16),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("received empty or invalid response")]
    EmptyResponse,
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            InferenceError::Transport("request timed out".to_string())
        } else {
            InferenceError::Transport(err.to_string())
        }
    }
}

/// Which part of the pipeline is asking, used for model choice and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InferencePurpose {
    Classification,
    VisionExtraction,
    StructuredExtraction,
}

impl fmt::Display for InferencePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InferencePurpose::Classification => "classification",
            InferencePurpose::VisionExtraction => "vision_extraction",
            InferencePurpose::StructuredExtraction => "structured_extraction",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum Attachment {
    Document {
        filename: String,
        media_type: String,
        data: Vec<u8>,
    },
    Image {
        label: Option<String>,
        media_type: String,
        data: Vec<u8>,
    },
}

impl Attachment {
    pub fn pdf(data: Vec<u8>) -> Self {
        Attachment::Document {
            filename: "report.pdf".to_string(),
            media_type: "application/pdf".to_string(),
            data,
        }
    }

    pub fn png_page(page_number: usize, data: Vec<u8>) -> Self {
        Attachment::Image {
            label: Some(format!("Page {}:", page_number)),
            media_type: "image/png".to_string(),
            data,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub purpose: InferencePurpose,
    pub system: String,
    pub prompt: String,
    pub attachments: Vec<Attachment>,
    pub max_tokens: u32,
}

impl InferenceRequest {
    pub fn new(purpose: InferencePurpose, system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            purpose,
            system: system.into(),
            prompt: prompt.into(),
            attachments: Vec::new(),
            max_tokens: 4000,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A multimodal text-generation capability. Implementations must be safe
/// to share across concurrently running pipelines.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, request: InferenceRequest) -> Result<String, InferenceError>;
}

pub struct OpenRouterClient {
    http: Client,
    config: InferenceConfig,
}

impl OpenRouterClient {
    pub fn new(config: InferenceConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn model_for(&self, purpose: InferencePurpose) -> &str {
        match purpose {
            InferencePurpose::VisionExtraction => &self.config.vision_model,
            InferencePurpose::Classification | InferencePurpose::StructuredExtraction => {
                &self.config.text_model
            }
        }
    }

    async fn complete_with_agent(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let client = openrouter::Client::new(&self.config.api_key);
        let agent = client
            .agent(self.model_for(request.purpose))
            .preamble(&request.system)
            .temperature(0.0)
            .max_tokens(u64::from(request.max_tokens))
            .build();

        agent
            .prompt(request.prompt.as_str())
            .await
            .map_err(|e| classify_agent_error(&e.to_string()))
    }

    async fn complete_multimodal(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let payload = json!({
            "model": self.model_for(request.purpose),
            "max_tokens": request.max_tokens,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": build_content_parts(request) }
            ]
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let response_json: Value = response.json().await?;
        response_json["choices"][0]["message"]["content"]
            .as_str()
            .filter(|content| !content.trim().is_empty())
            .map(str::to_string)
            .ok_or(InferenceError::EmptyResponse)
    }
}

#[async_trait]
impl InferenceClient for OpenRouterClient {
    async fn complete(&self, request: InferenceRequest) -> Result<String, InferenceError> {
        let started = Instant::now();
        info!(
            purpose = %request.purpose,
            model = %self.model_for(request.purpose),
            prompt_chars = request.prompt.len(),
            attachments = request.attachments.len(),
            "Sending inference request"
        );

        let result = if request.attachments.is_empty() {
            self.complete_with_agent(&request).await
        } else {
            self.complete_multimodal(&request).await
        };

        match &result {
            Ok(text) => info!(
                purpose = %request.purpose,
                elapsed_ms = started.elapsed().as_millis() as u64,
                response_chars = text.len(),
                "Inference request succeeded"
            ),
            Err(e) => error!(
                purpose = %request.purpose,
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %e,
                "Inference request failed"
            ),
        }
        result
    }
}

/// Text prompt first, then each attachment as a data URL part.
fn build_content_parts(request: &InferenceRequest) -> Vec<Value> {
    let mut content = vec![json!({ "type": "text", "text": request.prompt })];

    for attachment in &request.attachments {
        match attachment {
            Attachment::Document {
                filename,
                media_type,
                data,
            } => content.push(json!({
                "type": "file",
                "file": {
                    "filename": filename,
                    "file_data": format!("data:{};base64,{}", media_type, STANDARD.encode(data))
                }
            })),
            Attachment::Image {
                label,
                media_type,
                data,
            } => {
                if let Some(label) = label {
                    content.push(json!({ "type": "text", "text": label }));
                }
                content.push(json!({
                    "type": "image_url",
                    "image_url": {
                        "url": format!("data:{};base64,{}", media_type, STANDARD.encode(data))
                    }
                }));
            }
        }
    }

    debug!(parts = content.len(), "Built multimodal content");
    content
}

fn status_error(status: StatusCode, body: String) -> InferenceError {
    match status.as_u16() {
        401 | 403 => InferenceError::Unauthorized,
        429 => InferenceError::RateLimited,
        code @ 500..=599 => InferenceError::ServiceUnavailable(code),
        code => InferenceError::Rejected {
            status: code,
            message: body.chars().take(500).collect(),
        },
    }
}

fn classify_agent_error(message: &str) -> InferenceError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("401") || lower.contains("unauthorized") {
        InferenceError::Unauthorized
    } else if lower.contains("429") || lower.contains("rate limit") {
        InferenceError::RateLimited
    } else {
        InferenceError::Transport(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachments_follow_the_prompt_in_order() {
        let request = InferenceRequest::new(InferencePurpose::VisionExtraction, "sys", "read this")
            .with_attachments(vec![
                Attachment::png_page(1, vec![1, 2, 3]),
                Attachment::pdf(b"%PDF".to_vec()),
            ]);

        let parts = build_content_parts(&request);

        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0]["text"], "read this");
        assert_eq!(parts[1]["text"], "Page 1:");
        assert_eq!(parts[2]["image_url"]["url"], "data:image/png;base64,AQID");
        assert_eq!(parts[3]["type"], "file");
        assert_eq!(parts[3]["file"]["file_data"], "data:application/pdf;base64,JVBERg==");
    }

    #[test]
    fn http_statuses_map_to_typed_errors() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, String::new()),
            InferenceError::Unauthorized
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, String::new()),
            InferenceError::RateLimited
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, String::new()),
            InferenceError::ServiceUnavailable(502)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "too large".into()),
            InferenceError::Rejected { status: 400, .. }
        ));
    }
}
