use crate::config::Config;
use crate::conversation::Message;
use crate::error::{HowtoError, Result};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

pub const OPENAI_CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Delimiter bounding code blocks in model output.
pub const FENCE_MARKER: &str = "```";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

/// Turns a message list into generated text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[Message], config: &Config, credential: &str) -> Result<String>;
}

/// Client for the OpenAI chat completion endpoint.
pub struct OpenAiClient {
    http: Box<dyn HttpClient>,
    endpoint: String,
}

impl OpenAiClient {
    pub fn new() -> Result<Self> {
        Ok(Self::with_http_client(Box::new(ReqwestHttpClient::new()?)))
    }

    pub fn with_http_client(http: Box<dyn HttpClient>) -> Self {
        Self {
            http,
            endpoint: OPENAI_CHAT_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn build_request_body(messages: &[Message], config: &Config) -> serde_json::Value {
        json!({
            "model": config.model,
            "messages": messages,
            "temperature": 0,
            "max_tokens": config.max_tokens,
            "top_p": 1,
            "frequency_penalty": 0,
            "presence_penalty": 0
        })
    }

    fn parse_response(response_text: &str) -> Result<String> {
        let response: ChatResponse = serde_json::from_str(response_text).map_err(|e| {
            warn!("Failed to parse completion response: {}", response_text);
            HowtoError::InvalidResponse(format!("{} (body: {})", e, response_text))
        })?;

        if let Some(error) = response.error {
            return Err(HowtoError::InvalidResponse(format!(
                "{} ({})",
                error.message,
                error.error_type.as_deref().unwrap_or("unknown error")
            )));
        }

        if let Some(usage) = &response.usage {
            debug!(
                "Completion {} used {} prompt and {} completion tokens",
                response.id.as_deref().unwrap_or("-"),
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        let first = response.choices.into_iter().next().ok_or(HowtoError::EmptyResponse)?;
        if first.finish_reason.as_deref() == Some("length") {
            warn!("Completion was cut off by max_tokens");
        }
        Ok(clean_completion(first.message.content.as_deref().unwrap_or_default()))
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, messages: &[Message], config: &Config, credential: &str) -> Result<String> {
        info!("Requesting completion from {} with {} messages", config.model, messages.len());
        let body = Self::build_request_body(messages, config);
        let authorization = format!("Bearer {}", credential);

        let response_text = self
            .http
            .post_json(
                &self.endpoint,
                &[
                    ("Authorization", authorization.as_str()),
                    ("Content-Type", "application/json"),
                ],
                &body,
            )
            .await?;
        debug!("Completion API response: {}", response_text);

        Self::parse_response(&response_text)
    }
}

/// Strips fence markers and surrounding newlines from raw model output.
///
/// Text that opens with a fence yields the fenced body; its first line is
/// dropped as a language tag only when it is a single word followed by a
/// non-empty body. Otherwise everything from the first fence on is dropped.
pub fn clean_completion(raw: &str) -> String {
    let text = raw.trim_start_matches(['\n', '\r']);

    let body = match text.strip_prefix(FENCE_MARKER) {
        Some(rest) => match rest.split_once('\n') {
            Some((tag, body))
                if !tag.trim().contains(char::is_whitespace)
                    && !before_fence(body).trim_matches(['\n', '\r']).is_empty() =>
            {
                body
            }
            _ => rest,
        },
        None => text,
    };

    before_fence(body).trim_matches(['\n', '\r']).to_string()
}

fn before_fence(text: &str) -> &str {
    match text.find(FENCE_MARKER) {
        Some(index) => &text[..index],
        None => text,
    }
}
