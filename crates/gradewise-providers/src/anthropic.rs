//! Anthropic Messages API text generator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use gradewise_core::error::ServiceError;
use gradewise_core::traits::TextGenerator;

use crate::error::{check_status, http_client, normalize_base_url, require_key, transport_error};
use crate::SYSTEM_PROMPT;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

pub struct AnthropicGenerator {
    api_key: String,
    base_url: String,
    model: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl AnthropicGenerator {
    pub fn new(
        api_key: &str,
        model: Option<String>,
        base_url: Option<String>,
        timeout_secs: Option<u64>,
    ) -> anyhow::Result<Self> {
        require_key(api_key, "anthropic")?;
        let timeout_secs = timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let base_url = base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: normalize_base_url(base_url)?,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout_secs,
            client: http_client(timeout_secs)?,
        })
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl TextGenerator for AnthropicGenerator {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: 0.2,
            system: SYSTEM_PROMPT,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;
        let response = check_status(response).await?;

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(format!("messages response: {e}")))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind.is_empty() || block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            return Err(ServiceError::InvalidResponse(
                "message had no text content".into(),
            ));
        }
        Ok(text)
    }
}
