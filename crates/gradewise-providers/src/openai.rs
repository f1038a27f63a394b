//! OpenAI chat-completions text generator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use gradewise_core::error::ServiceError;
use gradewise_core::traits::TextGenerator;

use crate::error::{check_status, http_client, normalize_base_url, require_key, transport_error};
use crate::SYSTEM_PROMPT;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_TOKENS: u32 = 1024;

/// OpenAI-compatible chat-completions client.
pub struct OpenAiGenerator {
    api_key: String,
    base_url: String,
    model: String,
    org_id: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(
        api_key: &str,
        model: Option<String>,
        base_url: Option<String>,
        org_id: Option<String>,
        timeout_secs: Option<u64>,
    ) -> anyhow::Result<Self> {
        require_key(api_key, "openai")?;
        let timeout_secs = timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let base_url = base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: normalize_base_url(base_url)?,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            org_id,
            timeout_secs,
            client: http_client(timeout_secs)?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let body = ChatRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: 0.2,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        if let Some(org) = &self.org_id {
            request = request.header("OpenAI-Organization", org);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;
        let response = check_status(response).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(format!("chat completion: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ServiceError::InvalidResponse("completion had no content".into()))
    }
}
