use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use vitalia_core::config::{ProviderKind, RemoteProviderConfig, SamplingConfig};

use crate::llm::{Generation, InferenceProvider, Prompt, ProviderError};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Hosted OpenAI-compatible chat completions endpoint.
pub struct RemoteProvider {
    client: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    sampling: SamplingConfig,
}

impl RemoteProvider {
    pub fn new(
        client: Client,
        config: &RemoteProviderConfig,
        sampling: SamplingConfig,
    ) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured("remote api_key is missing".to_owned()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key,
            model: config.model.clone(),
            sampling,
        })
    }
}

#[async_trait]
impl InferenceProvider for RemoteProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Remote
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &prompt.system },
                ChatMessage { role: "user", content: &prompt.user },
            ],
            max_tokens: self.sampling.max_tokens,
            temperature: self.sampling.temperature,
            top_p: self.sampling.top_p,
            stream: false,
        };

        debug!(
            event_name = "provider.remote.request",
            model = %self.model,
            task = prompt.task.as_str(),
            "sending chat completion"
        );
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http { status: status.as_u16(), body });
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .map(|content| content.trim().to_owned())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("no completion choices".to_owned()))?;

        Ok(Generation {
            text,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            provider: ProviderKind::Remote,
        })
    }
}
