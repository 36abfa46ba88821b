use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vitalia_core::config::{LocalProviderConfig, ProviderKind, SamplingConfig};

use crate::llm::{Generation, InferenceProvider, Prompt, ProviderError};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f64,
    num_predict: u32,
    top_p: f64,
    top_k: u32,
    repeat_penalty: f64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    eval_duration: Option<u64>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// On-device Ollama server.
pub struct LocalProvider {
    client: Client,
    base_url: String,
    model: String,
    sampling: SamplingConfig,
}

impl LocalProvider {
    pub fn new(client: Client, config: &LocalProviderConfig, sampling: SamplingConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            sampling,
        }
    }

    /// Names of the models the server has pulled.
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let response = self.client.get(format!("{}/api/tags", self.base_url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http { status: status.as_u16(), body });
        }
        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|model| model.name).collect())
    }
}

#[async_trait]
impl InferenceProvider for LocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation, ProviderError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: format!("{}\n\n{}", prompt.system, prompt.user),
            stream: false,
            options: GenerateOptions {
                temperature: self.sampling.temperature,
                num_predict: self.sampling.max_tokens,
                top_p: self.sampling.top_p,
                top_k: self.sampling.top_k,
                repeat_penalty: self.sampling.repeat_penalty,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http { status: status.as_u16(), body });
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = parsed.response.trim().to_owned();
        if text.is_empty() {
            return Err(ProviderError::InvalidResponse("empty response".to_owned()));
        }
        debug!(
            event_name = "provider.local.generated",
            model = %self.model,
            task = prompt.task.as_str(),
            eval_duration_ns = parsed.eval_duration.unwrap_or_default(),
            "local generation finished"
        );

        Ok(Generation { text, model: self.model.clone(), provider: ProviderKind::Local })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.list_models().await.map(|_| ())
    }
}
