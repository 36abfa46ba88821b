pub mod local;
pub mod remote;
pub mod rule_based;

use std::sync::Arc;

use reqwest::Client;

use vitalia_core::config::{ProviderKind, ProvidersConfig};

use crate::llm::{InferenceProvider, ProviderError};

pub use local::LocalProvider;
pub use remote::RemoteProvider;
pub use rule_based::RuleBasedResponder;

pub fn build_provider(
    kind: ProviderKind,
    config: &ProvidersConfig,
    client: Client,
) -> Result<Arc<dyn InferenceProvider>, ProviderError> {
    let provider: Arc<dyn InferenceProvider> = match kind {
        ProviderKind::Remote => {
            Arc::new(RemoteProvider::new(client, &config.remote, config.sampling.clone())?)
        }
        ProviderKind::Local => {
            Arc::new(LocalProvider::new(client, &config.local, config.sampling.clone()))
        }
        ProviderKind::RuleBased => Arc::new(RuleBasedResponder),
    };
    Ok(provider)
}
