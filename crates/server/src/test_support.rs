use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use vitalia_agent::providers::RuleBasedResponder;
use vitalia_agent::{Generation, InferenceProvider, Prompt, ProviderChain, ProviderError};
use vitalia_core::config::{AppConfig, ProviderKind};
use vitalia_db::{connect_with_settings, migrations};

use crate::state::AppState;

pub const TEST_ENCRYPTION_KEY: &str = "test-only-key-0123456789abcdefghijkl";

/// Rule-based answers, with a call counter for consent-gate assertions.
#[derive(Default)]
pub struct CountingResponder {
    calls: AtomicUsize,
}

impl CountingResponder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceProvider for CountingResponder {
    fn kind(&self) -> ProviderKind {
        ProviderKind::RuleBased
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        RuleBasedResponder.generate(prompt).await
    }
}

pub async fn test_state() -> AppState {
    test_state_with(Arc::new(CountingResponder::default())).await
}

pub async fn test_state_with(provider: Arc<dyn InferenceProvider>) -> AppState {
    let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
    migrations::run_pending(&pool).await.expect("migrations should apply");

    let mut config = AppConfig::default();
    config.database.url = "sqlite::memory:".to_string();
    config.providers.primary = ProviderKind::RuleBased;
    config.privacy.encryption_key = SecretString::from(TEST_ENCRYPTION_KEY.to_string());

    let chain = Arc::new(ProviderChain::new(vec![provider], Duration::from_secs(2)));
    AppState::assemble(config, pool, chain).expect("state should assemble")
}
