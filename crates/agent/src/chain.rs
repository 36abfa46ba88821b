use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{info, warn};

use vitalia_core::config::{ProviderKind, ProvidersConfig};

use crate::llm::{Generation, InferenceProvider, Prompt, ProviderError};
use crate::providers::{build_provider, RuleBasedResponder};

/// A generation plus whether a fallback tier had to answer it.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainOutcome {
    pub generation: Generation,
    pub degraded: bool,
}

/// Ordered provider tiers tried by one retry-and-degrade loop.
pub struct ProviderChain {
    tiers: Vec<Arc<dyn InferenceProvider>>,
    timeout: Duration,
}

impl ProviderChain {
    pub fn new(tiers: Vec<Arc<dyn InferenceProvider>>, timeout: Duration) -> Self {
        Self { tiers, timeout }
    }

    /// `[primary, secondary?, rule-based]`. A tier that cannot be built (a
    /// remote tier without an API key) is skipped with a warning.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| ProviderError::NotConfigured(error.to_string()))?;

        let mut kinds = vec![config.primary];
        kinds.extend(config.secondary);
        kinds.push(ProviderKind::RuleBased);
        kinds.dedup();

        let mut tiers: Vec<Arc<dyn InferenceProvider>> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if tiers.iter().any(|tier| tier.kind() == kind) {
                continue;
            }
            match build_provider(kind, config, client.clone()) {
                Ok(provider) => tiers.push(provider),
                Err(error) => warn!(
                    event_name = "provider.tier_skipped",
                    provider = ?kind,
                    error = %error,
                    "provider tier could not be configured"
                ),
            }
        }
        if tiers.is_empty() {
            tiers.push(Arc::new(RuleBasedResponder));
        }

        Ok(Self::new(tiers, Duration::from_secs(config.timeout_secs)))
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.tiers.iter().map(|tier| tier.kind()).collect()
    }

    pub async fn generate(
        &self,
        prompt: &Prompt,
        correlation_id: &str,
    ) -> Result<ChainOutcome, ProviderError> {
        for (index, tier) in self.tiers.iter().enumerate() {
            let kind = tier.kind();
            let attempt = tokio::time::timeout(self.timeout, tier.generate(prompt)).await;
            let error = match attempt {
                Ok(Ok(generation)) => {
                    info!(
                        event_name = "provider.generation_succeeded",
                        correlation_id = %correlation_id,
                        provider = ?kind,
                        model = %generation.model,
                        task = prompt.task.as_str(),
                        tier = index,
                        "provider answered"
                    );
                    return Ok(ChainOutcome { generation, degraded: index > 0 });
                }
                Ok(Err(error)) => error,
                Err(_) => ProviderError::Timeout { secs: self.timeout.as_secs() },
            };
            warn!(
                event_name = "provider.generation_failed",
                correlation_id = %correlation_id,
                provider = ?kind,
                task = prompt.task.as_str(),
                tier = index,
                error = %error,
                "provider tier failed, degrading"
            );
        }

        Err(ProviderError::Exhausted { attempts: self.tiers.len() })
    }

    /// Checks the local tier, when one is configured.
    pub async fn local_health(&self) -> Option<Result<(), ProviderError>> {
        let local = self.tiers.iter().find(|tier| tier.kind() == ProviderKind::Local)?;
        Some(match tokio::time::timeout(self.timeout, local.health_check()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout { secs: self.timeout.as_secs() }),
        })
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use serde_json::json;

    use vitalia_core::config::{AppConfig, ProviderKind};

    use super::test_support::{tiers, CountingProvider, FailingProvider, SlowProvider};
    use super::ProviderChain;
    use crate::llm::{Prompt, PromptTask, ProviderError};
    use crate::providers::RuleBasedResponder;

    fn advice_prompt() -> Prompt {
        Prompt {
            task: PromptTask::Advice,
            system: "system".to_owned(),
            user: "How do I lose weight?".to_owned(),
            context: json!({ "question": "How do I lose weight?" }),
        }
    }

    #[tokio::test]
    async fn first_healthy_tier_answers_without_degradation() {
        let counting = Arc::new(CountingProvider::default());
        let chain = tiers(vec![counting.clone(), Arc::new(RuleBasedResponder)]);

        let outcome = chain.generate(&advice_prompt(), "req-1").await.expect("generation");
        assert!(!outcome.degraded);
        assert_eq!(outcome.generation.model, "counting");
        assert_eq!(counting.calls(), 1);
    }

    #[tokio::test]
    async fn failing_tiers_degrade_to_rule_based() {
        let remote = Arc::new(FailingProvider::new(ProviderKind::Remote));
        let local = Arc::new(FailingProvider::new(ProviderKind::Local));
        let chain = tiers(vec![remote.clone(), local.clone(), Arc::new(RuleBasedResponder)]);

        let outcome = chain.generate(&advice_prompt(), "req-1").await.expect("generation");
        assert!(outcome.degraded);
        assert_eq!(outcome.generation.provider, ProviderKind::RuleBased);
        assert_eq!(outcome.generation.model, "weight_loss");
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        assert_eq!(local.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_counts_as_failure() {
        let chain = tiers(vec![Arc::new(SlowProvider), Arc::new(RuleBasedResponder)]);
        let outcome = chain.generate(&advice_prompt(), "req-1").await.expect("generation");
        assert!(outcome.degraded);
        assert_eq!(outcome.generation.provider, ProviderKind::RuleBased);
    }

    #[tokio::test]
    async fn exhausted_chain_reports_attempts() {
        let chain = tiers(vec![
            Arc::new(FailingProvider::new(ProviderKind::Remote)),
            Arc::new(FailingProvider::new(ProviderKind::Local)),
        ]);
        let result = chain.generate(&advice_prompt(), "req-1").await;
        assert_eq!(result, Err(ProviderError::Exhausted { attempts: 2 }));
    }

    #[test]
    fn config_without_remote_key_skips_remote_tier() {
        let mut config = AppConfig::default().providers;
        config.primary = ProviderKind::Remote;
        config.secondary = Some(ProviderKind::Local);
        config.remote.api_key = None;

        let chain = ProviderChain::from_config(&config).expect("chain");
        assert_eq!(chain.kinds(), vec![ProviderKind::Local, ProviderKind::RuleBased]);
    }

    #[test]
    fn rule_based_is_never_duplicated() {
        let mut config = AppConfig::default().providers;
        config.primary = ProviderKind::RuleBased;
        config.secondary = None;

        let chain = ProviderChain::from_config(&config).expect("chain");
        assert_eq!(chain.kinds(), vec![ProviderKind::RuleBased]);
    }
}
