use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use vitalia_core::config::ProviderKind;
use vitalia_core::errors::ApplicationError;

/// What a provider is being asked to produce. Network providers only read the
/// rendered text; the rule-based responder works from the task and context.
#[derive(Clone, Debug, PartialEq)]
pub enum PromptTask {
    AssessmentQuestion { number: usize, total: u32 },
    Recommendations,
    Advice,
    MealPlan { days: u32, meals_per_day: u32 },
    ProgressReview,
}

impl PromptTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssessmentQuestion { .. } => "assessment_question",
            Self::Recommendations => "recommendations",
            Self::Advice => "advice",
            Self::MealPlan { .. } => "meal_plan",
            Self::ProgressReview => "progress_review",
        }
    }
}

/// A rendered request. `context` holds the minimized, anonymized payload the
/// text was rendered from.
#[derive(Clone, Debug, PartialEq)]
pub struct Prompt {
    pub task: PromptTask,
    pub system: String,
    pub user: String,
    pub context: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub provider: ProviderKind,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ProviderError {
    #[error("provider not configured: {0}")]
    NotConfigured(String),
    #[error("provider unreachable: {0}")]
    Unavailable(String),
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("provider timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("every provider tier failed ({attempts} attempts)")]
    Exhausted { attempts: usize },
}

impl From<ProviderError> for ApplicationError {
    fn from(value: ProviderError) -> Self {
        Self::Provider(value.to_string())
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::InvalidResponse(value.to_string())
        } else {
            Self::Unavailable(value.to_string())
        }
    }
}

#[async_trait]
pub trait InferenceProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn generate(&self, prompt: &Prompt) -> Result<Generation, ProviderError>;

    /// Reachability check. Providers without a remote side are always healthy.
    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
