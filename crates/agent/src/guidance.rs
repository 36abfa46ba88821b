//! Stateless advice, meal-plan and progress requests. Nothing here is
//! persisted; each request crosses the same gate and pipeline as an
//! assessment step before reaching the provider chain.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use vitalia_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use vitalia_core::config::ProviderKind;
use vitalia_core::errors::{ApplicationError, DomainError};
use vitalia_core::privacy::{prepare_for_provider, ConsentGate, OperationKind, PrivacyContext};
use vitalia_core::storage::Stores;

use crate::chain::ProviderChain;
use crate::llm::Prompt;
use crate::prompts::PromptBuilder;
use crate::runtime::enforce_audited;

pub const DEFAULT_PLAN_DAYS: u32 = 7;
pub const MAX_PLAN_DAYS: u32 = 14;
pub const DEFAULT_MEALS_PER_DAY: u32 = 3;
pub const MAX_MEALS_PER_DAY: u32 = 6;
const MAX_QUESTION_CHARS: usize = 2000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdviceRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealPlanRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meals_per_day: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calorie_target: Option<u32>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub dietary_preferences: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub entries: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuidanceResponse {
    pub content: String,
    pub model: String,
    pub provider: ProviderKind,
    pub degraded: bool,
    pub generated_at: DateTime<Utc>,
}

pub struct GuidanceService {
    stores: Stores,
    chain: Arc<ProviderChain>,
    prompts: Arc<PromptBuilder>,
    audit: Arc<dyn AuditSink>,
    gate: ConsentGate,
}

impl GuidanceService {
    pub fn new(
        stores: Stores,
        chain: Arc<ProviderChain>,
        prompts: Arc<PromptBuilder>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { stores, chain, prompts, audit, gate: ConsentGate }
    }

    pub async fn advice(
        &self,
        request: AdviceRequest,
        privacy: &PrivacyContext,
    ) -> Result<GuidanceResponse, ApplicationError> {
        self.enforce(OperationKind::Advice, privacy).await?;
        let question = request.question.trim();
        if question.is_empty() {
            return Err(DomainError::validation("question", "is required").into());
        }
        if question.chars().count() > MAX_QUESTION_CHARS {
            return Err(DomainError::validation(
                "question",
                format!("must be at most {MAX_QUESTION_CHARS} characters"),
            )
            .into());
        }

        let payload = self.prepare(&request, OperationKind::Advice, privacy)?;
        let prompt = self.prompts.advice(&payload, privacy)?;
        self.generate(prompt, OperationKind::Advice, privacy).await
    }

    pub async fn meal_plan(
        &self,
        mut request: MealPlanRequest,
        privacy: &PrivacyContext,
    ) -> Result<GuidanceResponse, ApplicationError> {
        self.enforce(OperationKind::MealPlan, privacy).await?;
        let days = request.days.unwrap_or(DEFAULT_PLAN_DAYS);
        if !(1..=MAX_PLAN_DAYS).contains(&days) {
            return Err(
                DomainError::validation("days", format!("must be between 1 and {MAX_PLAN_DAYS}"))
                    .into(),
            );
        }
        let meals_per_day = request.meals_per_day.unwrap_or(DEFAULT_MEALS_PER_DAY);
        if !(1..=MAX_MEALS_PER_DAY).contains(&meals_per_day) {
            return Err(DomainError::validation(
                "mealsPerDay",
                format!("must be between 1 and {MAX_MEALS_PER_DAY}"),
            )
            .into());
        }
        request.days = Some(days);
        request.meals_per_day = Some(meals_per_day);

        let payload = self.prepare(&request, OperationKind::MealPlan, privacy)?;
        let prompt = self.prompts.meal_plan(days, meals_per_day, &payload, privacy)?;
        self.generate(prompt, OperationKind::MealPlan, privacy).await
    }

    pub async fn track_progress(
        &self,
        request: ProgressRequest,
        privacy: &PrivacyContext,
    ) -> Result<GuidanceResponse, ApplicationError> {
        self.enforce(OperationKind::ProgressTracking, privacy).await?;
        if request.entries.is_empty() {
            return Err(DomainError::validation("entries", "at least one entry is required").into());
        }

        let payload = self.prepare(&request, OperationKind::ProgressTracking, privacy)?;
        let prompt = self.prompts.progress(&payload, privacy)?;
        self.generate(prompt, OperationKind::ProgressTracking, privacy).await
    }

    async fn enforce(
        &self,
        operation: OperationKind,
        privacy: &PrivacyContext,
    ) -> Result<(), ApplicationError> {
        enforce_audited(&self.gate, operation, privacy, &self.stores, self.audit.as_ref()).await
    }

    fn prepare<T: Serialize>(
        &self,
        request: &T,
        operation: OperationKind,
        privacy: &PrivacyContext,
    ) -> Result<Value, ApplicationError> {
        let payload = serde_json::to_value(request)
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
        Ok(prepare_for_provider(&payload, operation, privacy)?)
    }

    async fn generate(
        &self,
        prompt: Prompt,
        operation: OperationKind,
        privacy: &PrivacyContext,
    ) -> Result<GuidanceResponse, ApplicationError> {
        let audit = AuditContext::for_owner(&privacy.owner_id, privacy.correlation_id.clone());
        let outcome = match self.chain.generate(&prompt, &privacy.correlation_id).await {
            Ok(outcome) => outcome,
            Err(error) => {
                self.audit.emit(
                    audit
                        .event("guidance.failed", AuditCategory::Provider, AuditOutcome::Failed)
                        .with_metadata("operation", operation.as_str())
                        .with_metadata("error", error.to_string()),
                );
                return Err(error.into());
            }
        };

        self.audit.emit(
            audit
                .event("guidance.generated", AuditCategory::Provider, AuditOutcome::Success)
                .with_metadata("operation", operation.as_str())
                .with_metadata("model", outcome.generation.model.clone())
                .with_metadata("degraded", outcome.degraded.to_string()),
        );
        Ok(GuidanceResponse {
            content: outcome.generation.text,
            model: outcome.generation.model,
            provider: outcome.generation.provider,
            degraded: outcome.degraded,
            generated_at: Utc::now(),
        })
    }
}
