//! Inference side of Vitalia.
//!
//! - `providers`: remote (OpenAI-compatible), local (Ollama) and the
//!   deterministic rule-based responder, all behind [`llm::InferenceProvider`].
//! - `chain`: ordered tiers with a per-call timeout; the rule-based tier
//!   guarantees an answer.
//! - `prompts`: system and task templates carrying the compliance posture.
//! - `runtime`: the assessment lifecycle.
//! - `guidance`: advice, meal plans and progress reviews.
//!
//! Providers only ever see minimized, anonymized payloads.

pub mod chain;
pub mod guidance;
pub mod llm;
pub mod prompts;
pub mod providers;
pub mod runtime;

pub use chain::{ChainOutcome, ProviderChain};
pub use guidance::{AdviceRequest, GuidanceResponse, GuidanceService, MealPlanRequest, ProgressRequest};
pub use llm::{Generation, InferenceProvider, Prompt, PromptTask, ProviderError};
pub use prompts::PromptBuilder;
pub use runtime::{
    AnswerOutcome, AnswerSubmission, AssessmentRuntime, AssessmentView, QuestionView,
    StartedAssessment,
};
