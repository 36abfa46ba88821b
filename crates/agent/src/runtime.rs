//! Async orchestration of the assessment lifecycle.
//!
//! Every step that sends data to a provider runs the consent gate first, then
//! minimization and anonymization. Answers are written before the provider is
//! asked for the next step, so a failed or cancelled provider call leaves a
//! resumable `in_progress` assessment with no pending question.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use vitalia_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use vitalia_core::config::AssessmentConfig;
use vitalia_core::domain::assessment::{
    Assessment, AssessmentId, AssessmentStatus, HealthProfile, OwnerId, PendingQuestion,
    StoredAnswer,
};
use vitalia_core::errors::{ApplicationError, DomainError};
use vitalia_core::flows::{AssessmentFlow, AssessmentLocks, FlowContext, FlowEngine, FlowEvent};
use vitalia_core::privacy::crypto::{decrypt_json, encrypt_json, DataCipher};
use vitalia_core::privacy::{
    prepare_for_provider, prepare_text_for_provider, ConsentGate, OperationKind, PrivacyContext,
};
use vitalia_core::rights::AnswerRecord;
use vitalia_core::storage::Stores;

use crate::chain::ProviderChain;
use crate::prompts::{HistoryItem, PromptBuilder};

const DEFAULT_CONFIDENCE: f64 = 1.0;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub question_id: String,
    pub text: String,
}

impl From<&PendingQuestion> for QuestionView {
    fn from(value: &PendingQuestion) -> Self {
        Self { question_id: value.question_id.clone(), text: value.text.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedAssessment {
    pub id: AssessmentId,
    pub status: AssessmentStatus,
    pub first_question: Option<QuestionView>,
    pub progress: u8,
    pub total_questions: u32,
    pub estimated_completion_minutes: u32,
    pub retry_required: bool,
    pub degraded: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    pub question_id: String,
    pub answer: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    pub id: AssessmentId,
    pub status: AssessmentStatus,
    pub next_question: Option<QuestionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<String>,
    pub progress: u8,
    pub retry_required: bool,
    pub degraded: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentView {
    pub id: AssessmentId,
    pub status: AssessmentStatus,
    pub progress: u8,
    pub total_questions: u32,
    pub answers: Vec<AnswerRecord>,
    pub pending_question: Option<QuestionView>,
    pub recommendations: Option<String>,
    pub anonymized_data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_health_data: Option<HealthProfile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub struct AssessmentRuntime {
    stores: Stores,
    chain: Arc<ProviderChain>,
    prompts: Arc<PromptBuilder>,
    cipher: Arc<dyn DataCipher>,
    audit: Arc<dyn AuditSink>,
    locks: AssessmentLocks,
    config: AssessmentConfig,
    flow: FlowEngine<AssessmentFlow>,
    gate: ConsentGate,
}

impl AssessmentRuntime {
    pub fn new(
        stores: Stores,
        chain: Arc<ProviderChain>,
        prompts: Arc<PromptBuilder>,
        cipher: Arc<dyn DataCipher>,
        audit: Arc<dyn AuditSink>,
        locks: AssessmentLocks,
        config: AssessmentConfig,
    ) -> Self {
        Self {
            stores,
            chain,
            prompts,
            cipher,
            audit,
            locks,
            config,
            flow: FlowEngine::default(),
            gate: ConsentGate,
        }
    }

    pub async fn start(
        &self,
        health: HealthProfile,
        privacy: &PrivacyContext,
    ) -> Result<StartedAssessment, ApplicationError> {
        self.enforce_gate(privacy).await?;
        health.validate()?;

        let total_questions = self.config.total_questions;
        let profile = serde_json::to_value(&health)
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
        let anonymized = prepare_for_provider(&profile, OperationKind::HealthAssessment, privacy)?;

        let id = AssessmentId::generate();
        let audit = self.audit_context(privacy, &id);
        let prompt = self.prompts.question(1, total_questions, &anonymized, &[], privacy)?;
        let (pending, degraded) = match self.chain.generate(&prompt, &privacy.correlation_id).await
        {
            Ok(outcome) => (
                Some(PendingQuestion { question_id: "q1".to_owned(), text: outcome.generation.text }),
                outcome.degraded,
            ),
            Err(error) => {
                self.step_deferred(&audit, "first_question", &error.to_string());
                (None, false)
            }
        };

        let now = Utc::now();
        let cipher = self.cipher.as_ref();
        let assessment = Assessment {
            id: id.clone(),
            owner_id: privacy.owner_id.clone(),
            status: self.flow.initial_state(),
            raw_health_data: encrypt_json(cipher, &health)?,
            anonymized_health_data: encrypt_json(cipher, &anonymized)?,
            answers: Vec::new(),
            total_questions,
            pending_question: pending,
            recommendations: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.stores.assessments.save(&assessment).await?;

        self.audit.emit(
            audit
                .event("assessment.started", AuditCategory::Assessment, AuditOutcome::Success)
                .with_metadata("total_questions", total_questions.to_string())
                .with_metadata("anonymization", privacy.effective_level().as_str()),
        );
        info!(
            event_name = "assessment.started",
            correlation_id = %privacy.correlation_id,
            assessment_id = %id,
            total_questions,
            "assessment started"
        );

        Ok(StartedAssessment {
            id,
            status: assessment.status,
            first_question: assessment.pending_question.as_ref().map(QuestionView::from),
            progress: 0,
            total_questions,
            estimated_completion_minutes: total_questions
                .saturating_mul(self.config.minutes_per_question),
            retry_required: assessment.pending_question.is_none(),
            degraded,
        })
    }

    pub async fn submit_answer(
        &self,
        id: &AssessmentId,
        privacy: &PrivacyContext,
        submission: AnswerSubmission,
    ) -> Result<AnswerOutcome, ApplicationError> {
        self.enforce_gate(privacy).await?;

        let question_id = submission.question_id.trim().to_owned();
        if question_id.is_empty() {
            return Err(DomainError::validation("questionId", "is required").into());
        }
        let answer = submission.answer.trim().to_owned();
        if answer.is_empty() {
            return Err(DomainError::validation("answer", "is required").into());
        }
        let confidence = submission.confidence.unwrap_or(DEFAULT_CONFIDENCE);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(DomainError::validation("confidence", "must be between 0 and 1").into());
        }

        let _guard = self.locks.acquire(id).await;
        let mut assessment = self.load_in_progress(id, &privacy.owner_id).await?;
        if assessment.is_answered(&question_id) {
            return Err(DomainError::DuplicateAnswer { question_id }.into());
        }
        let pending_id = assessment.pending_question.as_ref().map(|p| p.question_id.clone());
        if pending_id.as_deref() != Some(question_id.as_str()) {
            return Err(DomainError::UnexpectedQuestion { question_id, pending: pending_id }.into());
        }

        let audit = self.audit_context(privacy, id);
        let answered = assessment.answers.len() + 1;
        let flow_context = FlowContext::new(answered, assessment.total_questions);
        if answered == assessment.total_questions as usize {
            // Audited once the recommendations are persisted.
            self.flow
                .apply(&assessment.status, &FlowEvent::FinalAnswerRecorded, &flow_context)
                .map_err(DomainError::from)?;
        } else {
            self.flow
                .apply_with_audit(
                    &assessment.status,
                    &FlowEvent::AnswerRecorded,
                    &flow_context,
                    self.audit.as_ref(),
                    &audit,
                )
                .map_err(DomainError::from)?;
        }

        let question_text = assessment
            .pending_question
            .take()
            .map_or_else(|| question_id.clone(), |pending| pending.text);
        let now = Utc::now();
        assessment.answers.push(StoredAnswer {
            question_id: question_id.clone(),
            question_text,
            answer: self.cipher.encrypt(&answer)?,
            confidence,
            answered_at: now,
        });
        assessment.updated_at = now;
        self.persist(&assessment).await?;

        self.audit.emit(
            audit
                .event("assessment.answer_recorded", AuditCategory::Assessment, AuditOutcome::Success)
                .with_metadata("question_id", question_id)
                .with_metadata("progress", assessment.progress_percent().to_string()),
        );

        self.advance(&mut assessment, privacy, &audit).await
    }

    /// Retries the provider step of an assessment that has no pending question.
    pub async fn next_question(
        &self,
        id: &AssessmentId,
        privacy: &PrivacyContext,
    ) -> Result<AnswerOutcome, ApplicationError> {
        self.enforce_gate(privacy).await?;

        let _guard = self.locks.acquire(id).await;
        let mut assessment = self.load_in_progress(id, &privacy.owner_id).await?;
        if let Some(pending) = &assessment.pending_question {
            return Ok(AnswerOutcome {
                id: assessment.id.clone(),
                status: assessment.status,
                next_question: Some(QuestionView::from(pending)),
                recommendations: None,
                progress: assessment.progress_percent(),
                retry_required: false,
                degraded: false,
            });
        }

        let audit = self.audit_context(privacy, id);
        self.advance(&mut assessment, privacy, &audit).await
    }

    pub async fn get(
        &self,
        id: &AssessmentId,
        privacy: &PrivacyContext,
    ) -> Result<AssessmentView, ApplicationError> {
        let assessment = self
            .stores
            .assessments
            .find_by_id_and_owner(id, &privacy.owner_id)
            .await?
            .ok_or_else(|| DomainError::not_found("assessment"))?;

        let cipher = self.cipher.as_ref();
        let answers = assessment
            .answers
            .iter()
            .map(|answer| -> Result<AnswerRecord, ApplicationError> {
                Ok(AnswerRecord {
                    question_id: answer.question_id.clone(),
                    question: answer.question_text.clone(),
                    answer: cipher.decrypt(&answer.answer)?,
                    confidence: answer.confidence,
                    answered_at: answer.answered_at,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let recommendations =
            assessment.recommendations.as_ref().map(|blob| cipher.decrypt(blob)).transpose()?;
        let anonymized_data: Value = decrypt_json(cipher, &assessment.anonymized_health_data)?;
        let raw_health_data = if privacy.authorize_raw_data {
            Some(decrypt_json(cipher, &assessment.raw_health_data)?)
        } else {
            None
        };

        Ok(AssessmentView {
            id: assessment.id.clone(),
            status: assessment.status,
            progress: assessment.progress_percent(),
            total_questions: assessment.total_questions,
            answers,
            pending_question: assessment.pending_question.as_ref().map(QuestionView::from),
            recommendations,
            anonymized_data,
            raw_health_data,
            created_at: assessment.created_at,
            updated_at: assessment.updated_at,
            completed_at: assessment.completed_at,
        })
    }

    /// Irreversible hard delete. A repeat delete is `NotFound`.
    pub async fn delete(
        &self,
        id: &AssessmentId,
        owner_id: &OwnerId,
        correlation_id: &str,
    ) -> Result<(), ApplicationError> {
        let guard = self.locks.acquire(id).await;
        let assessment = self
            .stores
            .assessments
            .find_by_id_and_owner(id, owner_id)
            .await?
            .ok_or_else(|| DomainError::not_found("assessment"))?;

        let audit = AuditContext::for_owner(owner_id, correlation_id).with_assessment(id);
        self.flow
            .apply_with_audit(
                &assessment.status,
                &FlowEvent::DeletionRequested,
                &FlowContext::new(assessment.answers.len(), assessment.total_questions),
                self.audit.as_ref(),
                &audit,
            )
            .map_err(DomainError::from)?;

        if !self.stores.assessments.delete_by_id_and_owner(id, owner_id).await? {
            return Err(DomainError::not_found("assessment").into());
        }
        drop(guard);
        self.locks.forget(id).await;

        self.audit.emit(audit.event(
            "assessment.deleted",
            AuditCategory::Assessment,
            AuditOutcome::Success,
        ));
        Ok(())
    }

    /// Requests the next question, or the recommendations once every answer is
    /// in. Provider failure is not an error: the caller gets `retryRequired`.
    async fn advance(
        &self,
        assessment: &mut Assessment,
        privacy: &PrivacyContext,
        audit: &AuditContext,
    ) -> Result<AnswerOutcome, ApplicationError> {
        let profile: Value = decrypt_json(self.cipher.as_ref(), &assessment.anonymized_health_data)?;
        let history = self.history(assessment, privacy)?;

        if assessment.all_answered() {
            let prompt = self.prompts.recommendations(&profile, &history, privacy)?;
            let outcome = match self.chain.generate(&prompt, &privacy.correlation_id).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    self.step_deferred(audit, "recommendations", &error.to_string());
                    return Ok(retry_outcome(assessment));
                }
            };

            let transition = self
                .flow
                .apply_with_audit(
                    &assessment.status,
                    &FlowEvent::FinalAnswerRecorded,
                    &FlowContext::new(assessment.answers.len(), assessment.total_questions),
                    self.audit.as_ref(),
                    audit,
                )
                .map_err(DomainError::from)?;
            let now = Utc::now();
            assessment.status = transition.to;
            assessment.recommendations = Some(self.cipher.encrypt(&outcome.generation.text)?);
            assessment.completed_at = Some(now);
            assessment.updated_at = now;
            self.persist(assessment).await?;

            self.audit.emit(
                audit
                    .event("assessment.completed", AuditCategory::Assessment, AuditOutcome::Success)
                    .with_metadata("model", outcome.generation.model.clone())
                    .with_metadata("degraded", outcome.degraded.to_string()),
            );
            return Ok(AnswerOutcome {
                id: assessment.id.clone(),
                status: assessment.status,
                next_question: None,
                recommendations: Some(outcome.generation.text),
                progress: assessment.progress_percent(),
                retry_required: false,
                degraded: outcome.degraded,
            });
        }

        let number = assessment.answers.len() + 1;
        let prompt =
            self.prompts.question(number, assessment.total_questions, &profile, &history, privacy)?;
        let outcome = match self.chain.generate(&prompt, &privacy.correlation_id).await {
            Ok(outcome) => outcome,
            Err(error) => {
                self.step_deferred(audit, "next_question", &error.to_string());
                return Ok(retry_outcome(assessment));
            }
        };

        let pending = PendingQuestion {
            question_id: assessment.next_question_id(),
            text: outcome.generation.text,
        };
        let next_question = QuestionView::from(&pending);
        assessment.pending_question = Some(pending);
        assessment.updated_at = Utc::now();
        self.persist(assessment).await?;

        Ok(AnswerOutcome {
            id: assessment.id.clone(),
            status: assessment.status,
            next_question: Some(next_question),
            recommendations: None,
            progress: assessment.progress_percent(),
            retry_required: false,
            degraded: outcome.degraded,
        })
    }

    /// Decrypted answers, anonymized at the request's level before they are
    /// shown to a provider.
    fn history(
        &self,
        assessment: &Assessment,
        privacy: &PrivacyContext,
    ) -> Result<Vec<HistoryItem>, ApplicationError> {
        assessment
            .answers
            .iter()
            .map(|answer| -> Result<HistoryItem, ApplicationError> {
                let plain = self.cipher.decrypt(&answer.answer)?;
                Ok(HistoryItem {
                    question: answer.question_text.clone(),
                    answer: prepare_text_for_provider(
                        &plain,
                        OperationKind::HealthAssessment,
                        privacy,
                    )?,
                })
            })
            .collect()
    }

    /// Writes back an existing assessment. A record erased meanwhile stays gone.
    async fn persist(&self, assessment: &Assessment) -> Result<(), ApplicationError> {
        if self.stores.assessments.update(assessment).await? {
            Ok(())
        } else {
            Err(DomainError::not_found("assessment").into())
        }
    }

    async fn enforce_gate(&self, privacy: &PrivacyContext) -> Result<(), ApplicationError> {
        enforce_audited(
            &self.gate,
            OperationKind::HealthAssessment,
            privacy,
            &self.stores,
            self.audit.as_ref(),
        )
        .await
    }

    async fn load_in_progress(
        &self,
        id: &AssessmentId,
        owner_id: &OwnerId,
    ) -> Result<Assessment, ApplicationError> {
        self.stores
            .assessments
            .find_by_id_and_owner(id, owner_id)
            .await?
            .filter(|assessment| assessment.status == AssessmentStatus::InProgress)
            .ok_or_else(|| DomainError::not_found("assessment").into())
    }

    fn audit_context(&self, privacy: &PrivacyContext, id: &AssessmentId) -> AuditContext {
        AuditContext::for_owner(&privacy.owner_id, privacy.correlation_id.clone())
            .with_assessment(id)
    }

    fn step_deferred(&self, audit: &AuditContext, step: &str, error: &str) {
        warn!(
            event_name = "assessment.step_deferred",
            correlation_id = %audit.correlation_id,
            step,
            error,
            "provider step failed; assessment left resumable"
        );
        self.audit.emit(
            audit
                .event("assessment.step_deferred", AuditCategory::Provider, AuditOutcome::Failed)
                .with_metadata("step", step)
                .with_metadata("error", error),
        );
    }
}

/// Runs the consent gate and records a denial in the audit trail.
pub(crate) async fn enforce_audited(
    gate: &ConsentGate,
    operation: OperationKind,
    privacy: &PrivacyContext,
    stores: &Stores,
    audit: &dyn AuditSink,
) -> Result<(), ApplicationError> {
    let result =
        gate.enforce(operation, privacy, stores.consents.as_ref(), stores.rights.as_ref()).await;
    if let Err(error) = &result {
        audit.emit(
            AuditContext::for_owner(&privacy.owner_id, privacy.correlation_id.clone())
                .event("privacy.consent_denied", AuditCategory::Consent, AuditOutcome::Rejected)
                .with_metadata("operation", operation.as_str())
                .with_metadata("error", error.to_string()),
        );
    }
    result
}

fn retry_outcome(assessment: &Assessment) -> AnswerOutcome {
    AnswerOutcome {
        id: assessment.id.clone(),
        status: assessment.status,
        next_question: None,
        recommendations: None,
        progress: assessment.progress_percent(),
        retry_required: true,
        degraded: false,
    }
}
