//! Owner-scoped data-subject rights: access, portability, rectification,
//! restriction, erasure and objection, plus consent management.

pub mod export;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::domain::assessment::{Assessment, AssessmentStatus, HealthProfile, OwnerId};
use crate::domain::consent::{Consent, ConsentId, ConsentType};
use crate::domain::rights::{
    DataCategory, DataRestriction, ProcessingObjection, RectifiableField, RectificationRecord,
    RestrictionStatus, SubjectProfile,
};
use crate::errors::{ApplicationError, DomainError};
use crate::flows::{AssessmentFlow, AssessmentLocks, FlowContext, FlowEngine, FlowEvent};
use crate::privacy::crypto::{decrypt_json, DataCipher};
use crate::storage::{
    AssessmentRepository, ConsentRepository, DataRightsRepository, ErasureScope, Stores,
    SubjectEraser,
};

pub use export::{ExportFormat, ExportedData};

pub const DEFAULT_RESTRICTION_DAYS: u32 = 30;
pub const MAX_RESTRICTION_DAYS: u32 = 365;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_id: String,
    pub question: String,
    pub answer: String,
    pub confidence: f64,
    pub answered_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRecord {
    pub id: String,
    pub status: AssessmentStatus,
    pub health_data: HealthProfile,
    pub answers: Vec<AnswerRecord>,
    pub recommendations: Option<String>,
    pub progress: u8,
    pub total_questions: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestrictionRecord {
    #[serde(flatten)]
    pub restriction: DataRestriction,
    pub status: RestrictionStatus,
}

/// Everything held about one subject, decrypted.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDataAggregate {
    pub owner_id: OwnerId,
    pub generated_at: DateTime<Utc>,
    pub profile: Option<SubjectProfile>,
    pub assessments: Vec<AssessmentRecord>,
    pub consents: Vec<Consent>,
    pub restrictions: Vec<RestrictionRecord>,
    pub objections: Vec<ProcessingObjection>,
    pub rectifications: Vec<RectificationRecord>,
}

impl UserDataAggregate {
    fn is_empty(&self) -> bool {
        self.profile.is_none()
            && self.assessments.is_empty()
            && self.consents.is_empty()
            && self.restrictions.is_empty()
            && self.objections.is_empty()
            && self.rectifications.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RectificationOutcome {
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestrictionOutcome {
    pub restriction: RestrictionRecord,
    pub restricted_assessments: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionSummary {
    pub deleted_records: u64,
    pub categories: Vec<DataCategory>,
}

pub struct DataRightsService {
    assessments: Arc<dyn AssessmentRepository>,
    consents: Arc<dyn ConsentRepository>,
    rights: Arc<dyn DataRightsRepository>,
    eraser: Arc<dyn SubjectEraser>,
    cipher: Arc<dyn DataCipher>,
    audit: Arc<dyn AuditSink>,
    locks: AssessmentLocks,
    flow: FlowEngine<AssessmentFlow>,
}

impl DataRightsService {
    pub fn new(
        stores: Stores,
        cipher: Arc<dyn DataCipher>,
        audit: Arc<dyn AuditSink>,
        locks: AssessmentLocks,
    ) -> Self {
        Self {
            assessments: stores.assessments,
            consents: stores.consents,
            rights: stores.rights,
            eraser: stores.eraser,
            cipher,
            audit,
            locks,
            flow: FlowEngine::default(),
        }
    }

    pub async fn get_user_data(
        &self,
        owner_id: &OwnerId,
        correlation_id: &str,
    ) -> Result<UserDataAggregate, ApplicationError> {
        let now = Utc::now();
        let profile = self.rights.find_profile(owner_id).await?;
        let assessments = self
            .assessments
            .list_by_owner(owner_id)
            .await?
            .iter()
            .map(|assessment| self.decrypt_assessment(assessment))
            .collect::<Result<Vec<_>, _>>()?;
        let consents = self.consents.list_by_owner(owner_id).await?;
        let restrictions = self
            .rights
            .list_restrictions(owner_id)
            .await?
            .into_iter()
            .map(|restriction| RestrictionRecord { status: restriction.status(now), restriction })
            .collect();
        let objections = self.rights.list_objections(owner_id).await?;
        let rectifications = self.rights.list_rectifications(owner_id).await?;

        let aggregate = UserDataAggregate {
            owner_id: owner_id.clone(),
            generated_at: now,
            profile,
            assessments,
            consents,
            restrictions,
            objections,
            rectifications,
        };
        if aggregate.is_empty() {
            return Err(DomainError::not_found("user data").into());
        }

        self.emit(owner_id, correlation_id, "rights.data_accessed", AuditOutcome::Success, &[]);
        Ok(aggregate)
    }

    pub async fn export_user_data(
        &self,
        owner_id: &OwnerId,
        format: ExportFormat,
        correlation_id: &str,
    ) -> Result<ExportedData, ApplicationError> {
        let aggregate = self.get_user_data(owner_id, correlation_id).await?;
        let value = serde_json::to_value(&aggregate)
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;
        let exported = export::render(owner_id, &value, format, aggregate.generated_at)?;
        self.emit(
            owner_id,
            correlation_id,
            "rights.data_exported",
            AuditOutcome::Success,
            &[("format", format.extension().to_owned())],
        );
        Ok(exported)
    }

    pub async fn rectify_field(
        &self,
        owner_id: &OwnerId,
        field: &str,
        value: Value,
        correlation_id: &str,
    ) -> Result<RectificationOutcome, ApplicationError> {
        let Some(target) = RectifiableField::parse(field) else {
            self.emit(
                owner_id,
                correlation_id,
                "rights.rectification_rejected",
                AuditOutcome::Rejected,
                &[("field", field.to_owned())],
            );
            return Err(DomainError::validation("field", format!("`{field}` cannot be rectified")).into());
        };

        let now = Utc::now();
        let mut profile = self
            .rights
            .find_profile(owner_id)
            .await?
            .unwrap_or_else(|| SubjectProfile::empty(owner_id.clone()));
        let old_value = profile.set_field(target, &value)?;
        let new_value = profile.field_value(target);
        profile.updated_at = Some(now);
        self.rights.save_profile(&profile).await?;
        self.rights
            .append_rectification(&RectificationRecord {
                id: Uuid::new_v4().to_string(),
                owner_id: owner_id.clone(),
                field: target.name().to_owned(),
                old_value: old_value.clone(),
                new_value: new_value.clone(),
                rectified_at: now,
            })
            .await?;

        self.emit(
            owner_id,
            correlation_id,
            "rights.field_rectified",
            AuditOutcome::Success,
            &[("field", target.name().to_owned())],
        );
        Ok(RectificationOutcome { field: target.name().to_owned(), old_value, new_value })
    }

    pub async fn restrict_processing(
        &self,
        owner_id: &OwnerId,
        reason: &str,
        categories: Vec<DataCategory>,
        duration_days: Option<u32>,
        correlation_id: &str,
    ) -> Result<RestrictionOutcome, ApplicationError> {
        let duration_days = duration_days.unwrap_or(DEFAULT_RESTRICTION_DAYS);
        if !(1..=MAX_RESTRICTION_DAYS).contains(&duration_days) {
            return Err(DomainError::validation(
                "duration",
                format!("must be between 1 and {MAX_RESTRICTION_DAYS} days"),
            )
            .into());
        }
        if reason.trim().is_empty() {
            return Err(DomainError::validation("reason", "is required").into());
        }
        let categories = if categories.is_empty() { vec![DataCategory::All] } else { categories };

        let now = Utc::now();
        let restriction =
            DataRestriction::new(owner_id.clone(), reason.trim(), categories, duration_days, now);
        self.rights.save_restriction(&restriction).await?;

        let mut restricted_assessments = 0;
        if restriction.covers_health_data() {
            restricted_assessments = self.restrict_assessments(owner_id, correlation_id).await?;
        }

        self.emit(
            owner_id,
            correlation_id,
            "rights.processing_restricted",
            AuditOutcome::Success,
            &[
                ("restriction_id", restriction.id.clone()),
                ("duration_days", duration_days.to_string()),
                ("restricted_assessments", restricted_assessments.to_string()),
            ],
        );
        Ok(RestrictionOutcome {
            restriction: RestrictionRecord { status: restriction.status(now), restriction },
            restricted_assessments,
        })
    }

    async fn restrict_assessments(
        &self,
        owner_id: &OwnerId,
        correlation_id: &str,
    ) -> Result<usize, ApplicationError> {
        let mut restricted = 0;
        for listed in self.assessments.list_by_owner(owner_id).await? {
            if !matches!(listed.status, AssessmentStatus::InProgress | AssessmentStatus::Completed) {
                continue;
            }
            let _guard = self.locks.acquire(&listed.id).await;
            // Re-read under the lock; an answer may have landed since listing.
            let Some(mut assessment) =
                self.assessments.find_by_id_and_owner(&listed.id, owner_id).await?
            else {
                continue;
            };
            let audit = AuditContext::for_owner(owner_id, correlation_id).with_assessment(&assessment.id);
            let outcome = self
                .flow
                .apply_with_audit(
                    &assessment.status,
                    &FlowEvent::RestrictionRequested,
                    &FlowContext::new(assessment.answers.len(), assessment.total_questions),
                    self.audit.as_ref(),
                    &audit,
                )
                .map_err(DomainError::from)?;
            assessment.status = outcome.to;
            assessment.pending_question = None;
            assessment.updated_at = Utc::now();
            if self.assessments.update(&assessment).await? {
                restricted += 1;
            }
        }
        Ok(restricted)
    }

    pub async fn delete_user_data(
        &self,
        owner_id: &OwnerId,
        categories: Vec<DataCategory>,
        correlation_id: &str,
    ) -> Result<DeletionSummary, ApplicationError> {
        let categories = if categories.is_empty() { vec![DataCategory::All] } else { categories };
        let scope = ErasureScope::covering(&categories);

        // Hold every listed assessment's lock so an answer already waiting on a
        // provider cannot write its copy back after the erasure.
        let mut guards = Vec::new();
        let mut ids = Vec::new();
        if scope.assessments {
            for assessment in self.assessments.list_by_owner(owner_id).await? {
                guards.push(self.locks.acquire(&assessment.id).await);
                ids.push(assessment.id);
            }
        }
        let counts = self.eraser.erase_subject(owner_id, scope).await?;
        drop(guards);
        for id in &ids {
            self.locks.forget(id).await;
        }

        let deleted = counts.total();
        if deleted == 0 {
            return Err(DomainError::not_found("user data").into());
        }

        self.emit(
            owner_id,
            correlation_id,
            "rights.data_deleted",
            AuditOutcome::Success,
            &[
                ("deleted_records", deleted.to_string()),
                (
                    "categories",
                    categories.iter().map(DataCategory::as_str).collect::<Vec<_>>().join(","),
                ),
            ],
        );
        Ok(DeletionSummary { deleted_records: deleted, categories })
    }

    pub async fn object_to_processing(
        &self,
        owner_id: &OwnerId,
        reason: &str,
        processing_type: &str,
        correlation_id: &str,
    ) -> Result<ProcessingObjection, ApplicationError> {
        if reason.trim().is_empty() {
            return Err(DomainError::validation("reason", "is required").into());
        }
        if processing_type.trim().is_empty() {
            return Err(DomainError::validation("processingType", "is required").into());
        }
        let objection = ProcessingObjection::record(
            owner_id.clone(),
            reason.trim(),
            processing_type.trim(),
            Utc::now(),
        );
        self.rights.save_objection(&objection).await?;
        self.emit(
            owner_id,
            correlation_id,
            "rights.objection_recorded",
            AuditOutcome::Success,
            &[("processing_type", objection.processing_type.clone())],
        );
        Ok(objection)
    }

    pub async fn list_consents(&self, owner_id: &OwnerId) -> Result<Vec<Consent>, ApplicationError> {
        Ok(self.consents.list_by_owner(owner_id).await?)
    }

    pub async fn grant_consent(
        &self,
        owner_id: &OwnerId,
        consent_type: ConsentType,
        purpose: &str,
        expires_in_days: Option<u32>,
        correlation_id: &str,
    ) -> Result<Consent, ApplicationError> {
        if purpose.trim().is_empty() {
            return Err(DomainError::validation("purpose", "is required").into());
        }
        if expires_in_days == Some(0) {
            return Err(DomainError::validation("expiresInDays", "must be greater than zero").into());
        }
        let now = Utc::now();
        let expiry = expires_in_days.map(|days| now + Duration::days(i64::from(days)));
        let consent = Consent::grant(owner_id.clone(), consent_type, purpose.trim(), expiry, now);
        self.consents.save(&consent).await?;
        self.audit.emit(
            AuditContext::for_owner(owner_id, correlation_id)
                .event("consent.granted", AuditCategory::Consent, AuditOutcome::Success)
                .with_metadata("consent_id", consent.id.0.clone())
                .with_metadata("type", consent_type.as_str()),
        );
        Ok(consent)
    }

    pub async fn revoke_consent(
        &self,
        owner_id: &OwnerId,
        consent_id: &ConsentId,
        correlation_id: &str,
    ) -> Result<Consent, ApplicationError> {
        let mut consent = self
            .consents
            .find_by_id_and_owner(consent_id, owner_id)
            .await?
            .ok_or_else(|| DomainError::not_found("consent"))?;
        consent.revoke(Utc::now());
        self.consents.save(&consent).await?;
        self.audit.emit(
            AuditContext::for_owner(owner_id, correlation_id)
                .event("consent.revoked", AuditCategory::Consent, AuditOutcome::Success)
                .with_metadata("consent_id", consent.id.0.clone())
                .with_metadata("type", consent.consent_type.as_str()),
        );
        Ok(consent)
    }

    fn decrypt_assessment(&self, assessment: &Assessment) -> Result<AssessmentRecord, ApplicationError> {
        let cipher = self.cipher.as_ref();
        let health_data: HealthProfile = decrypt_json(cipher, &assessment.raw_health_data)?;
        let answers = assessment
            .answers
            .iter()
            .map(|answer| {
                Ok(AnswerRecord {
                    question_id: answer.question_id.clone(),
                    question: answer.question_text.clone(),
                    answer: cipher.decrypt(&answer.answer)?,
                    confidence: answer.confidence,
                    answered_at: answer.answered_at,
                })
            })
            .collect::<Result<Vec<_>, ApplicationError>>()?;
        let recommendations =
            assessment.recommendations.as_ref().map(|blob| cipher.decrypt(blob)).transpose()?;

        Ok(AssessmentRecord {
            id: assessment.id.0.clone(),
            status: assessment.status,
            health_data,
            answers,
            recommendations,
            progress: assessment.progress_percent(),
            total_questions: assessment.total_questions,
            created_at: assessment.created_at,
            updated_at: assessment.updated_at,
            completed_at: assessment.completed_at,
        })
    }

    fn emit(
        &self,
        owner_id: &OwnerId,
        correlation_id: &str,
        event_type: &str,
        outcome: AuditOutcome,
        metadata: &[(&str, String)],
    ) {
        let mut event = AuditContext::for_owner(owner_id, correlation_id).event(
            event_type,
            AuditCategory::DataRights,
            outcome,
        );
        for (key, value) in metadata {
            event = event.with_metadata(*key, value.clone());
        }
        self.audit.emit(event);
    }
}
