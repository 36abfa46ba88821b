//! Storage ports. Every lookup is scoped to an owner; a foreign id behaves
//! exactly like a missing one.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::assessment::{Assessment, AssessmentId, OwnerId};
use crate::domain::consent::{Consent, ConsentId};
use crate::domain::rights::{
    DataCategory, DataRestriction, ProcessingObjection, RectificationRecord, SubjectProfile,
};
use crate::errors::ApplicationError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        Self::Persistence(value.to_string())
    }
}

#[async_trait]
pub trait AssessmentRepository: Send + Sync {
    async fn save(&self, assessment: &Assessment) -> Result<(), RepositoryError>;

    /// Rewrites an existing record and never inserts one. Returns `false` when
    /// `(id, owner_id)` no longer exists, e.g. after an erasure.
    async fn update(&self, assessment: &Assessment) -> Result<bool, RepositoryError>;

    async fn find_by_id_and_owner(
        &self,
        id: &AssessmentId,
        owner_id: &OwnerId,
    ) -> Result<Option<Assessment>, RepositoryError>;

    /// Returns `false` when nothing matched `(id, owner_id)`.
    async fn delete_by_id_and_owner(
        &self,
        id: &AssessmentId,
        owner_id: &OwnerId,
    ) -> Result<bool, RepositoryError>;

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Assessment>, RepositoryError>;
}

/// Consents are never hard-deleted, so there is no delete operation.
#[async_trait]
pub trait ConsentRepository: Send + Sync {
    async fn save(&self, consent: &Consent) -> Result<(), RepositoryError>;

    async fn find_by_id_and_owner(
        &self,
        id: &ConsentId,
        owner_id: &OwnerId,
    ) -> Result<Option<Consent>, RepositoryError>;

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Consent>, RepositoryError>;
}

#[async_trait]
pub trait DataRightsRepository: Send + Sync {
    async fn find_profile(&self, owner_id: &OwnerId)
        -> Result<Option<SubjectProfile>, RepositoryError>;
    async fn save_profile(&self, profile: &SubjectProfile) -> Result<(), RepositoryError>;

    async fn save_restriction(&self, restriction: &DataRestriction) -> Result<(), RepositoryError>;
    async fn list_restrictions(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Vec<DataRestriction>, RepositoryError>;

    async fn save_objection(&self, objection: &ProcessingObjection)
        -> Result<(), RepositoryError>;
    async fn list_objections(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Vec<ProcessingObjection>, RepositoryError>;

    async fn append_rectification(
        &self,
        record: &RectificationRecord,
    ) -> Result<(), RepositoryError>;
    async fn list_rectifications(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Vec<RectificationRecord>, RepositoryError>;
}

/// Record families removed by one erasure request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ErasureScope {
    pub assessments: bool,
    pub profile: bool,
    pub restrictions: bool,
    pub objections: bool,
    pub rectifications: bool,
}

impl ErasureScope {
    /// An empty list means everything. Health data covers the assessments.
    pub fn covering(categories: &[DataCategory]) -> Self {
        let wants = |category: DataCategory| {
            categories.is_empty()
                || categories.iter().any(|requested| {
                    *requested == DataCategory::All
                        || *requested == category
                        || (category == DataCategory::Assessments
                            && *requested == DataCategory::HealthData)
                })
        };
        Self {
            assessments: wants(DataCategory::Assessments),
            profile: wants(DataCategory::Profile),
            restrictions: wants(DataCategory::Restrictions),
            objections: wants(DataCategory::Objections),
            rectifications: wants(DataCategory::Rectifications),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ErasureCounts {
    pub assessments: u64,
    pub profile: u64,
    pub restrictions: u64,
    pub objections: u64,
    pub rectifications: u64,
}

impl ErasureCounts {
    pub fn total(&self) -> u64 {
        self.assessments + self.profile + self.restrictions + self.objections + self.rectifications
    }
}

/// Erasure across every owner-scoped family at once. Either all scoped
/// records are removed or none are.
#[async_trait]
pub trait SubjectEraser: Send + Sync {
    async fn erase_subject(
        &self,
        owner_id: &OwnerId,
        scope: ErasureScope,
    ) -> Result<ErasureCounts, RepositoryError>;
}

/// The storage ports bundled for services that need several of them.
#[derive(Clone)]
pub struct Stores {
    pub assessments: Arc<dyn AssessmentRepository>,
    pub consents: Arc<dyn ConsentRepository>,
    pub rights: Arc<dyn DataRightsRepository>,
    pub eraser: Arc<dyn SubjectEraser>,
}
