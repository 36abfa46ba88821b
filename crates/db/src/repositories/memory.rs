use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use vitalia_core::domain::assessment::{Assessment, AssessmentId, OwnerId};
use vitalia_core::domain::consent::{Consent, ConsentId};
use vitalia_core::domain::rights::{
    DataRestriction, ProcessingObjection, RectificationRecord, SubjectProfile,
};
use vitalia_core::storage::{
    AssessmentRepository, ConsentRepository, DataRightsRepository, ErasureCounts, ErasureScope,
    RepositoryError, SubjectEraser,
};

#[derive(Default)]
pub struct InMemoryAssessmentRepository {
    assessments: RwLock<HashMap<String, Assessment>>,
}

#[async_trait::async_trait]
impl AssessmentRepository for InMemoryAssessmentRepository {
    async fn save(&self, assessment: &Assessment) -> Result<(), RepositoryError> {
        let mut assessments = self.assessments.write().await;
        if let Some(existing) = assessments.get(&assessment.id.0) {
            if existing.owner_id != assessment.owner_id {
                return Ok(());
            }
        }
        assessments.insert(assessment.id.0.clone(), assessment.clone());
        Ok(())
    }

    async fn update(&self, assessment: &Assessment) -> Result<bool, RepositoryError> {
        let mut assessments = self.assessments.write().await;
        match assessments.get_mut(&assessment.id.0) {
            Some(existing) if existing.owner_id == assessment.owner_id => {
                *existing = assessment.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_id_and_owner(
        &self,
        id: &AssessmentId,
        owner_id: &OwnerId,
    ) -> Result<Option<Assessment>, RepositoryError> {
        let assessments = self.assessments.read().await;
        Ok(assessments.get(&id.0).filter(|a| &a.owner_id == owner_id).cloned())
    }

    async fn delete_by_id_and_owner(
        &self,
        id: &AssessmentId,
        owner_id: &OwnerId,
    ) -> Result<bool, RepositoryError> {
        let mut assessments = self.assessments.write().await;
        if assessments.get(&id.0).is_some_and(|a| &a.owner_id == owner_id) {
            assessments.remove(&id.0);
            return Ok(true);
        }
        Ok(false)
    }

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Assessment>, RepositoryError> {
        let assessments = self.assessments.read().await;
        let mut owned: Vec<Assessment> =
            assessments.values().filter(|a| &a.owner_id == owner_id).cloned().collect();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(owned)
    }
}

#[derive(Default)]
pub struct InMemoryConsentRepository {
    consents: RwLock<HashMap<String, Consent>>,
}

#[async_trait::async_trait]
impl ConsentRepository for InMemoryConsentRepository {
    async fn save(&self, consent: &Consent) -> Result<(), RepositoryError> {
        let mut consents = self.consents.write().await;
        consents.insert(consent.id.0.clone(), consent.clone());
        Ok(())
    }

    async fn find_by_id_and_owner(
        &self,
        id: &ConsentId,
        owner_id: &OwnerId,
    ) -> Result<Option<Consent>, RepositoryError> {
        let consents = self.consents.read().await;
        Ok(consents.get(&id.0).filter(|c| &c.owner_id == owner_id).cloned())
    }

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Consent>, RepositoryError> {
        let consents = self.consents.read().await;
        let mut owned: Vec<Consent> =
            consents.values().filter(|c| &c.owner_id == owner_id).cloned().collect();
        owned.sort_by(|a, b| a.granted_at.cmp(&b.granted_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(owned)
    }
}

#[derive(Default)]
struct SubjectRecords {
    profile: Option<SubjectProfile>,
    restrictions: Vec<DataRestriction>,
    objections: Vec<ProcessingObjection>,
    rectifications: Vec<RectificationRecord>,
}

#[derive(Default)]
pub struct InMemoryDataRightsRepository {
    subjects: RwLock<HashMap<OwnerId, SubjectRecords>>,
}

impl InMemoryDataRightsRepository {
    async fn read<T>(&self, owner_id: &OwnerId, project: impl FnOnce(&SubjectRecords) -> T) -> T
    where
        T: Default,
    {
        let subjects = self.subjects.read().await;
        subjects.get(owner_id).map(project).unwrap_or_default()
    }

    async fn write<T>(&self, owner_id: &OwnerId, mutate: impl FnOnce(&mut SubjectRecords) -> T) -> T {
        let mut subjects = self.subjects.write().await;
        mutate(subjects.entry(owner_id.clone()).or_default())
    }
}

#[async_trait::async_trait]
impl DataRightsRepository for InMemoryDataRightsRepository {
    async fn find_profile(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Option<SubjectProfile>, RepositoryError> {
        Ok(self.read(owner_id, |records| records.profile.clone()).await)
    }

    async fn save_profile(&self, profile: &SubjectProfile) -> Result<(), RepositoryError> {
        self.write(&profile.owner_id, |records| records.profile = Some(profile.clone())).await;
        Ok(())
    }


    async fn save_restriction(&self, restriction: &DataRestriction) -> Result<(), RepositoryError> {
        self.write(&restriction.owner_id, |records| {
            records.restrictions.retain(|existing| existing.id != restriction.id);
            records.restrictions.push(restriction.clone());
        })
        .await;
        Ok(())
    }

    async fn list_restrictions(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Vec<DataRestriction>, RepositoryError> {
        Ok(self.read(owner_id, |records| records.restrictions.clone()).await)
    }


    async fn save_objection(&self, objection: &ProcessingObjection) -> Result<(), RepositoryError> {
        self.write(&objection.owner_id, |records| records.objections.push(objection.clone())).await;
        Ok(())
    }

    async fn list_objections(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Vec<ProcessingObjection>, RepositoryError> {
        Ok(self.read(owner_id, |records| records.objections.clone()).await)
    }


    async fn append_rectification(
        &self,
        record: &RectificationRecord,
    ) -> Result<(), RepositoryError> {
        self.write(&record.owner_id, |records| records.rectifications.push(record.clone())).await;
        Ok(())
    }

    async fn list_rectifications(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Vec<RectificationRecord>, RepositoryError> {
        Ok(self.read(owner_id, |records| records.rectifications.clone()).await)
    }

}

/// Erases across the in-memory assessment and data-rights maps while holding
/// both write locks, so readers never observe a partial erasure.
pub struct InMemorySubjectEraser {
    assessments: Arc<InMemoryAssessmentRepository>,
    rights: Arc<InMemoryDataRightsRepository>,
}

impl InMemorySubjectEraser {
    pub fn new(
        assessments: Arc<InMemoryAssessmentRepository>,
        rights: Arc<InMemoryDataRightsRepository>,
    ) -> Self {
        Self { assessments, rights }
    }
}

#[async_trait::async_trait]
impl SubjectEraser for InMemorySubjectEraser {
    async fn erase_subject(
        &self,
        owner_id: &OwnerId,
        scope: ErasureScope,
    ) -> Result<ErasureCounts, RepositoryError> {
        let mut assessments = self.assessments.assessments.write().await;
        let mut subjects = self.rights.subjects.write().await;
        let mut counts = ErasureCounts::default();

        if scope.assessments {
            let before = assessments.len();
            assessments.retain(|_, a| &a.owner_id != owner_id);
            counts.assessments = (before - assessments.len()) as u64;
        }
        if let Some(records) = subjects.get_mut(owner_id) {
            if scope.profile {
                counts.profile = u64::from(records.profile.take().is_some());
            }
            if scope.restrictions {
                counts.restrictions = drain_count(&mut records.restrictions);
            }
            if scope.objections {
                counts.objections = drain_count(&mut records.objections);
            }
            if scope.rectifications {
                counts.rectifications = drain_count(&mut records.rectifications);
            }
        }
        Ok(counts)
    }
}

fn drain_count<T>(items: &mut Vec<T>) -> u64 {
    let count = items.len() as u64;
    items.clear();
    count
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use vitalia_core::domain::assessment::OwnerId;
    use vitalia_core::domain::consent::{Consent, ConsentType};
    use std::sync::Arc;

    use vitalia_core::domain::rights::{DataCategory, DataRestriction, SubjectProfile};
    use vitalia_core::storage::{
        ConsentRepository, DataRightsRepository, ErasureScope, SubjectEraser,
    };

    use super::{
        InMemoryAssessmentRepository, InMemoryConsentRepository, InMemoryDataRightsRepository,
        InMemorySubjectEraser,
    };

    #[tokio::test]
    async fn in_memory_consents_are_owner_scoped() {
        let repo = InMemoryConsentRepository::default();
        let now = Utc::now();
        let consent =
            Consent::grant(OwnerId("user-1".to_owned()), ConsentType::Analytics, "stats", None, now);
        repo.save(&consent).await.expect("save");

        assert!(repo
            .find_by_id_and_owner(&consent.id, &OwnerId("user-2".to_owned()))
            .await
            .expect("find")
            .is_none());
        assert_eq!(repo.list_by_owner(&consent.owner_id).await.expect("list"), vec![consent]);
    }

    #[tokio::test]
    async fn in_memory_erasure_reports_counts_per_family() {
        let repo = Arc::new(InMemoryDataRightsRepository::default());
        let eraser =
            InMemorySubjectEraser::new(Arc::new(InMemoryAssessmentRepository::default()), repo.clone());
        let owner = OwnerId("user-1".to_owned());
        let now = Utc::now();
        repo.save_profile(&SubjectProfile::empty(owner.clone())).await.expect("profile");
        for _ in 0..2 {
            repo.save_restriction(&DataRestriction::new(
                owner.clone(),
                "review",
                vec![DataCategory::All],
                30,
                now,
            ))
            .await
            .expect("restriction");
        }

        let profile_only = ErasureScope { profile: true, ..ErasureScope::default() };
        let counts = eraser.erase_subject(&owner, profile_only).await.expect("erase");
        assert_eq!((counts.profile, counts.restrictions), (1, 0));
        assert_eq!(repo.list_restrictions(&owner).await.expect("list").len(), 2);

        let counts = eraser.erase_subject(&owner, ErasureScope::covering(&[])).await.expect("erase");
        assert_eq!(counts.profile, 0);
        assert_eq!(counts.restrictions, 2);
        assert_eq!(counts.total(), 2);
    }
}
