use vitalia_core::domain::assessment::OwnerId;
use vitalia_core::storage::{ErasureCounts, ErasureScope, RepositoryError, SubjectEraser};

use super::db_error;
use crate::DbPool;

/// Runs the whole erasure in one transaction; a failing table rolls back the
/// tables already cleared.
pub struct SqlSubjectEraser {
    pool: DbPool,
}

impl SqlSubjectEraser {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SubjectEraser for SqlSubjectEraser {
    async fn erase_subject(
        &self,
        owner_id: &OwnerId,
        scope: ErasureScope,
    ) -> Result<ErasureCounts, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut counts = ErasureCounts::default();

        let targets = [
            (scope.assessments, "assessments", &mut counts.assessments),
            (scope.profile, "subject_profiles", &mut counts.profile),
            (scope.restrictions, "data_restrictions", &mut counts.restrictions),
            (scope.objections, "processing_objections", &mut counts.objections),
            (scope.rectifications, "rectifications", &mut counts.rectifications),
        ];
        for (wanted, table, count) in targets {
            if !wanted {
                continue;
            }
            let result = sqlx::query(&format!("DELETE FROM {table} WHERE owner_id = ?"))
                .bind(&owner_id.0)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
            *count = result.rows_affected();
        }

        tx.commit().await.map_err(db_error)?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use vitalia_core::domain::assessment::{
        Assessment, AssessmentId, AssessmentStatus, EncryptedBlob, OwnerId,
    };
    use vitalia_core::domain::rights::{RectificationRecord, SubjectProfile};
    use vitalia_core::storage::{
        AssessmentRepository, DataRightsRepository, ErasureScope, SubjectEraser,
    };

    use super::SqlSubjectEraser;
    use crate::repositories::test_support::pool;
    use crate::{DbPool, SqlAssessmentRepository, SqlDataRightsRepository};

    async fn seed(pool: &DbPool, owner: &OwnerId) {
        let now = Utc::now();
        let assessments = SqlAssessmentRepository::new(pool.clone());
        for id in ["a-1", "a-2"] {
            assessments
                .save(&Assessment {
                    id: AssessmentId(id.to_owned()),
                    owner_id: owner.clone(),
                    status: AssessmentStatus::InProgress,
                    raw_health_data: EncryptedBlob("cmF3".to_owned()),
                    anonymized_health_data: EncryptedBlob("YW5vbg==".to_owned()),
                    answers: Vec::new(),
                    total_questions: 15,
                    pending_question: None,
                    recommendations: None,
                    created_at: now,
                    updated_at: now,
                    completed_at: None,
                })
                .await
                .expect("save assessment");
        }

        let rights = SqlDataRightsRepository::new(pool.clone());
        rights.save_profile(&SubjectProfile::empty(owner.clone())).await.expect("profile");
        rights
            .append_rectification(&RectificationRecord {
                id: "r-1".to_owned(),
                owner_id: owner.clone(),
                field: "age".to_owned(),
                old_value: json!(40),
                new_value: json!(41),
                rectified_at: now,
            })
            .await
            .expect("rectification");
    }

    #[tokio::test]
    async fn erasure_counts_each_family_and_spares_other_owners() {
        let pool = pool().await;
        let owner = OwnerId("user-1".to_owned());
        let other = OwnerId("user-2".to_owned());
        seed(&pool, &owner).await;
        seed_other(&pool, &other).await;
        let eraser = SqlSubjectEraser::new(pool.clone());

        let counts = eraser.erase_subject(&owner, ErasureScope::covering(&[])).await.expect("erase");
        assert_eq!(counts.assessments, 2);
        assert_eq!(counts.profile, 1);
        assert_eq!(counts.rectifications, 1);
        assert_eq!(counts.total(), 4);

        let again = eraser.erase_subject(&owner, ErasureScope::covering(&[])).await.expect("erase");
        assert_eq!(again.total(), 0);
        let rights = SqlDataRightsRepository::new(pool.clone());
        assert!(rights.find_profile(&other).await.expect("find").is_some());
    }

    #[tokio::test]
    async fn failing_table_rolls_back_the_whole_erasure() {
        let pool = pool().await;
        let owner = OwnerId("user-1".to_owned());
        seed(&pool, &owner).await;
        sqlx::query(
            "CREATE TRIGGER keep_rectifications BEFORE DELETE ON rectifications
             BEGIN SELECT RAISE(ABORT, 'rectification log is locked'); END",
        )
        .execute(&pool)
        .await
        .expect("trigger");

        let eraser = SqlSubjectEraser::new(pool.clone());
        let result = eraser.erase_subject(&owner, ErasureScope::covering(&[])).await;
        assert!(result.is_err());

        let assessments = SqlAssessmentRepository::new(pool.clone());
        assert_eq!(assessments.list_by_owner(&owner).await.expect("list").len(), 2);
        let rights = SqlDataRightsRepository::new(pool.clone());
        assert!(rights.find_profile(&owner).await.expect("find").is_some());
        assert_eq!(rights.list_rectifications(&owner).await.expect("list").len(), 1);
    }

    async fn seed_other(pool: &DbPool, other: &OwnerId) {
        SqlDataRightsRepository::new(pool.clone())
            .save_profile(&SubjectProfile::empty(other.clone()))
            .await
            .expect("profile");
    }
}
