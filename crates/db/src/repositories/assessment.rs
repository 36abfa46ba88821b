use sqlx::sqlite::SqliteRow;

use vitalia_core::domain::assessment::{
    Assessment, AssessmentId, AssessmentStatus, EncryptedBlob, OwnerId, PendingQuestion,
    StoredAnswer,
};
use vitalia_core::storage::{AssessmentRepository, RepositoryError};

use super::{column, db_error, from_json, parse_optional_timestamp, parse_timestamp, to_json};
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT id, owner_id, status, raw_health_data, anonymized_health_data,
        answers_json, total_questions, pending_question_json, recommendations,
        created_at, updated_at, completed_at
 FROM assessments";

pub struct SqlAssessmentRepository {
    pool: DbPool,
}

impl SqlAssessmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_assessment(row: &SqliteRow) -> Result<Assessment, RepositoryError> {
    let status_str: String = column(row, "status")?;
    let status = AssessmentStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown assessment status `{status_str}`")))?;
    let answers_json: String = column(row, "answers_json")?;
    let pending_json: Option<String> = column(row, "pending_question_json")?;
    let total_questions: i64 = column(row, "total_questions")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;
    let recommendations: Option<String> = column(row, "recommendations")?;

    Ok(Assessment {
        id: AssessmentId(column(row, "id")?),
        owner_id: OwnerId(column(row, "owner_id")?),
        status,
        raw_health_data: EncryptedBlob(column(row, "raw_health_data")?),
        anonymized_health_data: EncryptedBlob(column(row, "anonymized_health_data")?),
        answers: from_json::<Vec<StoredAnswer>>(&answers_json)?,
        total_questions: u32::try_from(total_questions)
            .map_err(|e| RepositoryError::Decode(format!("total_questions: {e}")))?,
        pending_question: pending_json.as_deref().map(from_json::<PendingQuestion>).transpose()?,
        recommendations: recommendations.map(EncryptedBlob),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        completed_at: parse_optional_timestamp(column(row, "completed_at")?)?,
    })
}

#[async_trait::async_trait]
impl AssessmentRepository for SqlAssessmentRepository {
    async fn save(&self, assessment: &Assessment) -> Result<(), RepositoryError> {
        let answers_json = to_json(&assessment.answers)?;
        let pending_json = assessment.pending_question.as_ref().map(to_json).transpose()?;

        sqlx::query(
            "INSERT INTO assessments (id, owner_id, status, raw_health_data, anonymized_health_data,
                                      answers_json, total_questions, pending_question_json,
                                      recommendations, created_at, updated_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 answers_json = excluded.answers_json,
                 pending_question_json = excluded.pending_question_json,
                 recommendations = excluded.recommendations,
                 updated_at = excluded.updated_at,
                 completed_at = excluded.completed_at
             WHERE assessments.owner_id = excluded.owner_id",
        )
        .bind(&assessment.id.0)
        .bind(&assessment.owner_id.0)
        .bind(assessment.status.as_str())
        .bind(&assessment.raw_health_data.0)
        .bind(&assessment.anonymized_health_data.0)
        .bind(answers_json)
        .bind(i64::from(assessment.total_questions))
        .bind(pending_json)
        .bind(assessment.recommendations.as_ref().map(|blob| blob.0.clone()))
        .bind(assessment.created_at.to_rfc3339())
        .bind(assessment.updated_at.to_rfc3339())
        .bind(assessment.completed_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn update(&self, assessment: &Assessment) -> Result<bool, RepositoryError> {
        let answers_json = to_json(&assessment.answers)?;
        let pending_json = assessment.pending_question.as_ref().map(to_json).transpose()?;

        let result = sqlx::query(
            "UPDATE assessments SET
                 status = ?,
                 answers_json = ?,
                 pending_question_json = ?,
                 recommendations = ?,
                 updated_at = ?,
                 completed_at = ?
             WHERE id = ? AND owner_id = ?",
        )
        .bind(assessment.status.as_str())
        .bind(answers_json)
        .bind(pending_json)
        .bind(assessment.recommendations.as_ref().map(|blob| blob.0.clone()))
        .bind(assessment.updated_at.to_rfc3339())
        .bind(assessment.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(&assessment.id.0)
        .bind(&assessment.owner_id.0)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id_and_owner(
        &self,
        id: &AssessmentId,
        owner_id: &OwnerId,
    ) -> Result<Option<Assessment>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ? AND owner_id = ?"))
            .bind(&id.0)
            .bind(&owner_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.as_ref().map(row_to_assessment).transpose()
    }

    async fn delete_by_id_and_owner(
        &self,
        id: &AssessmentId,
        owner_id: &OwnerId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM assessments WHERE id = ? AND owner_id = ?")
            .bind(&id.0)
            .bind(&owner_id.0)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Assessment>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE owner_id = ? ORDER BY created_at ASC"))
            .bind(&owner_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter().map(row_to_assessment).collect()
    }
}
