use sqlx::sqlite::SqliteRow;

use vitalia_core::domain::assessment::OwnerId;
use vitalia_core::domain::rights::{
    DataCategory, DataRestriction, ObjectionStatus, ProcessingObjection, RectificationRecord,
    SubjectProfile,
};
use vitalia_core::storage::{DataRightsRepository, RepositoryError};

use super::{column, db_error, from_json, parse_timestamp, to_json};
use crate::DbPool;

/// Profile, restrictions, objections and the rectification log share one
/// repository since they are only ever touched by the data-rights workflow.
pub struct SqlDataRightsRepository {
    pool: DbPool,
}

impl SqlDataRightsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_restriction(row: &SqliteRow) -> Result<DataRestriction, RepositoryError> {
    let categories: String = column(row, "categories_json")?;
    let start_date: String = column(row, "start_date")?;
    let end_date: String = column(row, "end_date")?;
    Ok(DataRestriction {
        id: column(row, "id")?,
        owner_id: OwnerId(column(row, "owner_id")?),
        reason: column(row, "reason")?,
        categories: from_json::<Vec<DataCategory>>(&categories)?,
        start_date: parse_timestamp(&start_date)?,
        end_date: parse_timestamp(&end_date)?,
    })
}

fn row_to_objection(row: &SqliteRow) -> Result<ProcessingObjection, RepositoryError> {
    let status: String = column(row, "status")?;
    if status != "recorded" {
        return Err(RepositoryError::Decode(format!("unknown objection status `{status}`")));
    }
    let created_at: String = column(row, "created_at")?;
    Ok(ProcessingObjection {
        id: column(row, "id")?,
        owner_id: OwnerId(column(row, "owner_id")?),
        reason: column(row, "reason")?,
        processing_type: column(row, "processing_type")?,
        created_at: parse_timestamp(&created_at)?,
        status: ObjectionStatus::Recorded,
    })
}

fn row_to_rectification(row: &SqliteRow) -> Result<RectificationRecord, RepositoryError> {
    let old_value: String = column(row, "old_value_json")?;
    let new_value: String = column(row, "new_value_json")?;
    let rectified_at: String = column(row, "rectified_at")?;
    Ok(RectificationRecord {
        id: column(row, "id")?,
        owner_id: OwnerId(column(row, "owner_id")?),
        field: column(row, "field")?,
        old_value: from_json(&old_value)?,
        new_value: from_json(&new_value)?,
        rectified_at: parse_timestamp(&rectified_at)?,
    })
}

#[async_trait::async_trait]
impl DataRightsRepository for SqlDataRightsRepository {
    async fn find_profile(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Option<SubjectProfile>, RepositoryError> {
        let row = sqlx::query("SELECT profile_json FROM subject_profiles WHERE owner_id = ?")
            .bind(&owner_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        match row {
            Some(ref r) => {
                let raw: String = column(r, "profile_json")?;
                Ok(Some(from_json(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn save_profile(&self, profile: &SubjectProfile) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO subject_profiles (owner_id, profile_json, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(owner_id) DO UPDATE SET
                 profile_json = excluded.profile_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&profile.owner_id.0)
        .bind(to_json(profile)?)
        .bind(profile.updated_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }


    async fn save_restriction(&self, restriction: &DataRestriction) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO data_restrictions (id, owner_id, reason, categories_json, start_date, end_date)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 reason = excluded.reason,
                 categories_json = excluded.categories_json,
                 end_date = excluded.end_date
             WHERE data_restrictions.owner_id = excluded.owner_id",
        )
        .bind(&restriction.id)
        .bind(&restriction.owner_id.0)
        .bind(&restriction.reason)
        .bind(to_json(&restriction.categories)?)
        .bind(restriction.start_date.to_rfc3339())
        .bind(restriction.end_date.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn list_restrictions(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Vec<DataRestriction>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, owner_id, reason, categories_json, start_date, end_date
             FROM data_restrictions WHERE owner_id = ? ORDER BY start_date ASC, id ASC",
        )
        .bind(&owner_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_restriction).collect()
    }


    async fn save_objection(&self, objection: &ProcessingObjection) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO processing_objections (id, owner_id, reason, processing_type, status, created_at)
             VALUES (?, ?, ?, ?, 'recorded', ?)",
        )
        .bind(&objection.id)
        .bind(&objection.owner_id.0)
        .bind(&objection.reason)
        .bind(&objection.processing_type)
        .bind(objection.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn list_objections(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Vec<ProcessingObjection>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, owner_id, reason, processing_type, status, created_at
             FROM processing_objections WHERE owner_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(&owner_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_objection).collect()
    }


    async fn append_rectification(
        &self,
        record: &RectificationRecord,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO rectifications (id, owner_id, field, old_value_json, new_value_json, rectified_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.owner_id.0)
        .bind(&record.field)
        .bind(to_json(&record.old_value)?)
        .bind(to_json(&record.new_value)?)
        .bind(record.rectified_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn list_rectifications(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Vec<RectificationRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, owner_id, field, old_value_json, new_value_json, rectified_at
             FROM rectifications WHERE owner_id = ? ORDER BY rectified_at ASC, id ASC",
        )
        .bind(&owner_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_rectification).collect()
    }

}
