use sqlx::sqlite::SqliteRow;

use vitalia_core::domain::assessment::OwnerId;
use vitalia_core::domain::consent::{Consent, ConsentId, ConsentType};
use vitalia_core::storage::{ConsentRepository, RepositoryError};

use super::{column, db_error, parse_optional_timestamp, parse_timestamp};
use crate::DbPool;

pub struct SqlConsentRepository {
    pool: DbPool,
}

impl SqlConsentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_consent(row: &SqliteRow) -> Result<Consent, RepositoryError> {
    let type_str: String = column(row, "consent_type")?;
    let consent_type = ConsentType::parse(&type_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown consent type `{type_str}`")))?;
    let granted: i64 = column(row, "granted")?;
    let granted_at: String = column(row, "granted_at")?;

    Ok(Consent {
        id: ConsentId(column(row, "id")?),
        owner_id: OwnerId(column(row, "owner_id")?),
        consent_type,
        purpose: column(row, "purpose")?,
        granted: granted != 0,
        granted_at: parse_timestamp(&granted_at)?,
        revoked_at: parse_optional_timestamp(column(row, "revoked_at")?)?,
        expiry_date: parse_optional_timestamp(column(row, "expiry_date")?)?,
    })
}

#[async_trait::async_trait]
impl ConsentRepository for SqlConsentRepository {
    async fn save(&self, consent: &Consent) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO consents (id, owner_id, consent_type, purpose, granted, granted_at,
                                   revoked_at, expiry_date)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 granted = excluded.granted,
                 revoked_at = excluded.revoked_at,
                 expiry_date = excluded.expiry_date
             WHERE consents.owner_id = excluded.owner_id",
        )
        .bind(&consent.id.0)
        .bind(&consent.owner_id.0)
        .bind(consent.consent_type.as_str())
        .bind(&consent.purpose)
        .bind(i64::from(consent.granted))
        .bind(consent.granted_at.to_rfc3339())
        .bind(consent.revoked_at.map(|dt| dt.to_rfc3339()))
        .bind(consent.expiry_date.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn find_by_id_and_owner(
        &self,
        id: &ConsentId,
        owner_id: &OwnerId,
    ) -> Result<Option<Consent>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, owner_id, consent_type, purpose, granted, granted_at, revoked_at, expiry_date
             FROM consents WHERE id = ? AND owner_id = ?",
        )
        .bind(&id.0)
        .bind(&owner_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.as_ref().map(row_to_consent).transpose()
    }

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Consent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, owner_id, consent_type, purpose, granted, granted_at, revoked_at, expiry_date
             FROM consents WHERE owner_id = ? ORDER BY granted_at ASC, id ASC",
        )
        .bind(&owner_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_consent).collect()
    }
}
