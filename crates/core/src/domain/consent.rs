use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::assessment::OwnerId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsentId(pub String);

impl ConsentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentType {
    HealthDataProcessing,
    AiAnalysis,
    DataStorage,
    Analytics,
    Marketing,
}

impl ConsentType {
    pub const ALL: [ConsentType; 5] = [
        Self::HealthDataProcessing,
        Self::AiAnalysis,
        Self::DataStorage,
        Self::Analytics,
        Self::Marketing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HealthDataProcessing => "health_data_processing",
            Self::AiAnalysis => "ai_analysis",
            Self::DataStorage => "data_storage",
            Self::Analytics => "analytics",
            Self::Marketing => "marketing",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw.trim())
    }
}

impl std::fmt::Display for ConsentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A purpose-bound authorization. Revocation mutates the record; it is never
/// removed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consent {
    pub id: ConsentId,
    pub owner_id: OwnerId,
    #[serde(rename = "type")]
    pub consent_type: ConsentType,
    pub purpose: String,
    pub granted: bool,
    pub granted_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl Consent {
    pub fn grant(
        owner_id: OwnerId,
        consent_type: ConsentType,
        purpose: impl Into<String>,
        expiry_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ConsentId::generate(),
            owner_id,
            consent_type,
            purpose: purpose.into(),
            granted: true,
            granted_at: now,
            revoked_at: None,
            expiry_date,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.granted
            && self.revoked_at.is_none()
            && self.expiry_date.map_or(true, |expiry| expiry > now)
    }

    pub fn revoke(&mut self, now: DateTime<Utc>) {
        self.granted = false;
        if self.revoked_at.is_none() {
            self.revoked_at = Some(now);
        }
    }
}

/// Consent types with at least one active record at `now`.
pub fn active_types(consents: &[Consent], now: DateTime<Utc>) -> Vec<ConsentType> {
    let mut active: Vec<ConsentType> = consents
        .iter()
        .filter(|consent| consent.is_active(now))
        .map(|consent| consent.consent_type)
        .collect();
    active.sort();
    active.dedup();
    active
}
