use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::PrivacyConfig;
use crate::domain::assessment::OwnerId;
use crate::domain::consent::{ConsentId, ConsentType};
use crate::errors::ApplicationError;
use crate::privacy::{ComplianceFlags, PrivacyContext, RequestMetadata};
use crate::storage::ConsentRepository;

/// Decides whether a consent token presented by the caller is currently valid.
#[async_trait]
pub trait ConsentValidator: Send + Sync {
    async fn validate(&self, owner_id: &OwnerId, token: &str) -> Result<bool, ApplicationError>;
}

/// Treats the token as a consent id owned by the caller.
pub struct StoredConsentValidator {
    consents: Arc<dyn ConsentRepository>,
}

impl StoredConsentValidator {
    pub fn new(consents: Arc<dyn ConsentRepository>) -> Self {
        Self { consents }
    }
}

#[async_trait]
impl ConsentValidator for StoredConsentValidator {
    async fn validate(&self, owner_id: &OwnerId, token: &str) -> Result<bool, ApplicationError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(false);
        }
        let consent =
            self.consents.find_by_id_and_owner(&ConsentId(token.to_owned()), owner_id).await?;
        Ok(consent.is_some_and(|consent| {
            consent.consent_type == ConsentType::HealthDataProcessing && consent.is_active(Utc::now())
        }))
    }
}

pub struct PrivacyContextResolver {
    config: PrivacyConfig,
    validator: Arc<dyn ConsentValidator>,
}

impl PrivacyContextResolver {
    pub fn new(config: PrivacyConfig, validator: Arc<dyn ConsentValidator>) -> Self {
        Self { config, validator }
    }

    pub async fn resolve(
        &self,
        owner_id: &OwnerId,
        metadata: RequestMetadata,
    ) -> Result<PrivacyContext, ApplicationError> {
        let consent_valid = match metadata.consent_token.as_deref() {
            Some(token) => self.validator.validate(owner_id, token).await?,
            None => false,
        };

        // A request may ask for stronger anonymization, never weaker.
        let configured = self.config.anonymization_level;
        let anonymization_level =
            metadata.requested_level.map_or(configured, |requested| requested.max(configured));

        Ok(PrivacyContext {
            owner_id: owner_id.clone(),
            correlation_id: metadata.correlation_id,
            timestamp: Utc::now(),
            caller_ip: metadata.caller_ip,
            user_agent: metadata.user_agent,
            consent_valid,
            data_minimization_enabled: self.config.data_minimization,
            anonymization_enabled: self.config.anonymization,
            anonymization_level,
            compliance: ComplianceFlags {
                gdpr: self.config.gdpr,
                lopdgdd: self.config.lopdgdd,
                fail_closed_anonymization: self.config.fail_closed_anonymization,
                data_retention_days: self.config.data_retention_days,
            },
            authorize_raw_data: metadata.authorize_raw_data,
        })
    }
}
