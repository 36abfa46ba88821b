use std::sync::Arc;

use vitalia_agent::{AssessmentRuntime, GuidanceService, PromptBuilder, ProviderChain};
use vitalia_core::audit::{AuditSink, TracingAuditSink};
use vitalia_core::config::AppConfig;
use vitalia_core::flows::AssessmentLocks;
use vitalia_core::privacy::crypto::{AesGcmCipher, DataCipher};
use vitalia_core::privacy::{PrivacyContextResolver, StoredConsentValidator};
use vitalia_core::rights::DataRightsService;
use vitalia_core::storage::Stores;
use vitalia_db::{
    DbPool, SqlAssessmentRepository, SqlConsentRepository, SqlDataRightsRepository,
    SqlSubjectEraser,
};

use crate::bootstrap::BootstrapError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: DbPool,
    pub resolver: Arc<PrivacyContextResolver>,
    pub assessments: Arc<AssessmentRuntime>,
    pub guidance: Arc<GuidanceService>,
    pub rights: Arc<DataRightsService>,
    pub chain: Arc<ProviderChain>,
}

impl AppState {
    /// Wires the SQL-backed stores and services around an already built chain.
    pub fn assemble(
        config: AppConfig,
        db_pool: DbPool,
        chain: Arc<ProviderChain>,
    ) -> Result<Self, BootstrapError> {
        let stores = Stores {
            assessments: Arc::new(SqlAssessmentRepository::new(db_pool.clone())),
            consents: Arc::new(SqlConsentRepository::new(db_pool.clone())),
            rights: Arc::new(SqlDataRightsRepository::new(db_pool.clone())),
            eraser: Arc::new(SqlSubjectEraser::new(db_pool.clone())),
        };
        let cipher: Arc<dyn DataCipher> = Arc::new(
            AesGcmCipher::from_secret(&config.privacy.encryption_key)
                .map_err(BootstrapError::Cipher)?,
        );
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
        let prompts = Arc::new(PromptBuilder::new().map_err(BootstrapError::Prompt)?);
        let locks = AssessmentLocks::default();

        let resolver = PrivacyContextResolver::new(
            config.privacy.clone(),
            Arc::new(StoredConsentValidator::new(stores.consents.clone())),
        );
        let assessments = AssessmentRuntime::new(
            stores.clone(),
            chain.clone(),
            prompts.clone(),
            cipher.clone(),
            audit.clone(),
            locks.clone(),
            config.assessment.clone(),
        );
        let guidance = GuidanceService::new(stores.clone(), chain.clone(), prompts, audit.clone());
        let rights = DataRightsService::new(stores, cipher, audit, locks);

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            resolver: Arc::new(resolver),
            assessments: Arc::new(assessments),
            guidance: Arc::new(guidance),
            rights: Arc::new(rights),
            chain,
        })
    }
}
