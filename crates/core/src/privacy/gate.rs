use chrono::{DateTime, Utc};

use crate::domain::consent::{active_types, Consent};
use crate::domain::rights::{DataCategory, DataRestriction, RestrictionStatus};
use crate::errors::{ApplicationError, ConsentError};
use crate::privacy::{OperationCategory, OperationKind, PrivacyContext};
use crate::storage::{ConsentRepository, DataRightsRepository};

/// Runs before minimization, anonymization or any provider call.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsentGate;

impl ConsentGate {
    pub fn check(
        &self,
        operation: OperationKind,
        context: &PrivacyContext,
        consents: &[Consent],
        restrictions: &[DataRestriction],
        now: DateTime<Utc>,
    ) -> Result<(), ConsentError> {
        let category = operation.category();
        if category == OperationCategory::Health && !context.consent_valid {
            return Err(ConsentError::HealthConsentRequired);
        }

        let active = active_types(consents, now);
        let missing: Vec<_> = operation
            .required_consents()
            .iter()
            .filter(|required| !active.contains(required))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(ConsentError::MissingConsents { missing });
        }

        let mut restricted: Vec<DataCategory> = restrictions
            .iter()
            .filter(|restriction| restriction.status(now) == RestrictionStatus::Active)
            .filter(|restriction| covers(restriction, category))
            .flat_map(|restriction| restriction.categories.iter().copied())
            .collect();
        if !restricted.is_empty() {
            restricted.sort();
            restricted.dedup();
            return Err(ConsentError::ProcessingRestricted { categories: restricted });
        }

        Ok(())
    }

    /// Loads the owner's consents and restrictions, then applies [`Self::check`].
    pub async fn enforce(
        &self,
        operation: OperationKind,
        context: &PrivacyContext,
        consents: &dyn ConsentRepository,
        rights: &dyn DataRightsRepository,
    ) -> Result<(), ApplicationError> {
        if operation.category() == OperationCategory::Health && !context.consent_valid {
            return Err(ConsentError::HealthConsentRequired.into());
        }
        let granted = consents.list_by_owner(&context.owner_id).await?;
        let restrictions = rights.list_restrictions(&context.owner_id).await?;
        self.check(operation, context, &granted, &restrictions, Utc::now())?;
        Ok(())
    }
}

fn covers(restriction: &DataRestriction, category: OperationCategory) -> bool {
    match category {
        OperationCategory::Health => restriction.covers_health_data(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::ConsentGate;
    use crate::domain::assessment::OwnerId;
    use crate::domain::consent::{Consent, ConsentType};
    use crate::domain::rights::{DataCategory, DataRestriction};
    use crate::errors::ConsentError;
    use crate::privacy::test_support::context;
    use crate::privacy::OperationKind;

    fn owner() -> OwnerId {
        OwnerId("user-1".to_owned())
    }

    fn consents(types: &[ConsentType]) -> Vec<Consent> {
        let now = Utc::now();
        types.iter().map(|kind| Consent::grant(owner(), *kind, "test", None, now)).collect()
    }

    #[test]
    fn health_operations_require_valid_consent_token_first() {
        let result = ConsentGate.check(
            OperationKind::Advice,
            &context("user-1", false),
            &consents(&[ConsentType::AiAnalysis]),
            &[],
            Utc::now(),
        );

        assert_eq!(result, Err(ConsentError::HealthConsentRequired));
    }

    #[test]
    fn missing_consents_are_listed_in_table_order() {
        let result = ConsentGate.check(
            OperationKind::MealPlan,
            &context("user-1", true),
            &consents(&[ConsentType::Marketing]),
            &[],
            Utc::now(),
        );

        assert_eq!(
            result,
            Err(ConsentError::MissingConsents {
                missing: vec![ConsentType::HealthDataProcessing, ConsentType::AiAnalysis]
            })
        );
    }

    #[test]
    fn revoked_consent_does_not_count() {
        let now = Utc::now();
        let mut granted = consents(&[ConsentType::HealthDataProcessing]);
        granted[0].revoke(now);

        let result =
            ConsentGate.check(OperationKind::ProgressTracking, &context("user-1", true), &granted, &[], now);
        assert!(matches!(result, Err(ConsentError::MissingConsents { .. })));
    }

    #[test]
    fn active_health_restriction_blocks_processing_until_expiry() {
        let now = Utc::now();
        let granted = consents(&[ConsentType::HealthDataProcessing, ConsentType::AiAnalysis]);
        let restriction = DataRestriction::new(
            owner(),
            "accuracy dispute",
            vec![DataCategory::HealthData],
            10,
            now - Duration::days(1),
        );
        let gate = ConsentGate;
        let ctx = context("user-1", true);

        let blocked =
            gate.check(OperationKind::HealthAssessment, &ctx, &granted, &[restriction.clone()], now);
        assert!(matches!(blocked, Err(ConsentError::ProcessingRestricted { .. })));

        let later = now + Duration::days(10);
        assert!(gate
            .check(OperationKind::HealthAssessment, &ctx, &granted, &[restriction], later)
            .is_ok());
    }

    #[test]
    fn profile_only_restriction_does_not_block_health_operations() {
        let now = Utc::now();
        let granted = consents(&[ConsentType::AiAnalysis]);
        let restriction =
            DataRestriction::new(owner(), "marketing", vec![DataCategory::Profile], 30, now);

        assert!(ConsentGate
            .check(OperationKind::Advice, &context("user-1", true), &granted, &[restriction], now)
            .is_ok());
    }
}
