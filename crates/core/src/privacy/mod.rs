//! Per-request privacy posture and the pipeline that every payload crosses
//! before it may reach an inference provider: consent gate, minimization,
//! anonymization. Field encryption for data at rest lives in [`crypto`].

pub mod anonymize;
pub mod context;
pub mod crypto;
pub mod gate;
pub mod minimize;
pub mod pipeline;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::assessment::OwnerId;
use crate::domain::consent::ConsentType;

pub use context::{ConsentValidator, PrivacyContextResolver, StoredConsentValidator};
pub use gate::ConsentGate;
pub use pipeline::{prepare_for_provider, prepare_text_for_provider};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnonymizationLevel {
    Low,
    Medium,
    High,
}

impl AnonymizationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::str::FromStr for AnonymizationLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unsupported anonymization level `{other}` (expected low|medium|high)")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    Health,
}

impl OperationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Health => "health",
        }
    }
}

/// Operations that may send user data to an inference provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    HealthAssessment,
    Advice,
    MealPlan,
    ProgressTracking,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HealthAssessment => "health_assessment",
            Self::Advice => "advice",
            Self::MealPlan => "meal_plan",
            Self::ProgressTracking => "progress_tracking",
        }
    }

    pub fn category(&self) -> OperationCategory {
        match self {
            Self::HealthAssessment | Self::Advice | Self::MealPlan | Self::ProgressTracking => {
                OperationCategory::Health
            }
        }
    }

    pub fn required_consents(&self) -> &'static [ConsentType] {
        match self {
            Self::HealthAssessment => &[ConsentType::HealthDataProcessing, ConsentType::AiAnalysis],
            Self::Advice => &[ConsentType::AiAnalysis],
            Self::MealPlan => &[ConsentType::HealthDataProcessing, ConsentType::AiAnalysis],
            Self::ProgressTracking => &[ConsentType::HealthDataProcessing],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceFlags {
    pub gdpr: bool,
    pub lopdgdd: bool,
    pub fail_closed_anonymization: bool,
    pub data_retention_days: u32,
}

/// Caller-supplied request facts, extracted by the transport layer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    pub correlation_id: String,
    pub consent_token: Option<String>,
    pub caller_ip: Option<String>,
    pub user_agent: Option<String>,
    pub requested_level: Option<AnonymizationLevel>,
    pub authorize_raw_data: bool,
}

/// Built fresh for every request and never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyContext {
    pub owner_id: OwnerId,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    pub caller_ip: Option<String>,
    pub user_agent: Option<String>,
    pub consent_valid: bool,
    pub data_minimization_enabled: bool,
    pub anonymization_enabled: bool,
    pub anonymization_level: AnonymizationLevel,
    pub compliance: ComplianceFlags,
    pub authorize_raw_data: bool,
}

impl PrivacyContext {
    /// Anonymization failures reject the request instead of passing data through.
    pub fn anonymization_required(&self) -> bool {
        self.anonymization_enabled && self.compliance.fail_closed_anonymization
    }

    /// Level actually applied to provider-bound payloads.
    pub fn effective_level(&self) -> AnonymizationLevel {
        if self.anonymization_enabled {
            self.anonymization_level
        } else {
            AnonymizationLevel::Low
        }
    }

    pub fn retention_until(&self) -> DateTime<Utc> {
        self.timestamp + Duration::days(i64::from(self.compliance.data_retention_days))
    }

    pub fn transparency(&self) -> TransparencyMetadata {
        TransparencyMetadata {
            data_retention_days: self.compliance.data_retention_days,
            anonymization: if self.anonymization_enabled {
                self.anonymization_level.as_str().to_owned()
            } else {
                "disabled".to_owned()
            },
            consent_valid: self.consent_valid,
        }
    }
}

/// Informational block attached to every successful response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransparencyMetadata {
    pub data_retention_days: u32,
    pub anonymization: String,
    pub consent_valid: bool,
}


#[cfg(test)]
mod tests {
    use super::test_support::context;
    use super::{AnonymizationLevel, OperationCategory, OperationKind};
    use crate::domain::consent::ConsentType;

    #[test]
    fn operation_table_matches_required_consents() {
        assert_eq!(
            OperationKind::HealthAssessment.required_consents(),
            &[ConsentType::HealthDataProcessing, ConsentType::AiAnalysis]
        );
        assert_eq!(OperationKind::Advice.required_consents(), &[ConsentType::AiAnalysis]);
        assert_eq!(
            OperationKind::ProgressTracking.required_consents(),
            &[ConsentType::HealthDataProcessing]
        );
        assert_eq!(OperationKind::MealPlan.category(), OperationCategory::Health);
    }

    #[test]
    fn levels_are_ordered_by_strength() {
        assert!(AnonymizationLevel::Low < AnonymizationLevel::Medium);
        assert!(AnonymizationLevel::Medium < AnonymizationLevel::High);
        assert_eq!("HIGH".parse::<AnonymizationLevel>(), Ok(AnonymizationLevel::High));
    }

    #[test]
    fn transparency_reports_disabled_anonymization() {
        let mut ctx = context("user-1", true);
        assert_eq!(ctx.transparency().anonymization, "medium");

        ctx.anonymization_enabled = false;
        let transparency = ctx.transparency();
        assert_eq!(transparency.anonymization, "disabled");
        assert_eq!(transparency.data_retention_days, 730);
        assert_eq!(ctx.effective_level(), AnonymizationLevel::Low);
        assert!(!ctx.anonymization_required());
    }
}
