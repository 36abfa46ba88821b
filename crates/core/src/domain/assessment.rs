use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssessmentId(pub String);

impl AssessmentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for AssessmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Base64 AES-GCM envelope produced by [`crate::privacy::crypto::DataCipher`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedBlob(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    InProgress,
    Completed,
    Restricted,
    Deleted,
}

impl AssessmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Restricted => "restricted",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "restricted" => Some(Self::Restricted),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

const ACTIVITY_LEVELS: &[&str] = &["sedentary", "light", "moderate", "active", "very_active"];

/// Health data submitted when an assessment starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthProfile {
    pub age: u32,
    pub weight: f64,
    pub height: f64,
    pub gender: String,
    pub activity_level: String,
    pub goals: Vec<String>,
    #[serde(default)]
    pub medical_conditions: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub dietary_preferences: Vec<String>,
}

impl HealthProfile {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !(1..=120).contains(&self.age) {
            return Err(DomainError::validation("age", "must be between 1 and 120"));
        }
        if !(20.0..=500.0).contains(&self.weight) {
            return Err(DomainError::validation("weight", "must be between 20 and 500 kg"));
        }
        if !(50.0..=272.0).contains(&self.height) {
            return Err(DomainError::validation("height", "must be between 50 and 272 cm"));
        }
        if self.gender.trim().is_empty() {
            return Err(DomainError::validation("gender", "is required"));
        }
        let activity = self.activity_level.trim().to_ascii_lowercase();
        if !ACTIVITY_LEVELS.contains(&activity.as_str()) {
            return Err(DomainError::validation(
                "activityLevel",
                format!("must be one of {}", ACTIVITY_LEVELS.join("|")),
            ));
        }
        if self.goals.iter().all(|goal| goal.trim().is_empty()) {
            return Err(DomainError::validation("goals", "at least one goal is required"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingQuestion {
    pub question_id: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredAnswer {
    pub question_id: String,
    pub question_text: String,
    pub answer: EncryptedBlob,
    pub confidence: f64,
    pub answered_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: AssessmentId,
    pub owner_id: OwnerId,
    pub status: AssessmentStatus,
    pub raw_health_data: EncryptedBlob,
    pub anonymized_health_data: EncryptedBlob,
    pub answers: Vec<StoredAnswer>,
    pub total_questions: u32,
    pub pending_question: Option<PendingQuestion>,
    pub recommendations: Option<EncryptedBlob>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Assessment {
    pub fn progress_percent(&self) -> u8 {
        progress_percent(self.answers.len(), self.total_questions)
    }

    pub fn is_answered(&self, question_id: &str) -> bool {
        self.answers.iter().any(|answer| answer.question_id == question_id)
    }

    pub fn all_answered(&self) -> bool {
        self.answers.len() >= self.total_questions as usize
    }

    /// Identifier for the question that follows the recorded answers.
    pub fn next_question_id(&self) -> String {
        format!("q{}", self.answers.len() + 1)
    }
}

/// `round(100 * answered / total)`, clamped to `0..=100`.
pub fn progress_percent(answered: usize, total_questions: u32) -> u8 {
    if total_questions == 0 {
        return 0;
    }
    let total = u64::from(total_questions);
    let answered = (answered as u64).min(total);
    ((200 * answered + total) / (2 * total)) as u8
}

#[cfg(test)]
mod tests {
    use super::{progress_percent, HealthProfile};

    fn profile() -> HealthProfile {
        HealthProfile {
            age: 34,
            weight: 72.5,
            height: 178.0,
            gender: "female".to_string(),
            activity_level: "moderate".to_string(),
            goals: vec!["weight_loss".to_string()],
            medical_conditions: Vec::new(),
            allergies: vec!["peanuts".to_string()],
            dietary_preferences: Vec::new(),
        }
    }

    #[test]
    fn progress_rounds_to_nearest_percent() {
        assert_eq!(progress_percent(0, 15), 0);
        assert_eq!(progress_percent(1, 15), 7);
        assert_eq!(progress_percent(14, 15), 93);
        assert_eq!(progress_percent(15, 15), 100);
        assert_eq!(progress_percent(1, 8), 13);
    }

    #[test]
    fn progress_stays_within_bounds_for_every_step() {
        for total in 1..=50u32 {
            for answered in 0..=total as usize {
                let percent = progress_percent(answered, total);
                let expected = (100.0 * answered as f64 / f64::from(total)).round() as u8;
                assert!(percent <= 100);
                assert_eq!(percent, expected, "answered={answered} total={total}");
            }
        }
    }

    #[test]
    fn profile_validation_accepts_reasonable_values() {
        assert!(profile().validate().is_ok());
    }

    #[test]
    fn profile_validation_names_offending_field() {
        let mut invalid = profile();
        invalid.activity_level = "couch".to_string();
        let error = invalid.validate().expect_err("unknown activity level");
        assert!(error.to_string().contains("activityLevel"));

        let mut invalid = profile();
        invalid.goals = vec![" ".to_string()];
        assert!(invalid.validate().is_err());
    }
}
