use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::assessment::OwnerId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    All,
    HealthData,
    Assessments,
    Profile,
    Restrictions,
    Objections,
    Rectifications,
}

impl DataCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::HealthData => "health_data",
            Self::Assessments => "assessments",
            Self::Profile => "profile",
            Self::Restrictions => "restrictions",
            Self::Objections => "objections",
            Self::Rectifications => "rectifications",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "all" => Some(Self::All),
            "health_data" | "health" => Some(Self::HealthData),
            "assessments" => Some(Self::Assessments),
            "profile" => Some(Self::Profile),
            "restrictions" => Some(Self::Restrictions),
            "objections" => Some(Self::Objections),
            "rectifications" => Some(Self::Rectifications),
            _ => None,
        }
    }

    pub fn covers_health_data(&self) -> bool {
        matches!(self, Self::All | Self::HealthData | Self::Assessments)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionStatus {
    Active,
    Expired,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRestriction {
    pub id: String,
    pub owner_id: OwnerId,
    pub reason: String,
    pub categories: Vec<DataCategory>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl DataRestriction {
    pub fn new(
        owner_id: OwnerId,
        reason: impl Into<String>,
        categories: Vec<DataCategory>,
        duration_days: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            reason: reason.into(),
            categories,
            start_date: now,
            end_date: now + Duration::days(i64::from(duration_days)),
        }
    }

    /// Derived against the clock; no background job flips it.
    pub fn status(&self, now: DateTime<Utc>) -> RestrictionStatus {
        if now < self.end_date {
            RestrictionStatus::Active
        } else {
            RestrictionStatus::Expired
        }
    }

    pub fn covers_health_data(&self) -> bool {
        self.categories.iter().any(DataCategory::covers_health_data)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectionStatus {
    Recorded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingObjection {
    pub id: String,
    pub owner_id: OwnerId,
    pub reason: String,
    pub processing_type: String,
    pub created_at: DateTime<Utc>,
    pub status: ObjectionStatus,
}

impl ProcessingObjection {
    pub fn record(
        owner_id: OwnerId,
        reason: impl Into<String>,
        processing_type: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            reason: reason.into(),
            processing_type: processing_type.into(),
            created_at: now,
            status: ObjectionStatus::Recorded,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProfile {
    pub owner_id: OwnerId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub age: Option<u32>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub gender: Option<String>,
    pub activity_level: Option<String>,
    #[serde(default)]
    pub dietary_preferences: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RectifiableField {
    FirstName,
    LastName,
    Email,
    Phone,
    Age,
    Weight,
    Height,
    Gender,
    ActivityLevel,
    DietaryPreferences,
    Allergies,
}

impl RectifiableField {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "firstName" => Some(Self::FirstName),
            "lastName" => Some(Self::LastName),
            "email" => Some(Self::Email),
            "phone" => Some(Self::Phone),
            "age" => Some(Self::Age),
            "weight" => Some(Self::Weight),
            "height" => Some(Self::Height),
            "gender" => Some(Self::Gender),
            "activityLevel" => Some(Self::ActivityLevel),
            "dietaryPreferences" => Some(Self::DietaryPreferences),
            "allergies" => Some(Self::Allergies),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FirstName => "firstName",
            Self::LastName => "lastName",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Age => "age",
            Self::Weight => "weight",
            Self::Height => "height",
            Self::Gender => "gender",
            Self::ActivityLevel => "activityLevel",
            Self::DietaryPreferences => "dietaryPreferences",
            Self::Allergies => "allergies",
        }
    }
}

impl SubjectProfile {
    pub fn empty(owner_id: OwnerId) -> Self {
        Self { owner_id, ..Self::default() }
    }

    pub fn field_value(&self, field: RectifiableField) -> Value {
        match field {
            RectifiableField::FirstName => optional_text(&self.first_name),
            RectifiableField::LastName => optional_text(&self.last_name),
            RectifiableField::Email => optional_text(&self.email),
            RectifiableField::Phone => optional_text(&self.phone),
            RectifiableField::Age => self.age.map_or(Value::Null, Value::from),
            RectifiableField::Weight => self.weight.map_or(Value::Null, Value::from),
            RectifiableField::Height => self.height.map_or(Value::Null, Value::from),
            RectifiableField::Gender => optional_text(&self.gender),
            RectifiableField::ActivityLevel => optional_text(&self.activity_level),
            RectifiableField::DietaryPreferences => Value::from(self.dietary_preferences.clone()),
            RectifiableField::Allergies => Value::from(self.allergies.clone()),
        }
    }

    /// Overwrites one field, returning the previous value.
    pub fn set_field(&mut self, field: RectifiableField, value: &Value) -> Result<Value, DomainError> {
        let previous = self.field_value(field);
        let name = field.name();
        match field {
            RectifiableField::FirstName => self.first_name = Some(text(name, value)?),
            RectifiableField::LastName => self.last_name = Some(text(name, value)?),
            RectifiableField::Email => {
                let email = text(name, value)?;
                if !email.contains('@') {
                    return Err(DomainError::validation(name, "must be an e-mail address"));
                }
                self.email = Some(email);
            }
            RectifiableField::Phone => self.phone = Some(text(name, value)?),
            RectifiableField::Age => {
                let age = value
                    .as_u64()
                    .filter(|age| (1..=120).contains(age))
                    .ok_or_else(|| DomainError::validation(name, "must be between 1 and 120"))?;
                self.age = Some(age as u32);
            }
            RectifiableField::Weight => self.weight = Some(number(name, value, 20.0, 500.0)?),
            RectifiableField::Height => self.height = Some(number(name, value, 50.0, 272.0)?),
            RectifiableField::Gender => self.gender = Some(text(name, value)?),
            RectifiableField::ActivityLevel => self.activity_level = Some(text(name, value)?),
            RectifiableField::DietaryPreferences => {
                self.dietary_preferences = text_list(name, value)?
            }
            RectifiableField::Allergies => self.allergies = text_list(name, value)?,
        }
        Ok(previous)
    }
}

fn optional_text(value: &Option<String>) -> Value {
    value.as_ref().map_or(Value::Null, |text| Value::String(text.clone()))
}

fn text(field: &str, value: &Value) -> Result<String, DomainError> {
    value
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| DomainError::validation(field, "must be a non-empty string"))
}

fn number(field: &str, value: &Value, min: f64, max: f64) -> Result<f64, DomainError> {
    value
        .as_f64()
        .filter(|number| (min..=max).contains(number))
        .ok_or_else(|| DomainError::validation(field, format!("must be between {min} and {max}")))
}

fn text_list(field: &str, value: &Value) -> Result<Vec<String>, DomainError> {
    let items = value
        .as_array()
        .ok_or_else(|| DomainError::validation(field, "must be a list of strings"))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_owned)
                .ok_or_else(|| DomainError::validation(field, "must be a list of strings"))
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RectificationRecord {
    pub id: String,
    pub owner_id: OwnerId,
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
    pub rectified_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::{DataCategory, DataRestriction, RectifiableField, RestrictionStatus, SubjectProfile};
    use crate::domain::assessment::OwnerId;

    #[test]
    fn restriction_expires_against_the_clock() {
        let now = Utc::now();
        let restriction = DataRestriction::new(
            OwnerId("user-1".to_owned()),
            "dispute",
            vec![DataCategory::HealthData],
            30,
            now,
        );

        assert_eq!(restriction.status(now + Duration::days(29)), RestrictionStatus::Active);
        assert_eq!(restriction.status(now + Duration::days(30)), RestrictionStatus::Expired);
        assert!(restriction.covers_health_data());
    }

    #[test]
    fn set_field_returns_previous_value_and_validates() {
        let mut profile = SubjectProfile::empty(OwnerId("user-1".to_owned()));
        profile.weight = Some(80.0);

        let previous =
            profile.set_field(RectifiableField::Weight, &json!(78.5)).expect("valid weight");
        assert_eq!(previous, json!(80.0));
        assert_eq!(profile.weight, Some(78.5));

        assert!(profile.set_field(RectifiableField::Email, &json!("not-an-email")).is_err());
        assert!(profile.set_field(RectifiableField::Age, &json!(0)).is_err());
        assert_eq!(RectifiableField::parse("password"), None);
    }
}
