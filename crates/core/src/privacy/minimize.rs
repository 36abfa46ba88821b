use serde_json::{Map, Value};

use crate::errors::PrivacyError;
use crate::privacy::anonymize::{normalize_key, MAX_DEPTH};
use crate::privacy::OperationCategory;

/// Removed at every depth regardless of category.
const GLOBAL_DENY: &[&str] = &[
    "email",
    "emailaddress",
    "mail",
    "phone",
    "phonenumber",
    "telephone",
    "mobile",
    "address",
    "streetaddress",
    "nationalid",
    "dni",
    "nie",
    "ssn",
    "passport",
    "passportnumber",
    "cardnumber",
    "creditcard",
    "cvv",
    "cvc",
    "iban",
];

/// Top-level allow-list for one operation category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MinimizationSchema {
    pub category: OperationCategory,
    pub allowed_fields: &'static [&'static str],
}

const HEALTH_FIELDS: &[&str] = &[
    "age",
    "weight",
    "height",
    "gender",
    "activityLevel",
    "goals",
    "medicalConditions",
    "allergies",
    "dietaryPreferences",
    "question",
    "topic",
    "context",
    "answers",
    "preferences",
    "days",
    "mealsPerDay",
    "calorieTarget",
    "metrics",
    "entries",
    "period",
    "notes",
];

impl MinimizationSchema {
    pub fn for_category(category: OperationCategory) -> Self {
        match category {
            OperationCategory::Health => Self { category, allowed_fields: HEALTH_FIELDS },
        }
    }

    fn allows(&self, key: &str) -> bool {
        self.allowed_fields.contains(&key)
    }
}

/// Keeps only the fields the category needs and strips direct identifiers.
pub fn minimize(payload: &Value, category: OperationCategory) -> Result<Value, PrivacyError> {
    let Value::Object(fields) = payload else {
        return Err(PrivacyError::MinimizationFailed(
            "payload must be a JSON object".to_owned(),
        ));
    };

    let schema = MinimizationSchema::for_category(category);
    let mut minimized = Map::new();
    for (key, value) in fields {
        if !schema.allows(key) || is_denied(key) {
            continue;
        }
        minimized.insert(key.clone(), strip_denied(value, 2)?);
    }
    Ok(Value::Object(minimized))
}

fn is_denied(key: &str) -> bool {
    GLOBAL_DENY.contains(&normalize_key(key).as_str())
}

fn strip_denied(value: &Value, depth: usize) -> Result<Value, PrivacyError> {
    let is_container = matches!(value, Value::Object(_) | Value::Array(_));
    if is_container && depth > MAX_DEPTH {
        return Err(PrivacyError::MinimizationFailed(format!(
            "payload nesting exceeds {MAX_DEPTH} levels"
        )));
    }
    match value {
        Value::Object(map) => {
            let mut kept = Map::new();
            for (key, child) in map {
                if is_denied(key) {
                    continue;
                }
                kept.insert(key.clone(), strip_denied(child, depth + 1)?);
            }
            Ok(Value::Object(kept))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| strip_denied(item, depth + 1))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::minimize;
    use crate::errors::PrivacyError;
    use crate::privacy::OperationCategory;

    #[test]
    fn unknown_top_level_fields_are_dropped() {
        let payload = json!({
            "age": 30,
            "goals": ["hydration"],
            "email": "a@b.c",
            "employer": "ACME",
            "password": "hunter2"
        });

        let minimized = minimize(&payload, OperationCategory::Health).expect("object payload");
        assert_eq!(minimized, json!({ "age": 30, "goals": ["hydration"] }));
    }

    #[test]
    fn deny_list_applies_recursively() {
        let payload = json!({
            "context": {
                "Phone_Number": "612345678",
                "mood": "tired",
                "contacts": [{ "iban": "ES91", "relation": "coach" }]
            }
        });

        let minimized = minimize(&payload, OperationCategory::Health).expect("object payload");
        assert_eq!(
            minimized,
            json!({ "context": { "mood": "tired", "contacts": [{ "relation": "coach" }] } })
        );
    }

    #[test]
    fn non_object_payload_is_a_failure() {
        let result = minimize(&json!(["age", 30]), OperationCategory::Health);
        assert!(matches!(result, Err(PrivacyError::MinimizationFailed(_))));
    }
}
