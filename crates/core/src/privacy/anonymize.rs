//! Identifier removal for provider-bound payloads.
//!
//! Placeholders contain no digits, `@` or capitalised words, so running the
//! pipeline again at the same level leaves its output unchanged.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::errors::PrivacyError;
use crate::privacy::AnonymizationLevel;

pub const MAX_DEPTH: usize = 32;

const NAME_PLACEHOLDER: &str = "[NAME]";

const NAME_KEYS: &[&str] = &[
    "name",
    "firstname",
    "lastname",
    "fullname",
    "username",
    "surname",
    "middlename",
    "givenname",
    "familyname",
    "nickname",
    "displayname",
];

const LOCATION_KEYS: &[&str] = &[
    "address",
    "city",
    "country",
    "postalcode",
    "zipcode",
    "zip",
    "location",
    "region",
    "street",
    "latitude",
    "longitude",
    "lat",
    "lng",
];

const DATE_KEYS: &[&str] = &["dateofbirth", "birthdate", "dob", "birthday"];

struct Patterns {
    self_introduction: Regex,
    redactions: Vec<(Regex, &'static str)>,
}

static PATTERNS: Lazy<Result<Patterns, regex::Error>> = Lazy::new(|| {
    Ok(Patterns {
        self_introduction: Regex::new(
            r"(?P<intro>\b(?i:my name is|i am called|me llamo|mi nombre es))\s+(?P<name>\p{Lu}[\p{L}'-]*(?:\s+\p{Lu}[\p{L}'-]*)?)",
        )?,
        // Order matters: longer structured identifiers go before phone numbers.
        redactions: vec![
            (Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")?, "[EMAIL]"),
            (Regex::new(r"\b[A-Z]{2}\d{2}(?:\s?[A-Z0-9]{4}){2,7}(?:\s?[A-Z0-9]{1,4})?\b")?, "[IBAN]"),
            (Regex::new(r"\b(?:\d[ -]?){12,18}\d\b")?, "[CARD]"),
            (Regex::new(r"\b\d{3}-\d{2}-\d{4}\b")?, "[ID]"),
            (Regex::new(r"\b[XYZxyz]-?\d{7}-?[A-Za-z]\b")?, "[ID]"),
            (Regex::new(r"\b\d{8}-?[A-Za-z]\b")?, "[ID]"),
            (Regex::new(r"\b\d{1,4}[/.-]\d{1,2}[/.-]\d{1,4}\b")?, "[DATE]"),
            (
                Regex::new(r"(?:\+\d{1,3}[\s.-]?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{3,4}\b")?,
                "[PHONE]",
            ),
        ],
    })
});

/// Removes or masks identifiers according to `level`. `Low` is a pass-through.
pub fn anonymize(payload: &Value, level: AnonymizationLevel) -> Result<Value, PrivacyError> {
    if level == AnonymizationLevel::Low {
        return Ok(payload.clone());
    }

    let patterns = PATTERNS
        .as_ref()
        .map_err(|error| PrivacyError::AnonymizationFailed(format!("pattern compile: {error}")))?;

    check_depth(payload, 1)?;

    let mut names = Vec::new();
    collect_names(payload, &patterns.self_introduction, &mut names);
    let name_pattern = build_name_pattern(names)?;

    let scrubber = Scrubber { level, patterns, names: name_pattern.as_ref() };
    Ok(scrubber.scrub(payload))
}

/// Anonymizes a single free-text value, e.g. an answer or a question.
pub fn anonymize_text(text: &str, level: AnonymizationLevel) -> Result<String, PrivacyError> {
    match anonymize(&Value::String(text.to_owned()), level)? {
        Value::String(scrubbed) => Ok(scrubbed),
        other => Ok(other.to_string()),
    }
}

pub(crate) fn normalize_key(key: &str) -> String {
    key.chars().filter(char::is_ascii_alphanumeric).map(|ch| ch.to_ascii_lowercase()).collect()
}

fn check_depth(value: &Value, depth: usize) -> Result<(), PrivacyError> {
    let children: Box<dyn Iterator<Item = &Value>> = match value {
        Value::Object(map) => Box::new(map.values()),
        Value::Array(items) => Box::new(items.iter()),
        _ => return Ok(()),
    };
    if depth > MAX_DEPTH {
        return Err(PrivacyError::AnonymizationFailed(format!(
            "payload nesting exceeds {MAX_DEPTH} levels"
        )));
    }
    for child in children {
        check_depth(child, depth + 1)?;
    }
    Ok(())
}

/// Name-keyed fields plus names introduced in free text ("my name is X").
fn collect_names(value: &Value, introduction: &Regex, names: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if NAME_KEYS.contains(&normalize_key(key).as_str()) {
                    match child {
                        Value::String(name) => names.push(name.clone()),
                        Value::Array(items) => names.extend(
                            items.iter().filter_map(Value::as_str).map(str::to_owned),
                        ),
                        _ => {}
                    }
                }
                collect_names(child, introduction, names);
            }
        }
        Value::Array(items) => {
            items.iter().for_each(|item| collect_names(item, introduction, names));
        }
        Value::String(text) => names.extend(
            introduction
                .captures_iter(text)
                .filter_map(|captures| captures.name("name"))
                .map(|name| name.as_str().to_owned()),
        ),
        _ => {}
    }
}

fn build_name_pattern(names: Vec<String>) -> Result<Option<Regex>, PrivacyError> {
    let mut candidates: Vec<String> = Vec::new();
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        candidates.push(name.to_owned());
        candidates.extend(
            name.split_whitespace().filter(|part| part.chars().count() >= 3).map(str::to_owned),
        );
    }
    if candidates.is_empty() {
        return Ok(None);
    }
    // Longest first so "Ana García" wins over "Ana".
    candidates.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    candidates.dedup();

    let alternation =
        candidates.iter().map(|name| regex::escape(name)).collect::<Vec<_>>().join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
        .map(Some)
        .map_err(|error| PrivacyError::AnonymizationFailed(format!("name pattern: {error}")))
}

struct Scrubber<'a> {
    level: AnonymizationLevel,
    patterns: &'a Patterns,
    names: Option<&'a Regex>,
}

impl Scrubber<'_> {
    fn scrub(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut scrubbed = Map::new();
                for (key, child) in map {
                    if self.removes(key) {
                        continue;
                    }
                    scrubbed.insert(key.clone(), self.scrub(child));
                }
                Value::Object(scrubbed)
            }
            Value::Array(items) => Value::Array(items.iter().map(|item| self.scrub(item)).collect()),
            Value::String(text) => Value::String(self.scrub_text(text)),
            other => other.clone(),
        }
    }

    fn removes(&self, key: &str) -> bool {
        let key = normalize_key(key);
        if NAME_KEYS.contains(&key.as_str()) {
            return true;
        }
        self.level == AnonymizationLevel::High
            && (LOCATION_KEYS.contains(&key.as_str()) || DATE_KEYS.contains(&key.as_str()))
    }

    fn scrub_text(&self, text: &str) -> String {
        let mut output = self
            .patterns
            .self_introduction
            .replace_all(text, format!("${{intro}} {NAME_PLACEHOLDER}").as_str())
            .into_owned();
        if let Some(names) = self.names {
            output = names.replace_all(&output, NAME_PLACEHOLDER).into_owned();
        }
        if self.level == AnonymizationLevel::High {
            for (pattern, placeholder) in &self.patterns.redactions {
                output = pattern.replace_all(&output, *placeholder).into_owned();
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{anonymize, anonymize_text, MAX_DEPTH};
    use crate::errors::PrivacyError;
    use crate::privacy::AnonymizationLevel;

    fn sample() -> Value {
        json!({
            "firstName": "Lucía",
            "last_name": "Fernández",
            "age": 41,
            "city": "Sevilla",
            "dateOfBirth": "1983-04-12",
            "notes": "My name is Lucía Fernández, write to lucia@example.org or call +34 612 345 678",
            "history": [{ "note": "Lucía reported poor sleep on 12/03/2024" }]
        })
    }

    #[test]
    fn low_level_is_pass_through() {
        let payload = sample();
        assert_eq!(anonymize(&payload, AnonymizationLevel::Low), Ok(payload));
    }

    #[test]
    fn medium_removes_names_and_masks_them_in_text() {
        let scrubbed = anonymize(&sample(), AnonymizationLevel::Medium).expect("medium");

        assert!(scrubbed.get("firstName").is_none());
        assert!(scrubbed.get("last_name").is_none());
        assert_eq!(scrubbed["city"], "Sevilla");
        assert_eq!(scrubbed["age"], 41);

        let notes = scrubbed["notes"].as_str().unwrap_or_default();
        assert!(notes.starts_with("My name is [NAME]"));
        assert!(!notes.contains("Lucía"));
        assert!(notes.contains("lucia@example.org"));
        assert_eq!(scrubbed["history"][0]["note"], "[NAME] reported poor sleep on 12/03/2024");
    }

    #[test]
    fn introduced_names_are_masked_everywhere_in_the_payload() {
        let payload = json!({
            "notes": "Hola, me llamo Itziar Etxeberria.",
            "answers": ["Itziar skips breakfast", "Etxeberria family meals at 21h"]
        });
        let scrubbed = anonymize(&payload, AnonymizationLevel::Medium).expect("medium");

        assert_eq!(scrubbed["notes"], "Hola, me llamo [NAME].");
        assert_eq!(scrubbed["answers"][0], "[NAME] skips breakfast");
        assert_eq!(scrubbed["answers"][1], "[NAME] family meals at 21h");
        assert_eq!(anonymize(&scrubbed, AnonymizationLevel::Medium), Ok(scrubbed.clone()));
    }

    #[test]
    fn high_strips_strictly_more_than_medium() {
        let medium = anonymize(&sample(), AnonymizationLevel::Medium).expect("medium");
        let high = anonymize(&sample(), AnonymizationLevel::High).expect("high");

        assert!(medium.get("city").is_some());
        assert!(high.get("city").is_none());
        assert!(high.get("dateOfBirth").is_none());
        assert!(medium.as_object().map(|m| m.len()) > high.as_object().map(|m| m.len()));

        let notes = high["notes"].as_str().unwrap_or_default();
        assert!(notes.contains("[EMAIL]"));
        assert!(notes.contains("[PHONE]"));
        assert_eq!(high["history"][0]["note"], "[NAME] reported poor sleep on [DATE]");
    }

    #[test]
    fn identifiers_in_free_text_are_redacted_at_high() {
        let text = "DNI 12345678Z, NIE X1234567L, SSN 123-45-6789, card 4111 1111 1111 1111, IBAN ES91 2100 0418 4502 0005 1332";
        let scrubbed = anonymize_text(text, AnonymizationLevel::High).expect("high");

        assert_eq!(scrubbed, "DNI [ID], NIE [ID], SSN [ID], card [CARD], IBAN [IBAN]");
    }

    #[test]
    fn anonymization_is_idempotent_at_each_level() {
        for level in [AnonymizationLevel::Low, AnonymizationLevel::Medium, AnonymizationLevel::High] {
            let once = anonymize(&sample(), level).expect("first pass");
            let twice = anonymize(&once, level).expect("second pass");
            assert_eq!(once, twice, "level {level:?}");
        }
    }

    #[test]
    fn excessive_nesting_is_a_failure() {
        let mut payload = json!("leaf");
        for _ in 0..=MAX_DEPTH {
            payload = json!({ "inner": payload });
        }

        let result = anonymize(&payload, AnonymizationLevel::Medium);
        assert!(matches!(result, Err(PrivacyError::AnonymizationFailed(_))));
    }
}
