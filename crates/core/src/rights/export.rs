//! Portable serializations of a subject's data. CSV and XML are small
//! hand-written emitters over the JSON form of the aggregate.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::assessment::OwnerId;
use crate::errors::{ApplicationError, DomainError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Xml,
}

impl ExportFormat {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "xml" => Ok(Self::Xml),
            other => Err(DomainError::validation(
                "format",
                format!("unsupported export format `{other}` (expected json|csv|xml)"),
            )),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv; charset=utf-8",
            Self::Xml => "application/xml",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Xml => "xml",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportedData {
    pub format: ExportFormat,
    pub content_type: &'static str,
    pub file_name: String,
    pub body: String,
}

pub fn render(
    owner_id: &OwnerId,
    aggregate: &Value,
    format: ExportFormat,
    now: DateTime<Utc>,
) -> Result<ExportedData, ApplicationError> {
    let body = match format {
        ExportFormat::Json => serde_json::to_string_pretty(aggregate)
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?,
        ExportFormat::Csv => to_csv(aggregate),
        ExportFormat::Xml => to_xml(aggregate),
    };
    Ok(ExportedData {
        format,
        content_type: format.content_type(),
        file_name: file_name(owner_id, format, now),
        body,
    })
}

fn file_name(owner_id: &OwnerId, format: ExportFormat, now: DateTime<Utc>) -> String {
    let owner: String = owner_id
        .0
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '_' })
        .collect();
    format!("vitalia-data-{owner}-{}.{}", now.format("%Y%m%d"), format.extension())
}

/// One row per leaf value: `section,record,field,value`.
pub fn to_csv(aggregate: &Value) -> String {
    let mut output = String::from("section,record,field,value\n");
    let Value::Object(sections) = aggregate else {
        return output;
    };
    for (section, value) in sections {
        match value {
            Value::Array(records) => {
                for (index, record) in records.iter().enumerate() {
                    let record_id = record
                        .get("id")
                        .and_then(Value::as_str)
                        .map(str::to_owned)
                        .unwrap_or_else(|| index.to_string());
                    write_leaves(&mut output, section, &record_id, "", record);
                }
            }
            other => write_leaves(&mut output, section, "", "", other),
        }
    }
    output
}

fn write_leaves(output: &mut String, section: &str, record: &str, path: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let next = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
                write_leaves(output, section, record, &next, child);
            }
        }
        Value::Array(items) if items.iter().all(|item| !item.is_object() && !item.is_array()) => {
            let joined = items.iter().map(scalar_text).collect::<Vec<_>>().join("; ");
            push_row(output, section, record, path, &joined);
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                write_leaves(output, section, record, &format!("{path}[{index}]"), item);
            }
        }
        scalar => push_row(output, section, record, path, &scalar_text(scalar)),
    }
}

fn push_row(output: &mut String, section: &str, record: &str, field: &str, value: &str) {
    let cells = [section, record, field, value].map(csv_cell);
    output.push_str(&cells.join(","));
    output.push('\n');
}

fn csv_cell(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_owned()
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub fn to_xml(aggregate: &Value) -> String {
    let mut output = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    write_element(&mut output, "userData", aggregate, 0);
    output
}

fn write_element(output: &mut String, name: &str, value: &Value, depth: usize) {
    let indent = "  ".repeat(depth);
    let tag = element_name(name);
    match value {
        Value::Object(map) => {
            output.push_str(&format!("{indent}<{tag}>\n"));
            for (key, child) in map {
                write_element(output, key, child, depth + 1);
            }
            output.push_str(&format!("{indent}</{tag}>\n"));
        }
        Value::Array(items) => {
            output.push_str(&format!("{indent}<{tag}>\n"));
            for item in items {
                write_element(output, "item", item, depth + 1);
            }
            output.push_str(&format!("{indent}</{tag}>\n"));
        }
        Value::Null => output.push_str(&format!("{indent}<{tag}/>\n")),
        scalar => {
            let text = xml_escape(&scalar_text(scalar));
            output.push_str(&format!("{indent}<{tag}>{text}</{tag}>\n"));
        }
    }
}

fn element_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' { ch } else { '_' })
        .collect();
    if !name.starts_with(|ch: char| ch.is_ascii_alphabetic() || ch == '_') {
        name.insert(0, '_');
    }
    name
}

fn xml_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{render, to_csv, to_xml, ExportFormat};
    use crate::domain::assessment::OwnerId;

    #[test]
    fn csv_flattens_records_and_quotes_cells() {
        let aggregate = json!({
            "consents": [{ "id": "c-1", "type": "ai_analysis", "purpose": "advice, tips" }],
            "profile": { "allergies": ["nuts", "soy"] }
        });

        let csv = to_csv(&aggregate);
        assert!(csv.starts_with("section,record,field,value\n"));
        assert!(csv.contains("consents,c-1,type,ai_analysis\n"));
        assert!(csv.contains("consents,c-1,purpose,\"advice, tips\"\n"));
        assert!(csv.contains("profile,,allergies,nuts; soy\n"));
    }

    #[test]
    fn xml_escapes_text_and_sanitizes_names() {
        let xml = to_xml(&json!({ "notes": "a < b & c", "2fa": true }));

        assert!(xml.contains("<notes>a &lt; b &amp; c</notes>"));
        assert!(xml.contains("<_2fa>true</_2fa>"));
        assert!(xml.trim_end().ends_with("</userData>"));
    }

    #[test]
    fn render_sets_content_type_and_file_name() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid date");
        let exported = render(&OwnerId("user/1".to_owned()), &json!({}), ExportFormat::Csv, now)
            .expect("render");

        assert_eq!(exported.content_type, "text/csv; charset=utf-8");
        assert_eq!(exported.file_name, "vitalia-data-user_1-20260301.csv");
        assert!(ExportFormat::parse("pdf").is_err());
    }
}
