use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use vitalia_core::config::{AppConfig, LoadOptions};

use crate::commands::{exit, CommandResult};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::text(exit::CONFIG, format!("config validation failed: {error}"));
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let providers = &config.providers;
    let privacy = &config.privacy;
    let fields = [
        field("database.url", config.database.url.clone(), &["VITALIA_DATABASE_URL"]),
        field(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["VITALIA_DATABASE_MAX_CONNECTIONS"],
        ),
        field(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["VITALIA_DATABASE_TIMEOUT_SECS"],
        ),
        field("server.bind_address", config.server.bind_address.clone(), &["VITALIA_SERVER_BIND_ADDRESS"]),
        field("server.port", config.server.port.to_string(), &["VITALIA_SERVER_PORT"]),
        field(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["VITALIA_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        field("providers.primary", providers.primary.as_str().to_string(), &["VITALIA_PROVIDERS_PRIMARY"]),
        field(
            "providers.secondary",
            providers.secondary.map(|kind| kind.as_str()).unwrap_or("<unset>").to_string(),
            &["VITALIA_PROVIDERS_SECONDARY"],
        ),
        field(
            "providers.timeout_secs",
            providers.timeout_secs.to_string(),
            &["VITALIA_PROVIDERS_TIMEOUT_SECS"],
        ),
        field(
            "providers.remote.base_url",
            providers.remote.base_url.clone(),
            &["VITALIA_REMOTE_BASE_URL"],
        ),
        field("providers.remote.model", providers.remote.model.clone(), &["VITALIA_REMOTE_MODEL"]),
        field(
            "providers.remote.api_key",
            providers
                .remote
                .api_key
                .as_ref()
                .map(|key| redact_secret(key.expose_secret()))
                .unwrap_or_else(|| "<unset>".to_string()),
            &["VITALIA_REMOTE_API_KEY"],
        ),
        field("providers.local.base_url", providers.local.base_url.clone(), &["VITALIA_LOCAL_BASE_URL"]),
        field("providers.local.model", providers.local.model.clone(), &["VITALIA_LOCAL_MODEL"]),
        field(
            "privacy.data_minimization",
            privacy.data_minimization.to_string(),
            &["VITALIA_PRIVACY_DATA_MINIMIZATION"],
        ),
        field(
            "privacy.anonymization",
            privacy.anonymization.to_string(),
            &["VITALIA_PRIVACY_ANONYMIZATION"],
        ),
        field(
            "privacy.anonymization_level",
            privacy.anonymization_level.as_str().to_string(),
            &["VITALIA_PRIVACY_ANONYMIZATION_LEVEL"],
        ),
        field(
            "privacy.data_retention_days",
            privacy.data_retention_days.to_string(),
            &["VITALIA_PRIVACY_DATA_RETENTION_DAYS"],
        ),
        field(
            "privacy.fail_closed_anonymization",
            privacy.fail_closed_anonymization.to_string(),
            &["VITALIA_PRIVACY_FAIL_CLOSED_ANONYMIZATION"],
        ),
        field(
            "privacy.encryption_key",
            redact_secret(privacy.encryption_key.expose_secret()),
            &["VITALIA_PRIVACY_ENCRYPTION_KEY", "VITALIA_ENCRYPTION_KEY"],
        ),
        field(
            "assessment.total_questions",
            config.assessment.total_questions.to_string(),
            &["VITALIA_ASSESSMENT_TOTAL_QUESTIONS"],
        ),
        field(
            "assessment.minutes_per_question",
            config.assessment.minutes_per_question.to_string(),
            &["VITALIA_ASSESSMENT_MINUTES_PER_QUESTION"],
        ),
        field("logging.level", config.logging.level.clone(), &["VITALIA_LOGGING_LEVEL", "VITALIA_LOG_LEVEL"]),
        field(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["VITALIA_LOGGING_FORMAT", "VITALIA_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        fields
            .into_iter()
            .map(|(key, value, env_keys)| render_line(key, &value, source(key, env_keys))),
    );

    CommandResult::text(exit::OK, lines.join("\n"))
}

fn field(
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
) -> (&'static str, String, &'static [&'static str]) {
    (key, value, env_keys)
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("vitalia.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/vitalia.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        if prefix.len() <= 4 {
            return format!("{prefix}-***");
        }
    }

    "<redacted>".to_string()
}
