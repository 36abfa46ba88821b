use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::privacy::AnonymizationLevel;

const MIN_ENCRYPTION_KEY_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub providers: ProvidersConfig,
    pub privacy: PrivacyConfig,
    pub assessment: AssessmentConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug)]
pub struct ProvidersConfig {
    pub primary: ProviderKind,
    pub secondary: Option<ProviderKind>,
    pub timeout_secs: u64,
    pub remote: RemoteProviderConfig,
    pub local: LocalProviderConfig,
    pub sampling: SamplingConfig,
}

#[derive(Clone, Debug)]
pub struct RemoteProviderConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
}

#[derive(Clone, Debug)]
pub struct LocalProviderConfig {
    pub base_url: String,
    pub model: String,
}

/// Generation parameters shared by every network provider.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingConfig {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub top_k: u32,
    pub repeat_penalty: f64,
}

#[derive(Clone, Debug)]
pub struct PrivacyConfig {
    pub data_minimization: bool,
    pub anonymization: bool,
    pub anonymization_level: AnonymizationLevel,
    pub data_retention_days: u32,
    pub gdpr: bool,
    pub lopdgdd: bool,
    pub fail_closed_anonymization: bool,
    pub encryption_key: SecretString,
}

#[derive(Clone, Debug)]
pub struct AssessmentConfig {
    pub total_questions: u32,
    pub minutes_per_question: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Remote,
    Local,
    RuleBased,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub provider_primary: Option<ProviderKind>,
    pub provider_secondary: Option<ProviderKind>,
    pub local_base_url: Option<String>,
    pub remote_api_key: Option<String>,
    pub encryption_key: Option<String>,
    pub total_questions: Option<u32>,
    pub anonymization_level: Option<AnonymizationLevel>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://vitalia.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            providers: ProvidersConfig {
                primary: ProviderKind::Local,
                secondary: None,
                timeout_secs: 30,
                remote: RemoteProviderConfig {
                    base_url: "https://api.openai.com".to_string(),
                    api_key: None,
                    model: "gpt-4o-mini".to_string(),
                },
                local: LocalProviderConfig {
                    base_url: "http://localhost:11434".to_string(),
                    model: "llama3.1".to_string(),
                },
                sampling: SamplingConfig::default(),
            },
            privacy: PrivacyConfig {
                data_minimization: true,
                anonymization: true,
                anonymization_level: AnonymizationLevel::Medium,
                data_retention_days: 730,
                gdpr: true,
                lopdgdd: true,
                fail_closed_anonymization: true,
                encryption_key: String::new().into(),
            },
            assessment: AssessmentConfig { total_questions: 15, minutes_per_question: 2 },
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { temperature: 0.7, max_tokens: 512, top_p: 0.9, top_k: 40, repeat_penalty: 1.1 }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
            Self::RuleBased => "rule_based",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "remote" | "openai" => Ok(Self::Remote),
            "local" | "ollama" => Ok(Self::Local),
            "rule_based" | "rules" => Ok(Self::RuleBased),
            other => Err(ConfigError::Validation(format!(
                "unsupported provider `{other}` (expected remote|local|rule_based)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("vitalia.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Ordered network tiers; the rule-based responder is appended by the chain.
    pub fn provider_tiers(&self) -> Vec<ProviderKind> {
        let mut tiers = vec![self.providers.primary];
        if let Some(secondary) = self.providers.secondary {
            if secondary != self.providers.primary {
                tiers.push(secondary);
            }
        }
        tiers
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(providers) = patch.providers {
            if let Some(primary) = providers.primary {
                self.providers.primary = primary;
            }
            if let Some(secondary) = providers.secondary {
                self.providers.secondary = parse_secondary(&secondary).ok().flatten();
            }
            if let Some(timeout_secs) = providers.timeout_secs {
                self.providers.timeout_secs = timeout_secs;
            }
            if let Some(remote) = providers.remote {
                if let Some(base_url) = remote.base_url {
                    self.providers.remote.base_url = base_url;
                }
                if let Some(remote_api_key_value) = remote.api_key {
                    self.providers.remote.api_key = Some(secret_value(remote_api_key_value));
                }
                if let Some(model) = remote.model {
                    self.providers.remote.model = model;
                }
            }
            if let Some(local) = providers.local {
                if let Some(base_url) = local.base_url {
                    self.providers.local.base_url = base_url;
                }
                if let Some(model) = local.model {
                    self.providers.local.model = model;
                }
            }
            if let Some(sampling) = providers.sampling {
                let target = &mut self.providers.sampling;
                if let Some(temperature) = sampling.temperature {
                    target.temperature = temperature;
                }
                if let Some(max_tokens) = sampling.max_tokens {
                    target.max_tokens = max_tokens;
                }
                if let Some(top_p) = sampling.top_p {
                    target.top_p = top_p;
                }
                if let Some(top_k) = sampling.top_k {
                    target.top_k = top_k;
                }
                if let Some(repeat_penalty) = sampling.repeat_penalty {
                    target.repeat_penalty = repeat_penalty;
                }
            }
        }

        if let Some(privacy) = patch.privacy {
            if let Some(data_minimization) = privacy.data_minimization {
                self.privacy.data_minimization = data_minimization;
            }
            if let Some(anonymization) = privacy.anonymization {
                self.privacy.anonymization = anonymization;
            }
            if let Some(level) = privacy.anonymization_level {
                self.privacy.anonymization_level = level;
            }
            if let Some(days) = privacy.data_retention_days {
                self.privacy.data_retention_days = days;
            }
            if let Some(gdpr) = privacy.gdpr {
                self.privacy.gdpr = gdpr;
            }
            if let Some(lopdgdd) = privacy.lopdgdd {
                self.privacy.lopdgdd = lopdgdd;
            }
            if let Some(fail_closed) = privacy.fail_closed_anonymization {
                self.privacy.fail_closed_anonymization = fail_closed;
            }
            if let Some(encryption_key_value) = privacy.encryption_key {
                self.privacy.encryption_key = secret_value(encryption_key_value);
            }
        }

        if let Some(assessment) = patch.assessment {
            if let Some(total_questions) = assessment.total_questions {
                self.assessment.total_questions = total_questions;
            }
            if let Some(minutes) = assessment.minutes_per_question {
                self.assessment.minutes_per_question = minutes;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("VITALIA_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("VITALIA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("VITALIA_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("VITALIA_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("VITALIA_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("VITALIA_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("VITALIA_SERVER_PORT") {
            self.server.port = parse_u16("VITALIA_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("VITALIA_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("VITALIA_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("VITALIA_PROVIDERS_PRIMARY") {
            self.providers.primary = value.parse()?;
        }
        if let Some(value) = read_env("VITALIA_PROVIDERS_SECONDARY") {
            self.providers.secondary = parse_secondary(&value)?;
        }
        if let Some(value) = read_env("VITALIA_PROVIDERS_TIMEOUT_SECS") {
            self.providers.timeout_secs = parse_u64("VITALIA_PROVIDERS_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("VITALIA_REMOTE_BASE_URL") {
            self.providers.remote.base_url = value;
        }
        if let Some(value) = read_env("VITALIA_REMOTE_API_KEY") {
            self.providers.remote.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("VITALIA_REMOTE_MODEL") {
            self.providers.remote.model = value;
        }
        if let Some(value) = read_env("VITALIA_LOCAL_BASE_URL") {
            self.providers.local.base_url = value;
        }
        if let Some(value) = read_env("VITALIA_LOCAL_MODEL") {
            self.providers.local.model = value;
        }
        if let Some(value) = read_env("VITALIA_SAMPLING_TEMPERATURE") {
            self.providers.sampling.temperature = parse_f64("VITALIA_SAMPLING_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("VITALIA_SAMPLING_MAX_TOKENS") {
            self.providers.sampling.max_tokens = parse_u32("VITALIA_SAMPLING_MAX_TOKENS", &value)?;
        }

        if let Some(value) = read_env("VITALIA_PRIVACY_DATA_MINIMIZATION") {
            self.privacy.data_minimization =
                parse_bool("VITALIA_PRIVACY_DATA_MINIMIZATION", &value)?;
        }
        if let Some(value) = read_env("VITALIA_PRIVACY_ANONYMIZATION") {
            self.privacy.anonymization = parse_bool("VITALIA_PRIVACY_ANONYMIZATION", &value)?;
        }
        if let Some(value) = read_env("VITALIA_PRIVACY_ANONYMIZATION_LEVEL") {
            self.privacy.anonymization_level = value.parse().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "VITALIA_PRIVACY_ANONYMIZATION_LEVEL".to_string(),
                    value: value.clone(),
                }
            })?;
        }
        if let Some(value) = read_env("VITALIA_PRIVACY_DATA_RETENTION_DAYS") {
            self.privacy.data_retention_days =
                parse_u32("VITALIA_PRIVACY_DATA_RETENTION_DAYS", &value)?;
        }
        if let Some(value) = read_env("VITALIA_PRIVACY_FAIL_CLOSED_ANONYMIZATION") {
            self.privacy.fail_closed_anonymization =
                parse_bool("VITALIA_PRIVACY_FAIL_CLOSED_ANONYMIZATION", &value)?;
        }
        let encryption_key = read_env("VITALIA_PRIVACY_ENCRYPTION_KEY")
            .or_else(|| read_env("VITALIA_ENCRYPTION_KEY"));
        if let Some(value) = encryption_key {
            self.privacy.encryption_key = secret_value(value);
        }

        if let Some(value) = read_env("VITALIA_ASSESSMENT_TOTAL_QUESTIONS") {
            self.assessment.total_questions =
                parse_u32("VITALIA_ASSESSMENT_TOTAL_QUESTIONS", &value)?;
        }
        if let Some(value) = read_env("VITALIA_ASSESSMENT_MINUTES_PER_QUESTION") {
            self.assessment.minutes_per_question =
                parse_u32("VITALIA_ASSESSMENT_MINUTES_PER_QUESTION", &value)?;
        }

        let log_level =
            read_env("VITALIA_LOGGING_LEVEL").or_else(|| read_env("VITALIA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("VITALIA_LOGGING_FORMAT").or_else(|| read_env("VITALIA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(primary) = overrides.provider_primary {
            self.providers.primary = primary;
        }
        if let Some(secondary) = overrides.provider_secondary {
            self.providers.secondary = Some(secondary);
        }
        if let Some(base_url) = overrides.local_base_url {
            self.providers.local.base_url = base_url;
        }
        if let Some(remote_api_key) = overrides.remote_api_key {
            self.providers.remote.api_key = Some(secret_value(remote_api_key));
        }
        if let Some(encryption_key) = overrides.encryption_key {
            self.privacy.encryption_key = secret_value(encryption_key);
        }
        if let Some(total_questions) = overrides.total_questions {
            self.assessment.total_questions = total_questions;
        }
        if let Some(level) = overrides.anonymization_level {
            self.privacy.anonymization_level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_providers(&self.providers)?;
        validate_privacy(&self.privacy)?;
        validate_assessment(&self.assessment)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn parse_secondary(value: &str) -> Result<Option<ProviderKind>, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "none" => Ok(None),
        other => other.parse().map(Some),
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("vitalia.toml"), PathBuf::from("config/vitalia.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_providers(providers: &ProvidersConfig) -> Result<(), ConfigError> {
    if providers.timeout_secs == 0 || providers.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "providers.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let tiers = std::iter::once(providers.primary).chain(providers.secondary);
    for tier in tiers {
        match tier {
            ProviderKind::Remote => {
                let missing = providers
                    .remote
                    .api_key
                    .as_ref()
                    .map(|value| value.expose_secret().trim().is_empty())
                    .unwrap_or(true);
                if missing {
                    return Err(ConfigError::Validation(
                        "providers.remote.api_key is required when the remote provider is enabled (set VITALIA_REMOTE_API_KEY)"
                            .to_string(),
                    ));
                }
                validate_http_url("providers.remote.base_url", &providers.remote.base_url)?;
            }
            ProviderKind::Local => {
                validate_http_url("providers.local.base_url", &providers.local.base_url)?;
            }
            ProviderKind::RuleBased => {}
        }
    }

    let sampling = &providers.sampling;
    if !(0.0..=2.0).contains(&sampling.temperature) {
        return Err(ConfigError::Validation(
            "providers.sampling.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }
    if sampling.top_p <= 0.0 || sampling.top_p > 1.0 {
        return Err(ConfigError::Validation(
            "providers.sampling.top_p must be in range (0.0, 1.0]".to_string(),
        ));
    }
    if sampling.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "providers.sampling.max_tokens must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{key} is required")));
    }
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn validate_privacy(privacy: &PrivacyConfig) -> Result<(), ConfigError> {
    let key = privacy.encryption_key.expose_secret();
    if key.trim().is_empty() {
        return Err(ConfigError::Validation(
            "privacy.encryption_key is required (set VITALIA_ENCRYPTION_KEY to a random string of at least 32 characters)"
                .to_string(),
        ));
    }
    if key.chars().count() < MIN_ENCRYPTION_KEY_LEN {
        return Err(ConfigError::Validation(format!(
            "privacy.encryption_key must be at least {MIN_ENCRYPTION_KEY_LEN} characters"
        )));
    }

    if privacy.data_retention_days == 0 {
        return Err(ConfigError::Validation(
            "privacy.data_retention_days must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_assessment(assessment: &AssessmentConfig) -> Result<(), ConfigError> {
    if !(1..=50).contains(&assessment.total_questions) {
        return Err(ConfigError::Validation(
            "assessment.total_questions must be in range 1..=50".to_string(),
        ));
    }
    if assessment.minutes_per_question == 0 {
        return Err(ConfigError::Validation(
            "assessment.minutes_per_question must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    providers: Option<ProvidersPatch>,
    privacy: Option<PrivacyPatch>,
    assessment: Option<AssessmentPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct ProvidersPatch {
    primary: Option<ProviderKind>,
    secondary: Option<String>,
    timeout_secs: Option<u64>,
    remote: Option<RemotePatch>,
    local: Option<LocalPatch>,
    sampling: Option<SamplingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct RemotePatch {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LocalPatch {
    base_url: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SamplingPatch {
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    top_p: Option<f64>,
    top_k: Option<u32>,
    repeat_penalty: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct PrivacyPatch {
    data_minimization: Option<bool>,
    anonymization: Option<bool>,
    anonymization_level: Option<AnonymizationLevel>,
    data_retention_days: Option<u32>,
    gdpr: Option<bool>,
    lopdgdd: Option<bool>,
    fail_closed_anonymization: Option<bool>,
    encryption_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AssessmentPatch {
    total_questions: Option<u32>,
    minutes_per_question: Option<u32>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, ProviderKind};
    use crate::privacy::AnonymizationLevel;

    const TEST_KEY: &str = "test-encryption-key-with-32-chars!!";

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_VITALIA_KEY", TEST_KEY);
        env::set_var("TEST_VITALIA_REMOTE_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("vitalia.toml");
            fs::write(
                &path,
                r#"
[providers]
primary = "remote"
secondary = "local"

[providers.remote]
api_key = "${TEST_VITALIA_REMOTE_KEY}"

[privacy]
encryption_key = "${TEST_VITALIA_KEY}"
anonymization_level = "high"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.privacy.encryption_key.expose_secret() == TEST_KEY,
                "encryption key should be loaded from environment",
            )?;
            ensure(
                config.providers.remote.api_key.as_ref().map(|key| key.expose_secret())
                    == Some("sk-from-env"),
                "remote api key should be loaded from environment",
            )?;
            ensure(
                config.provider_tiers() == vec![ProviderKind::Remote, ProviderKind::Local],
                "provider tiers should follow primary then secondary",
            )?;
            ensure(
                config.privacy.anonymization_level == AnonymizationLevel::High,
                "anonymization level should come from the file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_VITALIA_KEY", "TEST_VITALIA_REMOTE_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VITALIA_ENCRYPTION_KEY", TEST_KEY);
        env::set_var("VITALIA_LOG_LEVEL", "warn");
        env::set_var("VITALIA_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["VITALIA_ENCRYPTION_KEY", "VITALIA_LOG_LEVEL", "VITALIA_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VITALIA_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("VITALIA_ASSESSMENT_TOTAL_QUESTIONS", "10");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("vitalia.toml");
            fs::write(
                &path,
                format!(
                    r#"
[database]
url = "sqlite://from-file.db"

[assessment]
total_questions = 8
minutes_per_question = 3

[privacy]
encryption_key = "{TEST_KEY}"

[logging]
level = "warn"
"#
                ),
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.assessment.total_questions == 10,
                "env total questions should win over file",
            )?;
            ensure(
                config.assessment.minutes_per_question == 3,
                "file minutes per question should win over defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["VITALIA_DATABASE_URL", "VITALIA_ASSESSMENT_TOTAL_QUESTIONS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VITALIA_ENCRYPTION_KEY", "too-short");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("privacy.encryption_key")
            );
            ensure(has_message, "validation failure should mention privacy.encryption_key")
        })();

        clear_vars(&["VITALIA_ENCRYPTION_KEY"]);
        result
    }

    #[test]
    fn remote_primary_requires_api_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                provider_primary: Some(ProviderKind::Remote),
                encryption_key: Some(TEST_KEY.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        ensure(
            matches!(
                result,
                Err(ConfigError::Validation(ref message)) if message.contains("providers.remote.api_key")
            ),
            "remote provider without api key should be rejected",
        )
    }

    #[test]
    fn total_questions_outside_range_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                total_questions: Some(51),
                encryption_key: Some(TEST_KEY.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        ensure(
            matches!(
                result,
                Err(ConfigError::Validation(ref message)) if message.contains("1..=50")
            ),
            "51 questions should be rejected",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VITALIA_ENCRYPTION_KEY", TEST_KEY);
        env::set_var("VITALIA_REMOTE_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains(TEST_KEY), "debug output should not contain encryption key")?;
            ensure(
                !debug.contains("sk-secret-value"),
                "debug output should not contain remote api key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(config.provider_tiers() == vec![ProviderKind::Local], "local is the default")?;
            Ok(())
        })();

        clear_vars(&["VITALIA_ENCRYPTION_KEY", "VITALIA_REMOTE_API_KEY"]);
        result
    }
}
