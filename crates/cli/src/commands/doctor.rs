use serde::Serialize;
use vitalia_agent::ProviderChain;
use vitalia_core::config::{AppConfig, LoadOptions, ProviderKind};
use vitalia_core::privacy::crypto::AesGcmCipher;
use vitalia_db::{connect_with_config, ping};

use crate::commands::{exit, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code =
        if report.overall_status == CheckStatus::Fail { exit::CHECK_FAILED } else { exit::OK };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult::text(exit_code, output)
}

const DEPENDENT_CHECKS: [&str; 3] = ["encryption_key", "database_connectivity", "provider_chain"];

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_encryption_key(&config));
            match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => {
                    checks.push(runtime.block_on(check_database_connectivity(&config)));
                    checks.push(runtime.block_on(check_provider_chain(&config)));
                }
                Err(error) => {
                    checks.push(DoctorCheck {
                        name: "async_runtime",
                        status: CheckStatus::Fail,
                        details: format!("failed to initialize async runtime: {error}"),
                    });
                }
            }
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.extend(DEPENDENT_CHECKS.into_iter().map(|name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = match (failed, warned) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready, running degraded"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_encryption_key(config: &AppConfig) -> DoctorCheck {
    match AesGcmCipher::from_secret(&config.privacy.encryption_key) {
        Ok(_) => DoctorCheck {
            name: "encryption_key",
            status: CheckStatus::Pass,
            details: "AES-256-GCM field cipher initialized".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "encryption_key",
            status: CheckStatus::Fail,
            details: format!("encryption key rejected: {error}"),
        },
    }
}

async fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let result = async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        let reachable = ping(&pool).await.map_err(|error| format!("database ping failed: {error}"));
        pool.close().await;
        reachable
    }
    .await;

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

/// A missing local model only degrades: the rule-based tier still answers.
async fn check_provider_chain(config: &AppConfig) -> DoctorCheck {
    let chain = match ProviderChain::from_config(&config.providers) {
        Ok(chain) => chain,
        Err(error) => {
            return DoctorCheck {
                name: "provider_chain",
                status: CheckStatus::Fail,
                details: format!("provider chain could not be built: {error}"),
            };
        }
    };
    let tiers =
        chain.kinds().iter().map(ProviderKind::as_str).collect::<Vec<_>>().join(" -> ");

    match chain.local_health().await {
        None => DoctorCheck {
            name: "provider_chain",
            status: CheckStatus::Pass,
            details: format!("tiers: {tiers}"),
        },
        Some(Ok(())) => DoctorCheck {
            name: "provider_chain",
            status: CheckStatus::Pass,
            details: format!(
                "tiers: {tiers}; local model server reachable at {}",
                config.providers.local.base_url
            ),
        },
        Some(Err(error)) => DoctorCheck {
            name: "provider_chain",
            status: CheckStatus::Warn,
            details: format!("tiers: {tiers}; local model server unavailable: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
