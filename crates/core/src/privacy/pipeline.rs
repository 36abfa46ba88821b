use serde_json::Value;
use tracing::warn;

use crate::errors::PrivacyError;
use crate::privacy::anonymize::{anonymize, anonymize_text};
use crate::privacy::minimize::minimize;
use crate::privacy::{OperationKind, PrivacyContext};

/// Minimizes then anonymizes a provider-bound payload.
///
/// When the context marks anonymization as required any failure is returned.
/// Otherwise the failing step is skipped with a warning and its input passes
/// through unchanged.
pub fn prepare_for_provider(
    payload: &Value,
    operation: OperationKind,
    context: &PrivacyContext,
) -> Result<Value, PrivacyError> {
    let minimized = if context.data_minimization_enabled {
        match minimize(payload, operation.category()) {
            Ok(minimized) => minimized,
            Err(error) => {
                fail_open_or_reject(context, operation, error)?;
                payload.clone()
            }
        }
    } else {
        payload.clone()
    };

    match anonymize(&minimized, context.effective_level()) {
        Ok(anonymized) => Ok(anonymized),
        Err(error) => {
            fail_open_or_reject(context, operation, error)?;
            Ok(minimized)
        }
    }
}

/// Text variant for answers and free-form questions.
pub fn prepare_text_for_provider(
    text: &str,
    operation: OperationKind,
    context: &PrivacyContext,
) -> Result<String, PrivacyError> {
    match anonymize_text(text, context.effective_level()) {
        Ok(scrubbed) => Ok(scrubbed),
        Err(error) => {
            fail_open_or_reject(context, operation, error)?;
            Ok(text.to_owned())
        }
    }
}

fn fail_open_or_reject(
    context: &PrivacyContext,
    operation: OperationKind,
    error: PrivacyError,
) -> Result<(), PrivacyError> {
    if context.anonymization_required() {
        return Err(error);
    }
    warn!(
        event_name = "privacy.pipeline_fail_open",
        correlation_id = %context.correlation_id,
        operation = operation.as_str(),
        error = %error,
        "privacy step failed; passing payload through"
    );
    Ok(())
}
