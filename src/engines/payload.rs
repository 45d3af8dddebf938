//! Payload extraction from engine standard output.
//!
//! Engines print diagnostics interleaved with exactly one JSON object. The
//! object is located by scanning from the first `{` to the last `}`. A string
//! value containing an unbalanced brace defeats this scan; engines that need
//! that should move the payload to a side file.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("no opening brace in engine output")]
    MissingOpeningBrace,

    #[error("no closing brace after the opening brace")]
    MissingClosingBrace,

    #[error("payload is not valid JSON: {0}")]
    Invalid(#[from] serde_json::Error),
}

pub fn extract_payload(stdout: &str) -> Result<Value, PayloadError> {
    let start = stdout.find('{').ok_or(PayloadError::MissingOpeningBrace)?;
    let end = stdout
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or(PayloadError::MissingClosingBrace)?;
    Ok(serde_json::from_str(&stdout[start..=end])?)
}

/// Engines report handled failures as `{"status": "error", "message": ...}`
/// while still exiting zero.
pub fn reported_error(payload: &Value) -> Option<String> {
    let status = payload.get("status")?.as_str()?;
    if !status.eq_ignore_ascii_case("error") {
        return None;
    }
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("engine reported an error without a message");
    Some(message.to_string())
}
