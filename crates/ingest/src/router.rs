//! Plumbing shared by the provider hubs: signature enforcement, JSON
//! decoding, and common field extraction.

use serde_json::Value;
use time::OffsetDateTime;

use hookrelay_shared::signature;

use crate::error::{IngestError, IngestResult};

/// Enforce an optional hub signing secret over the raw body.
///
/// When a secret is configured, a missing or mismatched `sha256=<hex>`
/// signature rejects the request before parsing or any handler runs.
pub(crate) fn enforce_signature(
    secret: Option<&str>,
    body: &[u8],
    provided: Option<&str>,
) -> IngestResult<()> {
    let Some(secret) = secret else {
        return Ok(());
    };

    let provided = provided.ok_or(IngestError::SignatureMissing)?;
    if !signature::verify(secret, body, provided) {
        return Err(IngestError::SignatureInvalid);
    }
    Ok(())
}

pub(crate) fn decode_body(body: &str) -> IngestResult<Value> {
    serde_json::from_str(body).map_err(|e| IngestError::MalformedPayload(e.to_string()))
}

/// Extract a required string field from the top level of a payload.
pub(crate) fn required_str(raw: &Value, field: &'static str) -> IngestResult<String> {
    match raw.get(field) {
        None | Some(Value::Null) => Err(IngestError::MissingField(field)),
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(other) => Err(IngestError::InvalidField {
            field,
            reason: format!("expected string, got {}", type_name(other)),
        }),
    }
}

/// Extract an optional string, accepting either of two spellings
/// (providers mix snake_case and camelCase).
pub(crate) fn optional_str_aliased(raw: &Value, a: &str, b: &str) -> Option<String> {
    raw.get(a)
        .or_else(|| raw.get(b))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Interpret a unix-seconds value (number or numeric string) as a
/// timestamp, falling back to now.
pub(crate) fn timestamp_or_now(value: Option<&Value>) -> OffsetDateTime {
    let seconds = match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    seconds
        .and_then(|s| OffsetDateTime::from_unix_timestamp(s).ok())
        .unwrap_or_else(OffsetDateTime::now_utc)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_enforcement_is_skipped_without_a_secret() {
        assert!(enforce_signature(None, b"body", None).is_ok());
    }

    #[test]
    fn signature_enforcement_rejects_missing_and_bad_signatures() {
        let body = b"{\"id\":\"evt_1\"}";
        let good = signature::sign_prefixed("k", body);

        assert!(matches!(
            enforce_signature(Some("k"), body, None),
            Err(IngestError::SignatureMissing)
        ));
        assert!(matches!(
            enforce_signature(Some("k"), body, Some("sha256=deadbeef")),
            Err(IngestError::SignatureInvalid)
        ));
        assert!(enforce_signature(Some("k"), body, Some(&good)).is_ok());
    }

    #[test]
    fn required_str_distinguishes_missing_from_wrong_type() {
        let raw = serde_json::json!({"type": 42});
        assert!(matches!(
            required_str(&raw, "id"),
            Err(IngestError::MissingField("id"))
        ));
        assert!(matches!(
            required_str(&raw, "type"),
            Err(IngestError::InvalidField { field: "type", .. })
        ));
    }

    #[test]
    fn timestamps_accept_numbers_and_numeric_strings() {
        let n = serde_json::json!(1700000000);
        let s = serde_json::json!("1700000000");
        assert_eq!(
            timestamp_or_now(Some(&n)).unix_timestamp(),
            1_700_000_000
        );
        assert_eq!(
            timestamp_or_now(Some(&s)).unix_timestamp(),
            1_700_000_000
        );
    }
}
