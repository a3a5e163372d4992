//! Error types for inbound event ingestion.
//!
//! Validation failures surface synchronously to the caller and are never
//! retried or swallowed; duplicate events are not errors (they short-circuit
//! to a handled outcome with zero handlers).

use thiserror::Error;

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is invalid: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    #[error("payload is not valid JSON: {0}")]
    MalformedPayload(String),

    #[error("signature required but not provided")]
    SignatureMissing,

    #[error("signature verification failed")]
    SignatureInvalid,
}
