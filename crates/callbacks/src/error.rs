use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Signature header missing")]
    SignatureMissing,

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Invalid callback registration: {0}")]
    InvalidCallback(String),

    #[error("Malformed callback payload: {0}")]
    Payload(String),

    #[error("Callback store error: {0}")]
    Store(String),
}

pub type CallbackResult<T> = Result<T, CallbackError>;
