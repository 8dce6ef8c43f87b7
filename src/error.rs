use thiserror::Error;

/// Message shown to the user for every failed verification.
pub const VERIFICATION_FAILED_MESSAGE: &str =
    "Invalid session. Please check your account or contact support.";

/// Failure raised by a backend collaborator.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),
    #[error("{0}")]
    Message(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("no checkout session id in the redirect")]
    MissingSessionId,
    #[error("payments are disabled")]
    PaymentsDisabled,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("checkout session resolved to `{status}`")]
    UnpaidSession { status: String },
    #[error("{service} request failed: {message}")]
    Request {
        service: &'static str,
        message: String,
    },
}

impl VerificationError {
    pub fn request(service: &'static str, err: &ServiceError) -> Self {
        VerificationError::Request {
            service,
            message: err.to_string(),
        }
    }
}

/// Terminal failure of a reconciliation run. Never retried, never redirected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationFailure {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("verification error: {0}")]
    Verification(#[from] VerificationError),
}

impl VerificationFailure {
    pub fn user_message(&self) -> &'static str {
        VERIFICATION_FAILED_MESSAGE
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
