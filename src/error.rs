use thiserror::Error;

/// Input that cannot be turned into a valid record. Always surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("Invalid email address '{0}'")]
    InvalidEmail(String),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("Unknown appointment status '{0}'")]
    UnknownStatus(String),

    #[error("Unknown view '{0}', expected daily, weekly or monthly")]
    UnknownView(String),

    #[error("Unsupported language '{0}'")]
    UnknownLanguage(String),
}
