use crate::models::FailureKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProcessingError>;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Date parsing error: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid station declaration: {0}")]
    FieldValidation(#[from] validator::ValidationErrors),

    #[error("Network error: {message}")]
    Network { message: String, retryable: bool },

    #[error("Authentication rejected by {service}: {message}")]
    Auth { service: String, message: String },

    #[error("Raw data format error in '{}': {message}", path.display())]
    Format { path: PathBuf, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Stage {stage} cannot run: {reason}")]
    Prerequisite { stage: String, reason: String },

    #[error("Processing cancelled by user")]
    Cancelled,

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl ProcessingError {
    pub fn network(message: impl Into<String>, retryable: bool) -> Self {
        ProcessingError::Network {
            message: message.into(),
            retryable,
        }
    }

    pub fn format(path: &Path, message: impl Into<String>) -> Self {
        ProcessingError::Format {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Only transient network failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProcessingError::Network {
                retryable: true,
                ..
            }
        )
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ProcessingError::Network { .. } => FailureKind::Network,
            ProcessingError::Auth { .. } => FailureKind::Auth,
            ProcessingError::Format { .. }
            | ProcessingError::Csv(_)
            | ProcessingError::Zip(_)
            | ProcessingError::DateParse(_) => FailureKind::Format,
            ProcessingError::Validation(_) => FailureKind::Validation,
            ProcessingError::Encoding(_) => FailureKind::Encoding,
            ProcessingError::Io(_) | ProcessingError::Json(_) => FailureKind::Io,
            ProcessingError::Settings(_)
            | ProcessingError::Config(_)
            | ProcessingError::FieldValidation(_)
            | ProcessingError::InvalidCoordinate(_) => FailureKind::Config,
            ProcessingError::Prerequisite { .. } => FailureKind::Prerequisite,
            ProcessingError::Cancelled | ProcessingError::TaskJoin(_) => FailureKind::Internal,
        }
    }
}

impl From<reqwest::Error> for ProcessingError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return classify_status(status.as_u16(), &err.to_string());
        }
        // Connection resets, DNS hiccups and timeouts clear up on their own
        let retryable = err.is_timeout() || err.is_connect() || err.is_request() || err.is_body();
        ProcessingError::network(err.to_string(), retryable)
    }
}

/// Map an HTTP status from the data service onto the error taxonomy.
pub fn classify_status(status: u16, message: &str) -> ProcessingError {
    match status {
        401 | 403 => ProcessingError::Auth {
            service: "data service".to_string(),
            message: format!("HTTP {}: {}", status, message),
        },
        408 | 425 | 429 | 500..=599 => {
            ProcessingError::network(format!("HTTP {}: {}", status, message), true)
        }
        _ => ProcessingError::network(format!("HTTP {}: {}", status, message), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(401, "bad key"),
            ProcessingError::Auth { .. }
        ));
        assert!(classify_status(503, "busy").is_retryable());
        assert!(classify_status(429, "slow down").is_retryable());
        assert!(!classify_status(404, "no such dataset").is_retryable());
        assert_eq!(classify_status(404, "gone").kind(), FailureKind::Network);
    }

    #[test]
    fn test_failure_kinds() {
        let err = ProcessingError::format(Path::new("raw/a.zip"), "missing column u10");
        assert_eq!(err.kind(), FailureKind::Format);
        assert!(err.to_string().contains("raw/a.zip"));
        assert_eq!(
            ProcessingError::Encoding("width".into()).kind(),
            FailureKind::Encoding
        );
        assert!(!ProcessingError::Validation("x".into()).is_retryable());
    }
}
