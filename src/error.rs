use thiserror::Error;

use crate::schedule::ReportWindow;
use crate::types::Metrics;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The source answered but refused or failed the request.
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Malformed data: {0}")]
    MalformedData(String),

    #[error("Notification error: {0}")]
    Notify(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failure classes surfaced to the orchestration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SourceUnavailable,
    MalformedData,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::SourceUnavailable => "source_unavailable",
            ErrorKind::MalformedData => "malformed_data",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Http(_) | AppError::Upstream(_) => ErrorKind::SourceUnavailable,
            AppError::Json(_) | AppError::MalformedData(_) => ErrorKind::MalformedData,
            AppError::Io(_) | AppError::Config(_) | AppError::Notify(_) => ErrorKind::Internal,
        }
    }
}

/// A fatal run error plus whatever was computed before it happened.
#[derive(Debug)]
pub struct RunFailure {
    pub error: AppError,
    pub window: Option<ReportWindow>,
    pub partial: Metrics,
    pub missing_symbols: Vec<String>,
}

impl RunFailure {
    pub fn new(error: AppError) -> Self {
        Self {
            error,
            window: None,
            partial: Metrics::default(),
            missing_symbols: Vec::new(),
        }
    }
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.error, self.error.kind())
    }
}
