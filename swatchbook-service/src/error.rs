use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Access denied: {} is outside the output directory", path.display())]
    AccessDenied { path: PathBuf },

    #[error("Document processing failed")]
    Processing(#[from] ProcessingError),

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Document processing errors
///
/// Only document-open and output-write failures escape an extraction run;
/// everything attributable to a single page or image is logged and recorded
/// in the validation ledger instead.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Failed to load PDFium library: {reason}")]
    PdfiumUnavailable { reason: String },

    #[error("Failed to open document {}: {reason}", path.display())]
    DocumentOpen { path: PathBuf, reason: String },

    #[error("Failed to read page {page}: {reason}")]
    PageRead { page: u32, reason: String },

    #[error("Failed to write {}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to build archive {}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("File too large: {size} bytes (max {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("IO error")]
    Io(#[source] std::io::Error),
}

impl ProcessingError {
    pub fn output_write(
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        ProcessingError::OutputWrite {
            path: path.into(),
            source: source.into(),
        }
    }
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::FileNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Processing(ProcessingError::DocumentOpen { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::Processing(ProcessingError::FileTooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::FileNotFound { .. } => "file_not_found",
            ServiceError::AccessDenied { .. } => "access_denied",
            ServiceError::Processing(ProcessingError::PdfiumUnavailable { .. }) => {
                "pdfium_unavailable"
            }
            ServiceError::Processing(ProcessingError::DocumentOpen { .. }) => "document_open_error",
            ServiceError::Processing(ProcessingError::PageRead { .. }) => "page_read_error",
            ServiceError::Processing(ProcessingError::OutputWrite { .. }) => "output_write_error",
            ServiceError::Processing(ProcessingError::Archive { .. }) => "archive_error",
            ServiceError::Processing(ProcessingError::FileTooLarge { .. }) => "file_too_large",
            ServiceError::Processing(ProcessingError::Io(_)) => "io_error",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }

    /// Message including the underlying cause chain.
    ///
    /// Fatal failures must carry enough detail to diagnose (file identity and
    /// cause), and the top-level `Display` only names the failing stage.
    pub fn detailed_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.detailed_message(), "Request failed");
        }

        let response = ErrorResponse {
            message: self.detailed_message(),
            code: Some(self.error_code().to_string()),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
