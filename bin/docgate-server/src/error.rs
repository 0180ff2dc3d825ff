//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a JSON-body HTTP response with an appropriate status code.
//!
//! Conversion failures carry the converter's captured output so callers can
//! diagnose a rejected document. Unclassified internal errors are logged with
//! full detail but only a generic message is returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};

use crate::schemas::ErrorBody;
use crate::services::converter::ConvertError;

/// All errors that can occur in the docgate request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Missing or mismatched bearer credential.
    #[error("Unauthorized")]
    Unauthorized,

    /// The multipart body had no `file` field, or it was empty.
    #[error("No file uploaded")]
    NoFileUploaded,

    /// The upload is not an allow-listed document.
    #[error("Invalid file type: {0}")]
    InvalidFileType(String),

    /// The upload exceeded the configured ceiling.
    #[error("File too large: maximum upload size is {}", size_label(.limit))]
    FileTooLarge { limit: usize },

    /// The caller sent an invalid or malformed request.
    #[error("{0}")]
    BadRequest(String),

    /// The converter could not be run, timed out, or exited non-zero.
    #[error("Conversion failed: {message}")]
    ConversionFailed {
        message: String,
        stdout: String,
        stderr: String,
    },

    /// The diagnostic converter probe failed.
    #[error("Converter test failed")]
    ConverterCheckFailed {
        message: String,
        stdout: String,
        stderr: String,
    },

    /// The converter exited successfully but the expected file is absent.
    #[error("PDF file was not created")]
    OutputMissing {
        expected: String,
        listing: Vec<String>,
    },

    /// The output exists but does not carry the target format's signature.
    #[error("Converted file is not a valid PDF")]
    InvalidOutput,

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::NoFileUploaded
            | ServerError::InvalidFileType(_)
            | ServerError::FileTooLarge { .. }
            | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::ConversionFailed { .. }
            | ServerError::ConverterCheckFailed { .. }
            | ServerError::OutputMissing { .. }
            | ServerError::InvalidOutput
            | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Reframes a converter error as a failed diagnostic probe.
    pub fn converter_check(e: ConvertError) -> Self {
        let message = e.to_string();
        let (stdout, stderr) = match e {
            ConvertError::Failed { stdout, stderr, .. } => (stdout, stderr),
            _ => Default::default(),
        };
        ServerError::ConverterCheckFailed {
            message,
            stdout,
            stderr,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ServerError::ConversionFailed { stdout, stderr, .. } => {
                warn!(error = %self, stderr = %stderr, "conversion failed");
                ErrorBody {
                    error: self.to_string(),
                    details: Some(
                        "The converter could not process the uploaded document".to_owned(),
                    ),
                    stdout: Some(stdout.clone()),
                    stderr: Some(stderr.clone()),
                }
            }
            ServerError::ConverterCheckFailed {
                message,
                stdout,
                stderr,
            } => {
                warn!(error = %message, "converter probe failed");
                ErrorBody {
                    error: self.to_string(),
                    details: Some(message.clone()),
                    stdout: Some(stdout.clone()),
                    stderr: Some(stderr.clone()),
                }
            }
            ServerError::OutputMissing { expected, listing } => {
                warn!(expected = %expected, found = ?listing, "converter produced no output");
                let found = if listing.is_empty() {
                    "nothing".to_owned()
                } else {
                    listing.join(", ")
                };
                ErrorBody {
                    details: Some(format!("expected {expected}; found {found}")),
                    ..ErrorBody::message(self.to_string())
                }
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                ErrorBody::message("internal server error")
            }
            _ => ErrorBody::message(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ConvertError> for ServerError {
    fn from(e: ConvertError) -> Self {
        let summary = e.to_string();
        match e {
            ConvertError::Failed { stdout, stderr, .. } => ServerError::ConversionFailed {
                message: first_line(&stderr).unwrap_or(summary),
                stdout,
                stderr,
            },
            _ => ServerError::ConversionFailed {
                message: summary,
                stdout: String::new(),
                stderr: String::new(),
            },
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Internal(e.to_string())
    }
}

fn size_label(bytes: &usize) -> String {
    const MIB: usize = 1024 * 1024;
    if *bytes >= MIB && bytes % MIB == 0 {
        format!("{} MiB", bytes / MIB)
    } else {
        format!("{bytes} bytes")
    }
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_owned)
}
