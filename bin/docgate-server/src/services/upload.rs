//! Multipart upload intake.
//!
//! Exactly one file is accepted under [`FILE_FIELD`]. The format is decided
//! from the client's file name (or declared type when the name has no
//! extension) and then confirmed by inspecting the bytes. Nothing from the
//! client's file name is ever used to build a path.

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use tracing::debug;

use crate::error::ServerError;
use crate::services::format::{self, InputFormat};
use crate::services::job::ConversionJob;

/// Multipart field carrying the document.
pub const FILE_FIELD: &str = "file";

/// A validated upload, held in memory until it is persisted.
#[derive(Debug)]
pub struct ReceivedUpload {
    pub original_name: Option<String>,
    pub declared_type: Option<String>,
    pub format: &'static InputFormat,
    pub bytes: Vec<u8>,
}

/// Reads and validates the single `file` field of `multipart`.
pub async fn receive(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> Result<ReceivedUpload, ServerError> {
    let mut upload: Option<ReceivedUpload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        if name != FILE_FIELD {
            return Err(ServerError::BadRequest(format!(
                "Unexpected field '{name}'; only '{FILE_FIELD}' is accepted"
            )));
        }
        if upload.is_some() {
            return Err(ServerError::BadRequest(
                "Only one file may be uploaded per request".into(),
            ));
        }
        upload = Some(read_file_field(field, max_bytes).await?);
    }

    let upload = upload.ok_or(ServerError::NoFileUploaded)?;
    if upload.bytes.is_empty() {
        return Err(ServerError::NoFileUploaded);
    }

    format::verify_content(upload.format, &upload.bytes).map_err(ServerError::InvalidFileType)?;

    debug!(
        original_name = ?upload.original_name,
        declared_type = ?upload.declared_type,
        format = upload.format.extension,
        size_bytes = upload.bytes.len(),
        "received file upload"
    );
    Ok(upload)
}

async fn read_file_field(
    mut field: Field<'_>,
    max_bytes: usize,
) -> Result<ReceivedUpload, ServerError> {
    let original_name = field.file_name().map(str::to_owned);
    let declared_type = field.content_type().map(str::to_owned);
    let format = resolve_format(original_name.as_deref(), declared_type.as_deref())?;

    let mut bytes = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(ServerError::FileTooLarge { limit: max_bytes });
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(ReceivedUpload {
        original_name,
        declared_type,
        format,
        bytes,
    })
}

/// Picks the allow-listed format for an upload from its file name, falling
/// back to the declared content type when the name carries no extension.
pub fn resolve_format(
    file_name: Option<&str>,
    declared_type: Option<&str>,
) -> Result<&'static InputFormat, ServerError> {
    let extension = file_name.and_then(format::extension_of);
    let found = match &extension {
        Some(ext) => format::by_extension(ext),
        None => declared_type.and_then(format::by_mime),
    };
    found.ok_or_else(|| {
        let what = match (&extension, declared_type) {
            (Some(ext), _) => format!(".{ext} files are not supported"),
            (None, Some(mime)) => format!("{mime} is not supported"),
            (None, None) => "the upload has no file extension or content type".to_owned(),
        };
        ServerError::InvalidFileType(format!(
            "{what}; allowed extensions: {}",
            format::allowed_extensions()
        ))
    })
}

/// Writes the upload to the job's input path. The job already tracks the
/// path for cleanup, so a failed write leaves nothing behind.
pub async fn persist(upload: &ReceivedUpload, job: &ConversionJob) -> Result<(), ServerError> {
    tokio::fs::write(job.input_path(), &upload.bytes)
        .await
        .map_err(|e| {
            ServerError::Internal(format!(
                "failed to write upload to {}: {e}",
                job.input_path().display()
            ))
        })
}

fn multipart_error(e: MultipartError, max_bytes: usize) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::FileTooLarge { limit: max_bytes }
    } else {
        ServerError::BadRequest(format!("Failed to read multipart body: {}", e.body_text()))
    }
}
