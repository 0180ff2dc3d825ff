//! Document conversion endpoint.
//!
//! `POST /convert` runs one job end to end inside the request:
//!
//! 1. the upload is validated and written to scratch storage,
//! 2. the converter is run against it with a timeout,
//! 3. the expected PDF is located and its signature checked,
//! 4. the bytes are returned as an attachment.
//!
//! The job's scratch files are removed on every exit path. On failure that
//! happens before the error response is built; on success the cleanup guard
//! travels with the response body and fires once the body is finished.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use tracing::{info, info_span, warn, Instrument};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::convert::ConvertUpload;
use crate::schemas::ErrorBody;
use crate::services::format::PDF;
use crate::services::job::{ConversionJob, JobStatus};
use crate::services::resolver;
use crate::services::scratch::CleanupBody;
use crate::services::upload::{self, ReceivedUpload};
use crate::state::AppState;

/// Allowance for multipart boundaries and part headers on top of the file
/// ceiling.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(OpenApi)]
#[openapi(paths(convert), components(schemas(ConvertUpload, ErrorBody)))]
pub struct ConvertApi;

pub fn router(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new().route(
        "/convert",
        post(convert).layer(DefaultBodyLimit::max(
            max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
        )),
    )
}

/// Convert an office document to PDF (`POST /convert`).
///
/// Accepts `multipart/form-data` with a single `file` field. The response is
/// the converted PDF as an attachment named `converted.pdf`.
#[utoipa::path(
    post,
    path = "/convert",
    tag = "convert",
    security(("bearer" = [])),
    request_body(content = ConvertUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Converted PDF", content_type = "application/pdf", body = Vec<u8>),
        (status = 400, description = "Missing, unsupported or oversized upload", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 500, description = "Conversion failed or produced no valid PDF", body = ErrorBody),
    )
)]
pub async fn convert(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, ServerError> {
    let upload = upload::receive(&mut multipart, state.config.max_upload_bytes).await?;
    let job = ConversionJob::new(&state.scratch, upload.format.extension, &PDF);
    let span = info_span!("conversion_job", job_id = %job.id());

    run_job(&state, job, upload).instrument(span).await
}

async fn run_job(
    state: &AppState,
    mut job: ConversionJob,
    upload: ReceivedUpload,
) -> Result<Response, ServerError> {
    info!(
        original_name = ?upload.original_name,
        format = upload.format.extension,
        size_bytes = upload.bytes.len(),
        input = %job.input_path().display(),
        "conversion job accepted"
    );

    if let Err(e) = upload::persist(&upload, &job).await {
        return Err(fail(&mut job, e));
    }
    drop(upload);

    job.transition(JobStatus::Converting);
    if let Err(e) = state
        .converter
        .convert(job.input_path(), job.output_dir(), &PDF)
        .await
    {
        return Err(fail(&mut job, e));
    }

    let bytes = match resolver::resolve_output(&job, &state.scratch, &PDF).await {
        Ok(bytes) => bytes,
        Err(e) => return Err(fail(&mut job, e)),
    };
    job.transition(JobStatus::Succeeded);
    info!(size_bytes = bytes.len(), "conversion succeeded");

    let content_length = bytes.len();
    let body = Body::from_stream(CleanupBody::new(bytes, job.into_files()));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, PDF.mime)
        .header(header::CONTENT_LENGTH, content_length)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", PDF.attachment_name()),
        )
        .body(body)
        .map_err(|e| ServerError::Internal(format!("failed to build response: {e}")))
}

/// Marks the job failed; its scratch files go when the caller drops it.
fn fail<E>(job: &mut ConversionJob, e: E) -> ServerError
where
    E: Into<ServerError>,
{
    let stage = job.status();
    job.transition(JobStatus::Failed);
    let err = e.into();
    warn!(stage = %stage, error = %err, "conversion job failed");
    err
}
