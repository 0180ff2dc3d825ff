//! Diagnostic probe of the configured converter.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tracing::info;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::convert::ConverterVersionResponse;
use crate::schemas::ErrorBody;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(test_converter),
    components(schemas(ConverterVersionResponse, ErrorBody))
)]
pub struct ConverterApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/test-converter", get(test_converter))
}

/// Runs the converter with `--version` and reports what it printed.
#[utoipa::path(
    get,
    path = "/test-converter",
    tag = "converter",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Converter is runnable", body = ConverterVersionResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 500, description = "Converter could not be run", body = ErrorBody),
    )
)]
pub async fn test_converter(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConverterVersionResponse>, ServerError> {
    let output = state
        .converter
        .version()
        .await
        .map_err(ServerError::converter_check)?;

    info!(
        program = %state.converter.program(),
        elapsed_ms = output.elapsed.as_millis(),
        version = %output.stdout,
        "converter probe succeeded"
    );
    Ok(Json(ConverterVersionResponse {
        status: "OK".to_owned(),
        version: output.stdout,
        stderr: output.stderr,
    }))
}
