use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// `multipart/form-data` body accepted by `POST /convert`.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct ConvertUpload {
    /// The office document to convert (docx, xlsx, pptx, odt, ods, odp,
    /// doc, xls, ppt, rtf, txt or csv).
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// Result of probing the configured converter.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConverterVersionResponse {
    pub status: String,
    /// The converter's `--version` output.
    pub version: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub stderr: String,
}
