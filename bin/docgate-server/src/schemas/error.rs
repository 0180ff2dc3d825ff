use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// JSON body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub error: String,
    /// Additional diagnostic context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Captured converter standard output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    /// Captured converter standard error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl ErrorBody {
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            stdout: None,
            stderr: None,
        }
    }
}
