//! Locates and validates the converter's output for a job.

use bytes::Bytes;
use tracing::{info, warn};

use crate::error::ServerError;
use crate::services::format::TargetFormat;
use crate::services::job::ConversionJob;
use crate::services::scratch::ScratchDir;

/// Loads the job's expected output into memory and checks its signature.
/// The whole file is read at once; its size is bounded by the upload
/// ceiling in practice.
pub async fn resolve_output(
    job: &ConversionJob,
    scratch: &ScratchDir,
    target: &TargetFormat,
) -> Result<Bytes, ServerError> {
    let path = job.expected_output_path();

    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        let listing = scratch.related_entries(&job.stem()).await;
        return Err(ServerError::OutputMissing {
            expected: file_name(path),
            listing,
        });
    }

    let bytes = tokio::fs::read(path).await.map_err(|e| {
        ServerError::Internal(format!("failed to read converted file {}: {e}", path.display()))
    })?;

    if !target.matches_signature(&bytes) {
        let head = &bytes[..bytes.len().min(16)];
        warn!(job_id = %job.id(), size_bytes = bytes.len(), head = ?head, "converter output failed signature check");
        return Err(ServerError::InvalidOutput);
    }

    info!(job_id = %job.id(), size_bytes = bytes.len(), "converted output ready");
    Ok(Bytes::from(bytes))
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::services::format::PDF;

    #[tokio::test]
    async fn missing_output_lists_job_files() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path());
        let job = ConversionJob::new(&scratch, "docx", &PDF);
        std::fs::write(job.input_path(), b"PK\x03\x04").unwrap();
        std::fs::write(dir.path().join("unrelated.pdf"), b"%PDF-").unwrap();

        match resolve_output(&job, &scratch, &PDF).await {
            Err(ServerError::OutputMissing { expected, listing }) => {
                assert_eq!(expected, format!("{}.pdf", job.stem()));
                assert_eq!(listing, vec![format!("{}.docx", job.stem())]);
            }
            other => panic!("expected OutputMissing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn output_without_signature_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path());
        let job = ConversionJob::new(&scratch, "txt", &PDF);
        std::fs::write(job.expected_output_path(), b"<html>not a pdf</html>").unwrap();

        assert!(matches!(
            resolve_output(&job, &scratch, &PDF).await,
            Err(ServerError::InvalidOutput)
        ));
    }

    #[tokio::test]
    async fn valid_output_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path());
        let job = ConversionJob::new(&scratch, "txt", &PDF);
        std::fs::write(job.expected_output_path(), b"%PDF-1.7\n%%EOF\n").unwrap();

        let bytes = resolve_output(&job, &scratch, &PDF).await.unwrap();
        assert_eq!(&bytes[..], b"%PDF-1.7\n%%EOF\n");
    }
}
