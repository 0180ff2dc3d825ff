//! The per-request conversion job and its state machine.

use std::path::{Path, PathBuf};

use strum::{AsRefStr, Display};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::format::TargetFormat;
use crate::services::scratch::{ScratchDir, ScratchFiles};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Converting,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    fn can_become(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Converting) => true,
            (JobStatus::Converting, JobStatus::Succeeded) => true,
            (from, JobStatus::Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Replaces the last extension of `input` with `extension`, keeping the
/// directory. This mirrors how the converter names its output.
pub fn derive_output_path(input: &Path, extension: &str) -> PathBuf {
    input.with_extension(extension)
}

/// One request's document conversion. Dropping the job releases its scratch
/// files unless they were handed off with [`ConversionJob::into_files`].
#[derive(Debug)]
pub struct ConversionJob {
    id: Uuid,
    input_path: PathBuf,
    output_dir: PathBuf,
    expected_output_path: PathBuf,
    status: JobStatus,
    files: ScratchFiles,
}

impl ConversionJob {
    /// Allocates paths for a new job in `scratch`. Both the input and the
    /// expected output are registered for cleanup up front.
    pub fn new(scratch: &ScratchDir, input_extension: &str, target: &TargetFormat) -> Self {
        let id = Uuid::new_v4();
        let input_path = scratch.input_path(id, input_extension);
        let output_dir = input_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| scratch.root().to_path_buf());
        let expected_output_path = derive_output_path(&input_path, target.extension);

        let mut files = ScratchFiles::new(id);
        files.track(&input_path);
        files.track(&expected_output_path);

        Self {
            id,
            input_path,
            output_dir,
            expected_output_path,
            status: JobStatus::Pending,
            files,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn expected_output_path(&self) -> &Path {
        &self.expected_output_path
    }

    /// File stem shared by the job's input and output.
    pub fn stem(&self) -> String {
        self.input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Moves the job to `next`. Illegal transitions are logged and ignored;
    /// the return value says whether the move happened.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_become(next) {
            warn!(job_id = %self.id, from = %self.status, to = %next, "ignoring illegal job transition");
            return false;
        }
        debug!(job_id = %self.id, from = %self.status, to = %next, "job transition");
        self.status = next;
        true
    }

    /// Hands the cleanup guard to the caller, typically the response body.
    pub fn into_files(self) -> ScratchFiles {
        self.files
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::services::format::PDF;

    #[test]
    fn output_path_replaces_last_extension_only() {
        assert_eq!(
            derive_output_path(Path::new("/s/docgate-1.docx"), "pdf"),
            PathBuf::from("/s/docgate-1.pdf")
        );
        assert_eq!(
            derive_output_path(Path::new("/s/archive.tar.odt"), "pdf"),
            PathBuf::from("/s/archive.tar.pdf")
        );
        assert_eq!(
            derive_output_path(Path::new("relative/noext"), "pdf"),
            PathBuf::from("relative/noext.pdf")
        );
    }

    #[test]
    fn new_job_derives_paths_from_scratch() {
        let scratch = ScratchDir::new("/scratch");
        let job = ConversionJob::new(&scratch, "odt", &PDF);

        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.output_dir(), Path::new("/scratch"));
        assert_eq!(job.stem(), format!("docgate-{}", job.id()));
        assert_eq!(job.input_path().extension().unwrap(), "odt");
        assert_eq!(
            job.expected_output_path(),
            derive_output_path(job.input_path(), "pdf")
        );
    }

    #[test]
    fn jobs_never_share_paths() {
        let scratch = ScratchDir::new("/scratch");
        let a = ConversionJob::new(&scratch, "txt", &PDF);
        let b = ConversionJob::new(&scratch, "txt", &PDF);
        assert_ne!(a.input_path(), b.input_path());
    }

    #[test]
    fn state_machine_follows_lifecycle() {
        let scratch = ScratchDir::new("/scratch");
        let mut job = ConversionJob::new(&scratch, "txt", &PDF);

        assert!(!job.transition(JobStatus::Succeeded));
        assert!(job.transition(JobStatus::Converting));
        assert!(job.transition(JobStatus::Succeeded));
        assert!(!job.transition(JobStatus::Failed));
        assert_eq!(job.status(), JobStatus::Succeeded);
        assert!(job.status().is_terminal());
    }

    #[test]
    fn any_live_state_can_fail() {
        let scratch = ScratchDir::new("/scratch");
        let mut pending = ConversionJob::new(&scratch, "txt", &PDF);
        assert!(pending.transition(JobStatus::Failed));
        assert!(!pending.transition(JobStatus::Converting));

        let mut converting = ConversionJob::new(&scratch, "txt", &PDF);
        converting.transition(JobStatus::Converting);
        assert!(converting.transition(JobStatus::Failed));
        assert_eq!(converting.status().as_ref(), "failed");
    }

    #[test]
    fn dropping_a_job_removes_its_files() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path());
        let job = ConversionJob::new(&scratch, "txt", &PDF);
        std::fs::write(job.input_path(), b"hello").unwrap();
        std::fs::write(job.expected_output_path(), b"%PDF-").unwrap();
        let (input, output) = (
            job.input_path().to_path_buf(),
            job.expected_output_path().to_path_buf(),
        );

        drop(job);
        assert!(!input.exists());
        assert!(!output.exists());
    }
}
