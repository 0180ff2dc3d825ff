//! Scratch storage and guaranteed cleanup.
//!
//! Every job owns a [`ScratchFiles`] guard naming the files it may create.
//! The guard removes them when dropped, so cleanup runs exactly once on
//! whichever path the request takes. On success the guard rides inside the
//! response body ([`CleanupBody`]) and is dropped only once the body has been
//! written out or abandoned by the client.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// File-name prefix of every scratch file this process creates.
pub const FILE_PREFIX: &str = "docgate-";

/// Shared scratch directory. Jobs never collide because each gets a fresh
/// UUID stem.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the directory if needed.
    pub async fn ensure(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Path for a job's input file, `<root>/docgate-<id>.<ext>`.
    pub fn input_path(&self, id: Uuid, extension: &str) -> PathBuf {
        self.root.join(format!("{FILE_PREFIX}{id}.{extension}"))
    }

    /// Removes files left behind by a previous process. Only names carrying
    /// [`FILE_PREFIX`] are touched. Returns how many files were removed.
    pub async fn sweep_stale(&self) -> std::io::Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(FILE_PREFIX) || !entry.file_type().await?.is_file() {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to sweep stale scratch file"),
            }
        }
        if removed > 0 {
            info!(removed, dir = %self.root.display(), "removed stale scratch files");
        }
        Ok(removed)
    }

    /// Names of entries in the directory that start with `stem`, sorted.
    pub async fn related_entries(&self, stem: &str) -> Vec<String> {
        let mut names = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.root).await else {
            return names;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(stem) {
                    names.push(name.to_owned());
                }
            }
        }
        names.sort();
        names
    }
}

/// Removes the files it names when dropped. Files that never appeared are
/// fine; other removal errors are logged and swallowed.
#[derive(Debug)]
pub struct ScratchFiles {
    job_id: Uuid,
    paths: Vec<PathBuf>,
}

impl ScratchFiles {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            paths: Vec::new(),
        }
    }

    /// Registers a path for removal. Call before the file is created so a
    /// partially written file is removed too.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }
}

impl Drop for ScratchFiles {
    // Removal is blocking and runs on the dropping thread, usually a runtime
    // worker. A job owns at most two files, and callers rely on them being
    // gone as soon as the guard is dropped.
    fn drop(&mut self) {
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(job_id = %self.job_id, path = %path.display(), "scratch file removed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(
                    job_id = %self.job_id,
                    path = %path.display(),
                    error = %e,
                    "cleanup error"
                ),
            }
        }
    }
}

/// Single-chunk response body that holds a [`ScratchFiles`] guard until the
/// body itself is dropped.
pub struct CleanupBody {
    payload: Option<Bytes>,
    _files: ScratchFiles,
}

impl CleanupBody {
    pub fn new(payload: Bytes, files: ScratchFiles) -> Self {
        Self {
            payload: Some(payload),
            _files: files,
        }
    }
}

impl Stream for CleanupBody {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().payload.take().map(Ok))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::from(self.payload.is_some());
        (n, Some(n))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn guard_removes_tracked_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("docgate-a.txt");
        let b = dir.path().join("docgate-a.pdf");
        std::fs::write(&a, b"in").unwrap();

        let mut files = ScratchFiles::new(Uuid::new_v4());
        files.track(&a);
        files.track(&b);
        drop(files);

        assert!(!a.exists());
        assert!(!b.exists());
    }

    #[test]
    fn input_path_keeps_extension() {
        let scratch = ScratchDir::new("/scratch");
        let id = Uuid::nil();
        assert_eq!(
            scratch.input_path(id, "docx"),
            PathBuf::from("/scratch/docgate-00000000-0000-0000-0000-000000000000.docx")
        );
    }

    #[tokio::test]
    async fn body_releases_files_after_it_is_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("docgate-b.pdf");
        std::fs::write(&out, b"%PDF-1.4").unwrap();

        let mut files = ScratchFiles::new(Uuid::new_v4());
        files.track(&out);
        let mut body = CleanupBody::new(Bytes::from_static(b"%PDF-1.4"), files);

        let chunk = body.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"%PDF-1.4");
        assert!(body.next().await.is_none());
        assert!(out.exists(), "files stay until the body is dropped");

        drop(body);
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn sweep_only_touches_prefixed_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("docgate-old.docx"), b"x").unwrap();
        std::fs::write(dir.path().join("docgate-old.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("keep.me"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("docgate-dir")).unwrap();

        let scratch = ScratchDir::new(dir.path());
        assert_eq!(scratch.sweep_stale().await.unwrap(), 2);
        assert!(dir.path().join("keep.me").exists());
        assert!(dir.path().join("docgate-dir").exists());
    }

    #[tokio::test]
    async fn related_entries_filters_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("docgate-1.docx"), b"x").unwrap();
        std::fs::write(dir.path().join("docgate-1.log"), b"x").unwrap();
        std::fs::write(dir.path().join("docgate-2.docx"), b"x").unwrap();

        let scratch = ScratchDir::new(dir.path());
        assert_eq!(
            scratch.related_entries("docgate-1").await,
            vec!["docgate-1.docx", "docgate-1.log"]
        );
        assert!(ScratchDir::new(dir.path().join("missing"))
            .related_entries("docgate-1")
            .await
            .is_empty());
    }
}
