//! External office-suite converter invocation.
//!
//! The converter is always started from an argument vector, never through a
//! shell, so nothing in a path can change what gets executed. On unix the
//! child leads its own process group. When the wall-clock timeout expires or
//! the awaiting future is dropped (for example when the client disconnects),
//! the whole group is killed, including helpers the launcher forked.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::services::format::TargetFormat;

/// Captured streams are cut to this many bytes before being reported.
const MAX_CAPTURE_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ConvertError {
    /// The converter binary could not be started.
    #[error("could not start converter '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The converter did not finish within the timeout and was killed.
    #[error("converter timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    /// The converter exited unsuccessfully.
    #[error("converter {}", describe_exit(.code))]
    Failed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

/// Streams captured from a successful converter run.
#[derive(Debug, Clone)]
pub struct ConverterOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct Converter {
    program: String,
    leading_args: Vec<String>,
    timeout: Duration,
}

impl Converter {
    pub fn new(program: impl Into<String>, leading_args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            leading_args,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.converter_program.clone(),
            config.converter_args.clone(),
            config.convert_timeout,
        )
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Argument vector for a headless conversion of `input` into `output_dir`.
    pub fn conversion_args(
        &self,
        input: &Path,
        output_dir: &Path,
        target: &TargetFormat,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.leading_args.iter().map(OsString::from).collect();
        args.extend([
            OsString::from("--headless"),
            OsString::from("--convert-to"),
            OsString::from(target.filter),
            OsString::from("--outdir"),
            output_dir.as_os_str().to_owned(),
            input.as_os_str().to_owned(),
        ]);
        args
    }

    /// Converts `input` into `output_dir`. Success means the process exited
    /// zero; whether it actually wrote anything is for the caller to check.
    pub async fn convert(
        &self,
        input: &Path,
        output_dir: &Path,
        target: &TargetFormat,
    ) -> Result<ConverterOutput, ConvertError> {
        let args = self.conversion_args(input, output_dir, target);
        info!(
            program = %self.program,
            input = %input.display(),
            outdir = %output_dir.display(),
            "running converter"
        );
        self.run(args).await
    }

    /// Runs `<program> --version`.
    pub async fn version(&self) -> Result<ConverterOutput, ConvertError> {
        let mut args: Vec<OsString> = self.leading_args.iter().map(OsString::from).collect();
        args.push(OsString::from("--version"));
        self.run(args).await
    }

    async fn run(&self, args: Vec<OsString>) -> Result<ConverterOutput, ConvertError> {
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        debug!(program = %self.program, ?args, "spawning converter");

        let started = Instant::now();
        let child = command.spawn().map_err(|source| ConvertError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let group = ProcessGroup::new(child.id());

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ConvertError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                drop(group);
                warn!(program = %self.program, timeout_secs = self.timeout.as_secs_f32(), "converter timed out; killed");
                return Err(ConvertError::Timeout(self.timeout));
            }
        };

        let elapsed = started.elapsed();
        let stdout = capture(&output.stdout);
        let stderr = capture(&output.stderr);

        if !output.status.success() {
            warn!(
                program = %self.program,
                code = ?output.status.code(),
                elapsed_ms = elapsed.as_millis(),
                stderr = %stderr,
                "converter failed"
            );
            return Err(ConvertError::Failed {
                code: output.status.code(),
                stdout,
                stderr,
            });
        }

        group.release();
        info!(program = %self.program, elapsed_ms = elapsed.as_millis(), "converter finished");
        Ok(ConverterOutput {
            stdout,
            stderr,
            elapsed,
        })
    }
}

/// Kills the converter's process group when dropped, unless released after
/// a clean exit. A failed run still has its stragglers killed.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(leader: Option<u32>) -> Self {
        Self { pgid: leader }
    }

    fn release(mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid.take() else { return };
        #[cfg(unix)]
        {
            let Ok(pgid) = libc::pid_t::try_from(pgid) else { return };
            // SAFETY: killpg only sends a signal. The group was created for
            // this child by `process_group(0)` and is not reused while any
            // member is alive.
            let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
            if rc == 0 {
                debug!(pgid, "killed converter process group");
            } else {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::ESRCH) {
                    warn!(pgid, error = %err, "failed to kill converter process group");
                }
            }
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_owned(),
    }
}

fn capture(raw: &[u8]) -> String {
    let raw = &raw[..raw.len().min(MAX_CAPTURE_BYTES)];
    String::from_utf8_lossy(raw).trim_end().to_owned()
}
