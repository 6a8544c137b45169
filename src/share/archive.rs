//! Bundles several paths into one zip by running an external archiver.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::common::config::ArchiverSettings;
use crate::share::state::display_name;

/// Terminal result reported by the archiver process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Ready,
    /// Archive is usable but the tool complained (exit code 1)
    ReadyWithWarnings,
    Failed,
}

impl ArchiveOutcome {
    /// `None` means the process was killed by a signal.
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => ArchiveOutcome::Ready,
            Some(1) => ArchiveOutcome::ReadyWithWarnings,
            _ => ArchiveOutcome::Failed,
        }
    }

    pub fn is_usable(self) -> bool {
        matches!(
            self,
            ArchiveOutcome::Ready | ArchiveOutcome::ReadyWithWarnings
        )
    }
}

/// Synchronous launch failures. No process exists when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("nothing to archive")]
    NoInputs,
    #[error("archiver `{0}` was not found")]
    NotFound(String),
    #[error("failed to create temporary directory for the archive")]
    TempDir(#[source] io::Error),
    #[error("failed to launch archiver `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Archive file plus the temporary directory holding it.
///
/// Dropping the last handle removes both; downloads keep a handle while streaming.
#[derive(Debug)]
pub struct TempArchive {
    path: PathBuf,
    dir: PathBuf,
}

impl TempArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to remove temporary archive");
            }
        }
        // Partial output from a failed or cancelled build may still be in here
        if let Err(err) = std::fs::remove_dir_all(&self.dir) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(dir = %self.dir.display(), error = %err, "failed to remove temporary archive directory");
            }
        }
    }
}

/// Invokes the configured archiver. Construct with `detect` to require the program on PATH.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    program: String,
    args: Vec<String>,
}

impl ArchiveBuilder {
    pub fn new(settings: &ArchiverSettings) -> Self {
        Self {
            program: settings.program.clone(),
            args: settings.args.clone(),
        }
    }

    /// Returns a builder only if the archiver program can be found.
    pub fn detect(settings: &ArchiverSettings) -> Option<Self> {
        find_program(&settings.program).map(|_| Self::new(settings))
    }

    /// Spawn the archiver writing into a fresh temporary directory.
    pub fn build(&self, paths: &[PathBuf]) -> Result<ArchiveJob, ArchiveError> {
        let first = paths.first().ok_or(ArchiveError::NoInputs)?;

        let dir = tempfile::Builder::new()
            .prefix("ffs-")
            .tempdir()
            .map_err(ArchiveError::TempDir)?
            .keep();

        let archive_name = if paths.len() == 1 {
            format!("{}.zip", display_name(first))
        } else {
            "archive.zip".to_string()
        };
        let archive = Arc::new(TempArchive {
            path: dir.join(archive_name),
            dir,
        });

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(archive.path())
            .args(paths)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                if source.kind() == io::ErrorKind::NotFound {
                    ArchiveError::NotFound(self.program.clone())
                } else {
                    ArchiveError::Spawn {
                        program: self.program.clone(),
                        source,
                    }
                }
            })?;

        tracing::info!(
            archive = %archive.path().display(),
            inputs = paths.len(),
            "archiver started"
        );

        Ok(ArchiveJob {
            program: self.program.clone(),
            archive,
            child,
            cancel: CancellationToken::new(),
        })
    }
}

/// A running archiver process.
pub struct ArchiveJob {
    program: String,
    archive: Arc<TempArchive>,
    child: Child,
    cancel: CancellationToken,
}

impl ArchiveJob {
    pub fn archive(&self) -> &Arc<TempArchive> {
        &self.archive
    }

    /// Cancelling kills the process; `wait` then returns `None`.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the process to exit and classify its status.
    pub async fn wait(self) -> Option<ArchiveOutcome> {
        let ArchiveJob {
            program,
            archive,
            mut child,
            cancel,
        } = self;

        let finished = tokio::select! {
            result = collect_exit(&mut child) => Some(result),
            _ = cancel.cancelled() => None,
        };
        let Some(result) = finished else {
            tracing::debug!(archive = %archive.path().display(), "archive build cancelled");
            if let Err(err) = child.kill().await {
                tracing::warn!(error = %err, "failed to kill archiver");
            }
            return None;
        };

        let outcome = match result {
            Ok((status, output)) => {
                let outcome = ArchiveOutcome::from_exit_code(status.code());
                log_outcome(&program, status, outcome, &output);
                outcome
            }
            Err(err) => {
                tracing::error!(error = %err, "failed waiting for {program}");
                ArchiveOutcome::Failed
            }
        };
        drop(archive);
        Some(outcome)
    }
}

/// Drain stdout and stderr concurrently, then reap the process.
async fn collect_exit(child: &mut Child) -> io::Result<(ExitStatus, String)> {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let mut out = Vec::new();
    let mut err = Vec::new();
    let read_out = async {
        if let Some(pipe) = stdout.as_mut() {
            pipe.read_to_end(&mut out).await?;
        }
        Ok::<_, io::Error>(())
    };
    let read_err = async {
        if let Some(pipe) = stderr.as_mut() {
            pipe.read_to_end(&mut err).await?;
        }
        Ok::<_, io::Error>(())
    };
    let (read_out, read_err) = tokio::join!(read_out, read_err);
    read_out?;
    read_err?;

    let status = child.wait().await?;

    let mut output = String::from_utf8_lossy(&out).into_owned();
    output.push_str(&String::from_utf8_lossy(&err));
    Ok((status, output))
}

fn log_outcome(program: &str, status: ExitStatus, outcome: ArchiveOutcome, output: &str) {
    match outcome {
        ArchiveOutcome::Ready => {
            tracing::info!("archive ready");
        }
        ArchiveOutcome::ReadyWithWarnings => {
            tracing::warn!("{program} returned {status}, printing full output:");
            for line in output.lines() {
                tracing::warn!(" | {line}");
            }
        }
        ArchiveOutcome::Failed => {
            tracing::error!("{program} returned {status}, printing full output:");
            for line in output.lines() {
                tracing::error!(" | {line}");
            }
        }
    }
}

/// Resolve a program name against PATH. Names containing a separator are checked directly.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| {
            let plain = dir.join(program);
            let exe = dir.join(format!("{program}.exe"));
            [plain, exe]
        })
        .find(|p| p.is_file())
}
