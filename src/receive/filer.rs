//! Collision-free destinations for uploaded files.
//!
//! The uploads directory is created fresh on first use. An existing directory
//! with the preferred name belongs to someone else, so numbered alternatives
//! are probed instead of reusing it. Files are never overwritten.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::common::config::UPLOAD_DIR_NAME;

/// Upper bound for numbered alternatives, for both the directory and file names.
pub const MAX_ATTEMPTS: u32 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum FilerError {
    #[error("no free uploads directory name under {0}")]
    DirectoryExhausted(PathBuf),
    #[error("no free name for upload {0:?}")]
    NameExhausted(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Hands out upload destinations under one lazily created directory.
pub struct UploadFiler {
    root: PathBuf,
    dir: Mutex<Option<PathBuf>>,
}

impl UploadFiler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dir: Mutex::new(None),
        }
    }

    /// Directory uploads go to, once one has been created.
    pub fn upload_dir(&self) -> Option<PathBuf> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PathBuf>> {
        self.dir.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Free destination path for `suggested`. Nothing is created except the directory.
    pub fn resolve(&self, suggested: &str) -> Result<PathBuf, FilerError> {
        let mut dir = self.lock();
        let dir = ensure_dir(&self.root, &mut dir)?;
        free_name(&dir, suggested, |p| !p.exists())
    }

    /// Resolve and create the destination atomically with respect to other uploads.
    ///
    /// Blocking; call from `spawn_blocking`.
    pub fn create(&self, suggested: &str) -> Result<(PathBuf, File), FilerError> {
        let mut dir = self.lock();
        let dir = ensure_dir(&self.root, &mut dir)?;

        let mut opened: Option<io::Result<File>> = None;
        let path = free_name(&dir, suggested, |candidate| {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(candidate)
            {
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => false,
                // Anything else stops probing
                result => {
                    opened = Some(result);
                    true
                }
            }
        })?;

        match opened {
            Some(Ok(file)) => Ok((path, file)),
            Some(Err(err)) => Err(err.into()),
            None => Err(FilerError::NameExhausted(suggested.to_string())),
        }
    }
}

/// An upload being written. Dropped without `keep`, the file is deleted.
pub struct PartialUpload {
    path: PathBuf,
    disarmed: bool,
}

impl PartialUpload {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            disarmed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The write finished; leave the file in place.
    pub fn keep(mut self) -> PathBuf {
        self.disarmed = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for PartialUpload {
    fn drop(&mut self) {
        if self.disarmed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to clean up partial upload"
            );
        }
    }
}

fn ensure_dir(root: &Path, cached: &mut Option<PathBuf>) -> Result<PathBuf, FilerError> {
    if let Some(dir) = cached.as_ref() {
        return Ok(dir.clone());
    }

    std::fs::create_dir_all(root)?;

    for attempt in 1..MAX_ATTEMPTS {
        let name = if attempt == 1 {
            UPLOAD_DIR_NAME.to_string()
        } else {
            format!("{UPLOAD_DIR_NAME}({attempt})")
        };
        let candidate = root.join(name);

        match std::fs::create_dir(&candidate) {
            Ok(()) => {
                tracing::info!(dir = %candidate.display(), "Created uploads directory");
                *cached = Some(candidate.clone());
                return Ok(candidate);
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err.into()),
        }
    }

    Err(FilerError::DirectoryExhausted(root.to_path_buf()))
}

/// First name in `suggested`, `stem(2).ext`, `stem(3).ext`, ... accepted by `claim`.
fn free_name(
    dir: &Path,
    suggested: &str,
    mut claim: impl FnMut(&Path) -> bool,
) -> Result<PathBuf, FilerError> {
    let first = dir.join(suggested);
    if claim(&first) {
        return Ok(first);
    }

    let original = Path::new(suggested);
    let stem = original
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from(suggested));
    let ext = original.extension();

    for attempt in 2..MAX_ATTEMPTS {
        let mut name = stem.clone();
        name.push(format!("({attempt})"));
        if let Some(ext) = ext {
            name.push(".");
            name.push(ext);
        }

        let candidate = dir.join(name);
        if claim(&candidate) {
            return Ok(candidate);
        }
    }

    Err(FilerError::NameExhausted(suggested.to_string()))
}
