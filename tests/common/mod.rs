#![allow(dead_code)]

pub mod config_test_utils;
pub mod server_http;

use std::path::{Path, PathBuf};
use std::time::Duration;

use ffs::common::config::ArchiverSettings;
use ffs::share::{ArchiveBuilder, SessionController, SharingSession};
use tempfile::TempDir;

pub fn setup_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("Failed to write test file");
    path
}

/// Archiver stand-in: `sh -c <script>` with the archive path as `$1`.
pub fn script_archiver(script: &str) -> ArchiveBuilder {
    ArchiveBuilder::new(&ArchiverSettings {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string(), "archiver".to_string()],
    })
}

/// Archiver that blocks until `gate` exists, then writes `contents` as the archive.
pub fn gated_archiver(gate: &Path, contents: &str) -> ArchiveBuilder {
    script_archiver(&format!(
        "while [ ! -e '{}' ]; do sleep 0.05; done; printf '{}' > \"$1\"",
        gate.display(),
        contents
    ))
}

/// Wait for a session matching `pred`, failing the test after a few seconds.
pub async fn wait_for_session(
    controller: &SessionController,
    pred: impl FnMut(&SharingSession) -> bool,
) -> SharingSession {
    let mut rx = controller.subscribe();
    let matched = rx.wait_for(pred);
    let session = tokio::time::timeout(Duration::from_secs(10), matched)
        .await
        .expect("Timed out waiting for session state")
        .expect("Controller dropped")
        .clone();
    session
}
