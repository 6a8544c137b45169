//! The sharing session record published to observers.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Lifecycle of the shared resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Idle,
    /// Archive build outstanding
    Preparing,
    Ready,
    /// Archive build or resource read failed. Cleared only by an explicit stop or a new share.
    Broken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reachability {
    #[default]
    Unknown,
    Available,
    Unavailable,
}

/// Snapshot of what is shared and how the server can be reached.
///
/// Only `SessionController` mutates the live record; everybody else sees clones.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SharingSession {
    pub resource: Option<PathBuf>,
    pub resource_is_temporary: bool,
    pub lifecycle: LifecycleState,
    pub downloads_in_flight: u64,
    pub downloads_completed: u64,
    pub uploads_accepted: u64,
    pub upload_bytes_total: u64,
    pub upload_dir: Option<PathBuf>,
    pub local_endpoint: Option<SocketAddr>,
    pub local_reachability: Reachability,
    pub external_endpoint: Option<SocketAddr>,
    pub external_reachability: Reachability,
    pub uploads_allowed: bool,
}

impl SharingSession {
    pub fn new(uploads_allowed: bool) -> Self {
        Self {
            uploads_allowed,
            ..Self::default()
        }
    }

    /// Basename of the shared resource, as offered to downloaders.
    pub fn resource_name(&self) -> Option<String> {
        self.resource.as_deref().map(display_name)
    }
}

/// Final path component, lossily converted for display and headers.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
