pub mod archive;
pub mod controller;
pub mod state;

pub use archive::{ArchiveBuilder, ArchiveOutcome};
pub use controller::{
    normalize_selection, DownloadAccess, DownloadGuard, ProbeTarget, SessionController, ShareError,
};
pub use state::{LifecycleState, Reachability, SharingSession};
