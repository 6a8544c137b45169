//! Owns the sharing session and serialises every mutation of it.
//!
//! HTTP handlers, the archiver completion task and reachability probes all
//! funnel through `SessionController`. Each adoption of a resource bumps a
//! generation number; late events carrying an older generation are dropped.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::share::archive::{ArchiveBuilder, ArchiveError, ArchiveOutcome, TempArchive};
use crate::share::state::{display_name, LifecycleState, Reachability, SharingSession};

#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("nothing was selected for sharing")]
    EmptySelection,
    #[error("sharing several files or a folder needs an archiver, none is available")]
    ArchiverUnavailable,
    #[error("{0} does not exist")]
    Missing(PathBuf),
    #[error(transparent)]
    Launch(#[from] ArchiveError),
}

/// Drop repeated paths keeping first occurrences, and require each to exist.
pub fn normalize_selection(paths: Vec<PathBuf>) -> Result<Vec<PathBuf>, ShareError> {
    let mut selection: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for path in paths {
        if !path.exists() {
            return Err(ShareError::Missing(path));
        }
        if !selection.contains(&path) {
            selection.push(path);
        }
    }
    Ok(selection)
}

/// Which address a probe result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTarget {
    Local,
    External,
}

/// What a download request may do right now.
pub enum DownloadAccess {
    NotFound,
    Preparing,
    Ready(SharedResource),
}

/// The resource as seen by one request.
pub struct SharedResource {
    path: PathBuf,
    generation: u64,
    lease: Option<Arc<TempArchive>>,
}

impl SharedResource {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        display_name(&self.path)
    }
}

struct Inner {
    session: SharingSession,
    generation: u64,
    lease: Option<Arc<TempArchive>>,
    archive_cancel: Option<CancellationToken>,
}

struct Shared {
    inner: Mutex<Inner>,
    notifier: watch::Sender<SharingSession>,
    archiver: Option<ArchiveBuilder>,
}

/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn new(uploads_allowed: bool, archiver: Option<ArchiveBuilder>) -> Self {
        let session = SharingSession::new(uploads_allowed);
        let (notifier, _) = watch::channel(session.clone());
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    session,
                    generation: 0,
                    lease: None,
                    archive_cancel: None,
                }),
                notifier,
                archiver,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.shared.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Session lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn publish(&self, inner: &Inner) {
        self.shared.notifier.send_replace(inner.session.clone());
    }

    //-- Observation

    pub fn snapshot(&self) -> SharingSession {
        self.lock().session.clone()
    }

    /// Change notifications for the presentation layer.
    pub fn subscribe(&self) -> watch::Receiver<SharingSession> {
        self.shared.notifier.subscribe()
    }

    /// Whether directories and multiple files can be shared.
    pub fn can_share_multiple(&self) -> bool {
        self.shared.archiver.is_some()
    }

    //-- Lifecycle

    /// Replace whatever is shared with `paths`.
    ///
    /// A single regular file is adopted as is. Several paths or a directory are
    /// archived first and the session stays `Preparing` until the archiver exits.
    pub fn start_sharing(&self, paths: Vec<PathBuf>) -> Result<(), ShareError> {
        let mut inner = self.lock();
        release_locked(&mut inner);
        inner.generation += 1;
        inner.session.downloads_in_flight = 0;
        inner.session.downloads_completed = 0;

        let result = self.adopt_locked(&mut inner, paths);
        if let Err(err) = &result {
            tracing::error!("Failed to start sharing: {err}");
            inner.session.lifecycle = LifecycleState::Broken;
        }

        self.publish(&inner);
        result
    }

    fn adopt_locked(&self, inner: &mut Inner, mut paths: Vec<PathBuf>) -> Result<(), ShareError> {
        if paths.is_empty() {
            return Err(ShareError::EmptySelection);
        }

        let needs_archive = paths.len() > 1 || paths[0].is_dir();
        if !needs_archive {
            let path = paths.remove(0);
            tracing::info!(path = %path.display(), "Sharing file");
            inner.session.resource = Some(path);
            inner.session.resource_is_temporary = false;
            inner.session.lifecycle = LifecycleState::Ready;
            return Ok(());
        }

        let archiver = self
            .shared
            .archiver
            .as_ref()
            .ok_or(ShareError::ArchiverUnavailable)?;
        let job = archiver.build(&paths)?;

        inner.session.resource = Some(job.archive().path().to_path_buf());
        inner.session.resource_is_temporary = true;
        inner.session.lifecycle = LifecycleState::Preparing;
        inner.lease = Some(job.archive().clone());
        inner.archive_cancel = Some(job.cancel_token());

        let generation = inner.generation;
        let controller = self.clone();
        tokio::spawn(async move {
            if let Some(outcome) = job.wait().await {
                controller.finish_archive(generation, outcome);
            }
        });

        Ok(())
    }

    /// Stop sharing. A temporary archive is removed once no download still reads it.
    pub fn stop_sharing(&self) {
        let mut inner = self.lock();
        if inner.session.resource.is_none() && inner.session.lifecycle == LifecycleState::Idle {
            return;
        }

        release_locked(&mut inner);
        inner.generation += 1;
        inner.session.downloads_in_flight = 0;
        inner.session.downloads_completed = 0;
        tracing::info!("Stopped sharing");

        self.publish(&inner);
    }

    /// Archiver completion, delivered from the task waiting on the process.
    pub fn finish_archive(&self, generation: u64, outcome: ArchiveOutcome) {
        let mut inner = self.lock();
        if generation != inner.generation || inner.session.lifecycle != LifecycleState::Preparing
        {
            tracing::debug!(generation, ?outcome, "Ignoring stale archive outcome");
            return;
        }

        inner.archive_cancel = None;
        if outcome.is_usable() {
            inner.session.lifecycle = LifecycleState::Ready;
            tracing::info!("Archive ready for sharing");
        } else {
            inner.lease = None;
            inner.session.resource = None;
            inner.session.resource_is_temporary = false;
            inner.session.lifecycle = LifecycleState::Broken;
            tracing::error!("Failed to create the archive");
        }

        self.publish(&inner);
    }

    /// Generation of the currently adopted resource.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    //-- Downloads

    pub fn download_access(&self) -> DownloadAccess {
        let inner = self.lock();
        match (&inner.session.resource, inner.session.lifecycle) {
            (Some(_), LifecycleState::Preparing) => DownloadAccess::Preparing,
            (Some(path), LifecycleState::Ready) => DownloadAccess::Ready(SharedResource {
                path: path.clone(),
                generation: inner.generation,
                lease: inner.lease.clone(),
            }),
            _ => DownloadAccess::NotFound,
        }
    }

    /// Count a transfer as in flight. The guard settles the counters when it ends.
    pub fn begin_download(&self, resource: SharedResource) -> DownloadGuard {
        let mut inner = self.lock();
        let counted = resource.generation == inner.generation
            && inner.session.lifecycle == LifecycleState::Ready;
        if counted {
            inner.session.downloads_in_flight += 1;
            self.publish(&inner);
        }

        DownloadGuard {
            controller: self.clone(),
            generation: resource.generation,
            counted,
            finished: false,
            _lease: resource.lease,
        }
    }

    /// Reading the resource failed before any transfer was counted.
    pub fn fail_download(&self, resource: &SharedResource, err: &io::Error) {
        let mut inner = self.lock();
        if resource.generation != inner.generation {
            return;
        }
        tracing::error!(path = %resource.path.display(), error = %err, "Shared file seems to have disappeared");
        degrade_locked(&mut inner);
        self.publish(&inner);
    }

    fn end_download(&self, generation: u64, counted: bool, end: DownloadEnd) {
        let mut inner = self.lock();
        if generation != inner.generation {
            return;
        }

        if counted {
            inner.session.downloads_in_flight = inner.session.downloads_in_flight.saturating_sub(1);
        }
        match end {
            DownloadEnd::Completed if counted => inner.session.downloads_completed += 1,
            DownloadEnd::ReadFailed(err) => {
                tracing::error!(error = %err, "Reading shared file failed mid-transfer");
                degrade_locked(&mut inner);
            }
            _ => {}
        }

        self.publish(&inner);
    }

    //-- Uploads

    pub fn uploads_allowed(&self) -> bool {
        self.lock().session.uploads_allowed
    }

    pub fn set_uploads_allowed(&self, allowed: bool) {
        let mut inner = self.lock();
        if inner.session.uploads_allowed == allowed {
            return;
        }
        inner.session.uploads_allowed = allowed;
        tracing::info!(allowed, "Uploads toggled");
        self.publish(&inner);
    }

    /// Account for an upload that has been fully written to `dir`.
    pub fn record_upload(&self, dir: &Path, bytes: u64) {
        let mut inner = self.lock();
        inner.session.uploads_accepted += 1;
        inner.session.upload_bytes_total += bytes;
        inner.session.upload_dir = Some(dir.to_path_buf());
        self.publish(&inner);
    }

    //-- Reachability

    pub fn set_local_endpoint(&self, endpoint: SocketAddr) {
        let mut inner = self.lock();
        inner.session.local_endpoint = Some(endpoint);
        inner.session.local_reachability = Reachability::Unknown;
        self.publish(&inner);
    }

    /// Record a new NAT mapping. Returns whether the endpoint needs probing.
    pub fn external_mapped(&self, endpoint: SocketAddr) -> bool {
        let mut inner = self.lock();
        if inner.session.external_reachability == Reachability::Available
            && inner.session.external_endpoint == Some(endpoint)
        {
            return false;
        }

        tracing::info!("Port-forwarded http://{endpoint}");
        inner.session.external_endpoint = Some(endpoint);
        inner.session.external_reachability = Reachability::Unknown;
        self.publish(&inner);
        true
    }

    pub fn external_mapping_failed(&self) {
        let mut inner = self.lock();
        inner.session.external_endpoint = None;
        inner.session.external_reachability = Reachability::Unavailable;
        self.publish(&inner);
    }

    /// Apply a probe result unless the probed endpoint is no longer current.
    pub fn apply_probe(
        &self,
        target: ProbeTarget,
        endpoint: SocketAddr,
        result: Reachability,
    ) -> bool {
        let mut inner = self.lock();
        let session = &mut inner.session;
        let (current, field) = match target {
            ProbeTarget::Local => (session.local_endpoint, &mut session.local_reachability),
            ProbeTarget::External => (
                session.external_endpoint,
                &mut session.external_reachability,
            ),
        };

        if current != Some(endpoint) {
            tracing::debug!(?target, %endpoint, "Discarding probe result for stale endpoint");
            return false;
        }

        *field = result;
        if target == ProbeTarget::External && result == Reachability::Available {
            tracing::info!("Port-forward confirmed to work");
        }
        self.publish(&inner);
        true
    }

    /// Teardown: stop sharing and remove temporary files.
    pub fn shutdown(&self) {
        self.stop_sharing();
    }
}

fn release_locked(inner: &mut Inner) {
    if let Some(cancel) = inner.archive_cancel.take() {
        cancel.cancel();
    }
    inner.lease = None;
    inner.session.resource = None;
    inner.session.resource_is_temporary = false;
    inner.session.lifecycle = LifecycleState::Idle;
}

fn degrade_locked(inner: &mut Inner) {
    release_locked(inner);
    inner.session.lifecycle = LifecycleState::Broken;
    inner.generation += 1;
    inner.session.downloads_in_flight = 0;
    inner.session.downloads_completed = 0;
}

enum DownloadEnd {
    Completed,
    Aborted,
    ReadFailed(String),
}

/// Tracks one counted transfer. Dropping it unfinished counts as an aborted transfer.
pub struct DownloadGuard {
    controller: SessionController,
    generation: u64,
    counted: bool,
    finished: bool,
    _lease: Option<Arc<TempArchive>>,
}

impl DownloadGuard {
    /// The whole body has been handed to the connection.
    pub fn complete(mut self) {
        self.finished = true;
        self.controller
            .end_download(self.generation, self.counted, DownloadEnd::Completed);
    }

    /// Reading the resource failed part way through.
    pub fn fail(mut self, err: &io::Error) {
        self.finished = true;
        self.controller.end_download(
            self.generation,
            self.counted,
            DownloadEnd::ReadFailed(err.to_string()),
        );
    }
}

impl Drop for DownloadGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.controller
                .end_download(self.generation, self.counted, DownloadEnd::Aborted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::ArchiverSettings;
    use std::time::Duration;

    fn script_archiver(script: &str) -> ArchiveBuilder {
        ArchiveBuilder::new(&ArchiverSettings {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "archiver".to_string()],
        })
    }

    async fn wait_until_settled(controller: &SessionController) -> SharingSession {
        let mut rx = controller.subscribe();
        let settled = rx.wait_for(|s| s.lifecycle != LifecycleState::Preparing);
        let session = tokio::time::timeout(Duration::from_secs(10), settled)
            .await
            .expect("archive should settle")
            .expect("controller alive")
            .clone();
        session
    }

    fn ready_resource(controller: &SessionController) -> SharedResource {
        match controller.download_access() {
            DownloadAccess::Ready(resource) => resource,
            _ => panic!("resource should be ready"),
        }
    }

    #[test]
    fn selection_is_deduplicated_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        let selection =
            normalize_selection(vec![b.clone(), a.clone(), b.clone(), a.clone()]).unwrap();
        assert_eq!(selection, vec![b, a]);

        let missing = dir.path().join("nope");
        assert!(matches!(
            normalize_selection(vec![missing]),
            Err(ShareError::Missing(_))
        ));
    }

    #[test]
    fn single_file_is_ready_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hello").unwrap();

        let controller = SessionController::new(false, None);
        controller.start_sharing(vec![file.clone()]).unwrap();

        let session = controller.snapshot();
        assert_eq!(session.lifecycle, LifecycleState::Ready);
        assert_eq!(session.resource.as_deref(), Some(file.as_path()));
        assert!(!session.resource_is_temporary);
    }

    #[test]
    fn empty_selection_breaks_session() {
        let controller = SessionController::new(false, None);
        let err = controller.start_sharing(vec![]).unwrap_err();
        assert!(matches!(err, ShareError::EmptySelection));

        let session = controller.snapshot();
        assert_eq!(session.lifecycle, LifecycleState::Broken);
        assert!(session.resource.is_none());
    }

    #[test]
    fn directory_without_archiver_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let controller = SessionController::new(false, None);

        let err = controller
            .start_sharing(vec![dir.path().to_path_buf()])
            .unwrap_err();
        assert!(matches!(err, ShareError::ArchiverUnavailable));
        assert_eq!(controller.snapshot().lifecycle, LifecycleState::Broken);
        assert!(!controller.can_share_multiple());
    }

    #[tokio::test]
    async fn directory_goes_through_preparing_to_ready() {
        let dir = tempfile::tempdir().unwrap();
        let controller =
            SessionController::new(false, Some(script_archiver("printf 'zip' > \"$1\"")));

        controller
            .start_sharing(vec![dir.path().to_path_buf()])
            .unwrap();
        let session = controller.snapshot();
        assert_eq!(session.lifecycle, LifecycleState::Preparing);
        assert!(session.resource_is_temporary);
        assert!(matches!(
            controller.download_access(),
            DownloadAccess::Preparing
        ));

        let settled = wait_until_settled(&controller).await;
        assert_eq!(settled.lifecycle, LifecycleState::Ready);
        let archive = settled.resource.expect("archive path");
        assert_eq!(std::fs::read(&archive).unwrap(), b"zip");
    }

    #[tokio::test]
    async fn archiver_warning_still_means_ready() {
        let dir = tempfile::tempdir().unwrap();
        let controller = SessionController::new(
            false,
            Some(script_archiver("printf 'zip' > \"$1\"; echo warn; exit 1")),
        );

        controller
            .start_sharing(vec![dir.path().to_path_buf()])
            .unwrap();
        let settled = wait_until_settled(&controller).await;
        assert_eq!(settled.lifecycle, LifecycleState::Ready);
    }

    #[tokio::test]
    async fn archiver_failure_breaks_and_clears_resource() {
        let dir = tempfile::tempdir().unwrap();
        let controller = SessionController::new(false, Some(script_archiver("exit 2")));

        controller
            .start_sharing(vec![dir.path().to_path_buf()])
            .unwrap();
        let temp_dir = controller
            .snapshot()
            .resource
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .expect("temp dir");

        let settled = wait_until_settled(&controller).await;
        assert_eq!(settled.lifecycle, LifecycleState::Broken);
        assert!(settled.resource.is_none());
        assert!(matches!(
            controller.download_access(),
            DownloadAccess::NotFound
        ));
        assert!(!temp_dir.exists(), "failed build output should be removed");
    }

    #[tokio::test]
    async fn stale_archive_outcome_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"a").unwrap();
        let controller = SessionController::new(false, Some(script_archiver("sleep 30")));

        controller
            .start_sharing(vec![dir.path().to_path_buf()])
            .unwrap();
        let stale_generation = controller.generation();

        controller.start_sharing(vec![file.clone()]).unwrap();
        controller.finish_archive(stale_generation, ArchiveOutcome::Failed);

        let session = controller.snapshot();
        assert_eq!(session.lifecycle, LifecycleState::Ready);
        assert_eq!(session.resource.as_deref(), Some(file.as_path()));
    }

    #[tokio::test]
    async fn stop_removes_temporary_archive_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        let controller =
            SessionController::new(false, Some(script_archiver("printf 'zip' > \"$1\"")));
        controller
            .start_sharing(vec![dir.path().to_path_buf()])
            .unwrap();
        let archive = wait_until_settled(&controller).await.resource.unwrap();
        let temp_dir = archive.parent().unwrap().to_path_buf();

        controller.stop_sharing();

        assert!(!archive.exists());
        assert!(!temp_dir.exists());
        let session = controller.snapshot();
        assert_eq!(session.lifecycle, LifecycleState::Idle);
        assert!(session.resource.is_none());
    }

    #[tokio::test]
    async fn archive_outlives_stop_while_download_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let controller =
            SessionController::new(false, Some(script_archiver("printf 'zip' > \"$1\"")));
        controller
            .start_sharing(vec![dir.path().to_path_buf()])
            .unwrap();
        let archive = wait_until_settled(&controller).await.resource.unwrap();

        let guard = controller.begin_download(ready_resource(&controller));
        controller.stop_sharing();
        assert!(archive.exists(), "in-flight download still reads the archive");

        guard.complete();
        assert!(!archive.exists());
        assert_eq!(controller.snapshot().downloads_completed, 0);
    }

    #[test]
    fn stop_leaves_original_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("keep.txt");
        std::fs::write(&file, b"keep").unwrap();
        let controller = SessionController::new(false, None);

        controller.start_sharing(vec![file.clone()]).unwrap();
        controller.stop_sharing();

        assert_eq!(std::fs::read(&file).unwrap(), b"keep");
        assert_eq!(controller.snapshot().lifecycle, LifecycleState::Idle);
    }

    #[test]
    fn download_counters_follow_guards() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"a").unwrap();
        let controller = SessionController::new(false, None);
        controller.start_sharing(vec![file]).unwrap();

        let guards: Vec<_> = (0..5)
            .map(|_| controller.begin_download(ready_resource(&controller)))
            .collect();
        assert_eq!(controller.snapshot().downloads_in_flight, 5);

        let mut guards = guards.into_iter();
        for guard in guards.by_ref().take(3) {
            guard.complete();
        }
        let session = controller.snapshot();
        assert_eq!(session.downloads_in_flight, 2);
        assert_eq!(session.downloads_completed, 3);

        // Aborted transfers leave the completed count alone
        drop(guards);
        let session = controller.snapshot();
        assert_eq!(session.downloads_in_flight, 0);
        assert_eq!(session.downloads_completed, 3);
    }

    #[test]
    fn new_share_resets_download_counters() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();
        let controller = SessionController::new(false, None);

        controller.start_sharing(vec![a]).unwrap();
        controller
            .begin_download(ready_resource(&controller))
            .complete();
        let in_flight = controller.begin_download(ready_resource(&controller));
        assert_eq!(controller.snapshot().downloads_completed, 1);

        controller.start_sharing(vec![b]).unwrap();
        in_flight.complete();

        let session = controller.snapshot();
        assert_eq!(session.downloads_in_flight, 0);
        assert_eq!(session.downloads_completed, 0);
    }

    #[test]
    fn read_failure_degrades_to_broken() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"a").unwrap();
        let controller = SessionController::new(false, None);
        controller.start_sharing(vec![file]).unwrap();

        let guard = controller.begin_download(ready_resource(&controller));
        guard.fail(&io::Error::new(io::ErrorKind::UnexpectedEof, "truncated"));

        let session = controller.snapshot();
        assert_eq!(session.lifecycle, LifecycleState::Broken);
        assert!(session.resource.is_none());
        assert_eq!(session.downloads_in_flight, 0);
        assert!(matches!(
            controller.download_access(),
            DownloadAccess::NotFound
        ));
    }

    #[test]
    fn upload_toggle_does_not_touch_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"a").unwrap();
        let controller = SessionController::new(false, None);
        controller.start_sharing(vec![file]).unwrap();

        controller.set_uploads_allowed(true);
        assert!(controller.uploads_allowed());
        assert_eq!(controller.snapshot().lifecycle, LifecycleState::Ready);

        controller.record_upload(dir.path(), 42);
        controller.record_upload(dir.path(), 8);
        controller.stop_sharing();
        let session = controller.snapshot();
        assert_eq!(session.uploads_accepted, 2);
        assert_eq!(session.upload_bytes_total, 50);
    }

    #[test]
    fn probe_results_for_stale_endpoints_are_discarded() {
        let controller = SessionController::new(false, None);
        let first: SocketAddr = "203.0.113.7:8080".parse().unwrap();
        let second: SocketAddr = "203.0.113.7:9090".parse().unwrap();

        assert!(controller.external_mapped(first));
        assert!(controller.external_mapped(second));
        assert!(!controller.apply_probe(ProbeTarget::External, first, Reachability::Available));
        assert_eq!(
            controller.snapshot().external_reachability,
            Reachability::Unknown
        );

        assert!(controller.apply_probe(ProbeTarget::External, second, Reachability::Available));
        assert_eq!(
            controller.snapshot().external_reachability,
            Reachability::Available
        );

        // Same mapping again is not re-probed
        assert!(!controller.external_mapped(second));
    }

    #[test]
    fn local_and_external_reachability_are_independent() {
        let controller = SessionController::new(false, None);
        let local: SocketAddr = "192.168.1.20:8080".parse().unwrap();
        let external: SocketAddr = "203.0.113.7:8080".parse().unwrap();

        controller.set_local_endpoint(local);
        controller.external_mapped(external);
        controller.apply_probe(ProbeTarget::Local, local, Reachability::Available);
        controller.apply_probe(ProbeTarget::External, external, Reachability::Unavailable);

        let session = controller.snapshot();
        assert_eq!(session.local_reachability, Reachability::Available);
        assert_eq!(session.external_reachability, Reachability::Unavailable);

        controller.external_mapping_failed();
        let session = controller.snapshot();
        assert_eq!(session.local_reachability, Reachability::Available);
        assert!(session.external_endpoint.is_none());
    }

    #[test]
    fn subscribers_see_changes() {
        let controller = SessionController::new(false, None);
        let mut rx = controller.subscribe();
        assert!(!rx.has_changed().unwrap());

        controller.set_uploads_allowed(true);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().uploads_allowed);
    }
}
