//! Runtime lifecycle: start the server, report reachability, and shut down.

use crate::common::config::AppConfig;
use crate::receive::UploadFiler;
use crate::server::{create_router, AppState, SERVER_IDENTITY};
use crate::share::{normalize_selection, ArchiveBuilder, ProbeTarget, SessionController};
use crate::transport::local::{discover_local_address, start_local_server};
use crate::transport::nat::{IgdPortMapper, PortMapper};
use crate::transport::probe::ReachabilityProber;
use crate::ui::{spawn_console, spawn_status_printer};
use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long idle keep-alive connections get to close on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Serve until Ctrl+C or a `quit` command, sharing `files` from the start.
pub async fn run(config: AppConfig, files: Vec<PathBuf>) -> Result<()> {
    config.validate()?;

    let archiver = ArchiveBuilder::detect(&config.archiver);
    if archiver.is_none() {
        tracing::warn!(
            "Archiver `{}` not found on PATH; only single files can be shared",
            config.archiver.program
        );
    }

    let controller = SessionController::new(config.allow_uploads, archiver);
    let state = AppState::new(
        controller.clone(),
        UploadFiler::new(config.uploads_root()),
        config.app_title(),
    );
    let app = create_router(&state, config.max_upload_bytes);

    let (port, server_handle) = start_local_server(app, config.port).await.with_context(|| {
        if config.port == 0 {
            "Failed to start the web server.".to_string()
        } else {
            format!("Failed to start the web server on port {}.", config.port)
        }
    })?;

    let local_ip = discover_local_address().unwrap_or_else(|err| {
        tracing::warn!("Could not guess local address: {err:#}");
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    });
    let local = SocketAddr::new(local_ip, port);
    tracing::info!("Server starting, guessed uri http://{local}");

    let root_token = CancellationToken::new();
    let printer = spawn_status_printer(controller.subscribe(), root_token.child_token());
    let console = spawn_console(controller.clone(), root_token.clone());

    let prober = ReachabilityProber::new(
        Duration::from_secs(config.probe.timeout_secs),
        SERVER_IDENTITY,
    )?;
    let mapper: Option<Arc<dyn PortMapper>> = if config.nat.enabled {
        Some(Arc::new(IgdPortMapper::new(&config.nat)))
    } else {
        None
    };
    let reachability = tokio::spawn(check_reachability(
        controller.clone(),
        prober,
        mapper.clone(),
        local,
    ));

    if !files.is_empty() {
        let shared = normalize_selection(files).and_then(|selection| {
            controller.start_sharing(selection)
        });
        if let Err(err) = shared {
            tracing::error!("Cannot share: {err}");
        }
    }

    // Ctrl+C handler cancels root_token on first Ctrl+C
    let signal_token = root_token.clone();
    let ctrl_c_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Ctrl+C received - initiating graceful shutdown");
        signal_token.cancel();
    });

    root_token.cancelled().await;

    // Stop the first-stage signal handler before shutdown installs its own
    ctrl_c_task.abort();
    let _ = ctrl_c_task.await;
    reachability.abort();

    shutdown(server_handle, &controller, mapper).await;

    let _ = printer.await;
    console.abort();
    Ok(())
}

/// Probe the local endpoint and, with NAT enabled, map and probe an external one.
async fn check_reachability(
    controller: SessionController,
    prober: ReachabilityProber,
    mapper: Option<Arc<dyn PortMapper>>,
    local: SocketAddr,
) {
    controller.set_local_endpoint(local);

    let local_probe = async {
        let result = prober.probe(local).await;
        controller.apply_probe(ProbeTarget::Local, local, result);
    };

    let external_probe = async {
        let Some(mapper) = mapper else {
            controller.external_mapping_failed();
            return;
        };
        match mapper.request_mapping(local).await {
            Ok(external) => {
                if controller.external_mapped(external) {
                    let result = prober.probe(external).await;
                    controller.apply_probe(ProbeTarget::External, external, result);
                }
            }
            Err(err) => {
                tracing::warn!("Port mapping unavailable: {err:#}");
                controller.external_mapping_failed();
            }
        }
    };

    tokio::join!(local_probe, external_probe);
}

//==========
// SHUTDOWN
//==========

enum ShutdownResult {
    Completed,
    Forced,
}

/// Stop accepting connections, drain downloads, remove temp files, release the mapping.
async fn shutdown(
    server_handle: axum_server::Handle,
    controller: &SessionController,
    mapper: Option<Arc<dyn PortMapper>>,
) {
    server_handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
    tracing::info!("Server stopped accepting new connections");

    match wait_for_downloads(controller).await {
        ShutdownResult::Completed => tracing::debug!("No downloads in flight"),
        ShutdownResult::Forced => {
            let remaining = controller.snapshot().downloads_in_flight;
            tracing::warn!("Forced shutdown with {remaining} download(s) in flight");
            server_handle.shutdown();
        }
    }

    controller.shutdown();

    if let Some(mapper) = mapper {
        if let Err(err) = mapper.release_mapping().await {
            tracing::warn!("Failed to release port mapping: {err:#}");
        }
    }

    tracing::info!("Server shutdown complete");
}

/// Wait for in-flight downloads to finish, or force quit on Ctrl+C.
async fn wait_for_downloads(controller: &SessionController) -> ShutdownResult {
    let mut rx = controller.subscribe();
    let mut last_count = rx.borrow_and_update().downloads_in_flight;
    if last_count > 0 {
        tracing::info!("{last_count} download(s) remaining - Press Ctrl+C to force quit");
    }

    while last_count > 0 {
        tokio::select! {
            // Ctrl+C during drain = force quit
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    tracing::info!("Force shutdown requested");
                    return ShutdownResult::Forced;
                }
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let current_count = rx.borrow_and_update().downloads_in_flight;
                if current_count != last_count && current_count > 0 {
                    tracing::info!("{current_count} download(s) remaining...");
                }
                last_count = current_count;
            }
        }
    }

    ShutdownResult::Completed
}
