//! UPnP port mapping so the server can be reached from the internet.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use igd_next::{search_gateway, Gateway, PortMappingProtocol, SearchOptions};

use crate::common::config::NatSettings;

const MAPPING_DESCRIPTION: &str = "Friendly File Server";

/// Asks the router to forward an external port to us.
#[async_trait]
pub trait PortMapper: Send + Sync {
    /// Maps the same external port as `internal`. Returns the external endpoint.
    async fn request_mapping(&self, internal: SocketAddr) -> Result<SocketAddr>;

    /// Removes a mapping made by `request_mapping`. No-op if none exists.
    async fn release_mapping(&self) -> Result<()>;
}

/// `PortMapper` backed by an Internet Gateway Device found via SSDP.
pub struct IgdPortMapper {
    search_timeout: Duration,
    lease_secs: u32,
    mapped: Mutex<Option<(Gateway, u16)>>,
}

impl IgdPortMapper {
    pub fn new(settings: &NatSettings) -> Self {
        Self {
            search_timeout: Duration::from_secs(settings.search_timeout_secs),
            lease_secs: settings.lease_secs,
            mapped: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PortMapper for IgdPortMapper {
    async fn request_mapping(&self, internal: SocketAddr) -> Result<SocketAddr> {
        let search_timeout = self.search_timeout;
        let lease = self.lease_secs;
        let port = internal.port();

        tracing::info!("Attempting to map port {port} via UPnP...");

        // igd-next is synchronous
        let (gateway, external) = tokio::task::spawn_blocking(move || {
            let options = SearchOptions {
                timeout: Some(search_timeout),
                ..Default::default()
            };
            let gateway = search_gateway(options).context("UPnP gateway search failed")?;
            tracing::debug!("Found UPnP gateway: {gateway}");

            gateway
                .add_port(
                    PortMappingProtocol::TCP,
                    port,
                    internal,
                    lease,
                    MAPPING_DESCRIPTION,
                )
                .context("UPnP port mapping failed")?;

            let external_ip = gateway
                .get_external_ip()
                .context("Failed to get external IP")?;
            Ok::<_, anyhow::Error>((gateway, SocketAddr::new(external_ip, port)))
        })
        .await
        .context("UPnP task panicked")??;

        let mut mapped = self
            .mapped
            .lock()
            .map_err(|_| anyhow!("port mapping lock poisoned"))?;
        *mapped = Some((gateway, port));

        Ok(external)
    }

    async fn release_mapping(&self) -> Result<()> {
        let taken = self
            .mapped
            .lock()
            .map_err(|_| anyhow!("port mapping lock poisoned"))?
            .take();
        let Some((gateway, port)) = taken else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || gateway.remove_port(PortMappingProtocol::TCP, port))
            .await
            .context("UPnP task panicked")?
            .context("Failed to remove UPnP port mapping")?;

        tracing::info!("Released UPnP mapping for port {port}");
        Ok(())
    }
}
