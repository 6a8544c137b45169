//! Local server bootstrap utilities
//!
//! The listener binds all interfaces so other hosts on the LAN can download.

use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// Reserved TEST-NET blocks; nothing routes them specially, so the source
/// address picked for them is the one on the default route.
const TEST_NETWORKS: [Ipv4Addr; 3] = [
    Ipv4Addr::new(192, 0, 2, 0),
    Ipv4Addr::new(198, 51, 100, 0),
    Ipv4Addr::new(203, 0, 113, 0),
];

fn bind_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], port))
}

/// Starts the Axum server in the background and returns `(bound_port, handle)`.
///
/// Port 0 lets the OS pick.
pub async fn start_local_server(
    app: axum::Router,
    port: u16,
) -> Result<(u16, axum_server::Handle)> {
    let listener = std::net::TcpListener::bind(bind_addr(port)).context(
        "Failed to bind to port - port already in use.\n\n\
         Is another ffs instance running?\n\
         Or is another service using this port?",
    )?;

    listener
        .set_nonblocking(true)
        .context("Failed to set listener to non-blocking mode")?;

    let port = listener.local_addr()?.port();

    let server_handle = axum_server::Handle::new();
    let server_handle_clone = server_handle.clone();

    tokio::spawn(async move {
        if let Err(e) = axum_server::from_tcp(listener)
            .handle(server_handle_clone)
            .serve(app.into_make_service())
            .await
        {
            tracing::error!("Server error: {e}");
        }
    });

    Ok((port, server_handle))
}

/// Best guess at the address other hosts can reach us on.
///
/// Probes several test networks and prefers an address seen twice, in case
/// the machine sits inside one of them.
pub fn discover_local_address() -> Result<IpAddr> {
    let mut candidates = Vec::with_capacity(TEST_NETWORKS.len());

    for network in TEST_NETWORKS {
        let socket =
            UdpSocket::bind("0.0.0.0:0").context("Failed to bind socket for IP detection")?;
        socket
            .connect((network, 80))
            .context("Failed to connect socket for IP detection")?;
        let ip = socket
            .local_addr()
            .context("Failed to get local address")?
            .ip();

        if candidates.contains(&ip) {
            return Ok(ip);
        }
        candidates.push(ip);
    }

    candidates
        .first()
        .copied()
        .context("No local address candidates")
}
