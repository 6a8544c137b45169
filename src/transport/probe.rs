//! Checks whether our own server answers on a given endpoint.
//!
//! A router or some other service may answer on the mapped port, so any
//! response is not enough: the `Server` header has to carry our identity.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::SERVER;

use crate::share::state::Reachability;

pub struct ReachabilityProber {
    client: reqwest::Client,
    identity: String,
}

impl ReachabilityProber {
    pub fn new(timeout: Duration, identity: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .context("Failed to build probe HTTP client")?;

        Ok(Self {
            client,
            identity: identity.into(),
        })
    }

    /// `HEAD http://{endpoint}/`. Any error, timeout or foreign server is `Unavailable`.
    pub async fn probe(&self, endpoint: SocketAddr) -> Reachability {
        let url = format!("http://{endpoint}/");

        let response = match self.client.head(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(%endpoint, error = %err, "Reachability probe failed");
                return Reachability::Unavailable;
            }
        };

        let server = response
            .headers()
            .get(SERVER)
            .and_then(|value| value.to_str().ok());

        if server == Some(self.identity.as_str()) {
            tracing::debug!(%endpoint, "Reachability confirmed");
            Reachability::Available
        } else {
            tracing::debug!(%endpoint, ?server, "Endpoint answered without our identity");
            Reachability::Unavailable
        }
    }
}
