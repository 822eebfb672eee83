// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Service discovery, reduced to the one interface the backbone needs:
//! gateways register themselves with liveness stats, and ipconf watches the
//! resulting endpoint set. Pluggable backends (etcd, consul, k8s) implement
//! [`Discovery`]; [`StaticDiscovery`] serves fixed sets from configuration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::DiscoveryConfig;
use crate::error::Error;

/// Liveness metadata a gateway publishes alongside its endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointStats {
    /// Currently open client connections.
    pub connect_num: f64,
    /// Bytes moved through the message pipeline since start.
    pub message_bytes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEndpoint {
    pub addr: String,
    pub stats: EndpointStats,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EndpointEvent {
    /// Endpoint appeared or refreshed its stats.
    Put(GatewayEndpoint),
    /// Endpoint disappeared.
    Del(String),
}

#[async_trait]
pub trait Discovery: Send + Sync + 'static {
    /// Publish (or refresh) this process's endpoint and stats.
    async fn register(&self, endpoint: GatewayEndpoint) -> Result<(), Error>;

    /// Stream of endpoint set changes, starting with the current set.
    async fn watch(&self) -> Result<mpsc::Receiver<EndpointEvent>, Error>;
}

/// Config-backed discovery: a fixed endpoint list, zeroed stats.
pub struct StaticDiscovery {
    endpoints: Vec<String>,
}

impl StaticDiscovery {
    pub fn from_config(cfg: &DiscoveryConfig) -> Self {
        Self { endpoints: cfg.gateways.clone() }
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn register(&self, endpoint: GatewayEndpoint) -> Result<(), Error> {
        tracing::debug!(addr = %endpoint.addr, "static discovery ignores registration");
        Ok(())
    }

    async fn watch(&self) -> Result<mpsc::Receiver<EndpointEvent>, Error> {
        let (tx, rx) = mpsc::channel(self.endpoints.len().max(1));
        for addr in &self.endpoints {
            let event = EndpointEvent::Put(GatewayEndpoint {
                addr: addr.clone(),
                stats: EndpointStats::default(),
            });
            let _ = tx.send(event).await;
        }
        // keep the sender alive so the stream stays open for watchers that
        // treat closure as backend loss
        tokio::spawn(async move {
            tx.closed().await;
        });
        Ok(rx)
    }
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
