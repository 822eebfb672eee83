// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Client side of the state→gateway RPC hop.
//!
//! A session is pinned to the gateway that accepted it, and different
//! sessions live behind different gateways, so the transport keeps one
//! lazily-dialed client per reported endpoint.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tonic::transport::Channel;

use volary_common::error::Error;
use volary_common::proto::gateway_client::GatewayClient;
use volary_common::proto::GatewayRequest;

#[async_trait]
pub trait GatewayTransport: Send + Sync + 'static {
    /// Write `payload` as a framed message on `conn_id`'s socket.
    async fn push(&self, endpoint: &str, conn_id: u64, payload: Vec<u8>) -> Result<(), Error>;

    /// Demand disconnection of `conn_id`.
    async fn del_conn(&self, endpoint: &str, conn_id: u64, payload: Vec<u8>)
        -> Result<(), Error>;
}

pub struct GrpcGatewayTransport {
    clients: RwLock<HashMap<String, GatewayClient<Channel>>>,
    timeout: Duration,
}

impl GrpcGatewayTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { clients: RwLock::new(HashMap::new()), timeout }
    }

    async fn client_for(&self, endpoint: &str) -> Result<GatewayClient<Channel>, Error> {
        if let Some(client) = self.clients.read().await.get(endpoint) {
            return Ok(client.clone());
        }
        let url = if endpoint.contains("://") {
            endpoint.to_owned()
        } else {
            format!("http://{endpoint}")
        };
        let channel = Channel::from_shared(url)
            .map_err(|e| Error::ProtocolViolation(format!("bad gateway endpoint: {e}")))?
            .connect()
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
        let client = GatewayClient::new(channel);
        self.clients.write().await.insert(endpoint.to_owned(), client.clone());
        Ok(client)
    }

    async fn call(
        &self,
        endpoint: &str,
        conn_id: u64,
        payload: Vec<u8>,
        del: bool,
    ) -> Result<(), Error> {
        let mut client = self.client_for(endpoint).await?;
        let request = GatewayRequest { conn_id, data: payload };
        let outcome = tokio::time::timeout(self.timeout, async {
            if del {
                client.del_conn(request).await
            } else {
                client.push(request).await
            }
        })
        .await;
        match outcome {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(status)) => Err(Error::Io(std::io::Error::other(status.to_string()))),
            Err(_) => Err(Error::RpcDeadline),
        }
    }
}

#[async_trait]
impl GatewayTransport for GrpcGatewayTransport {
    async fn push(&self, endpoint: &str, conn_id: u64, payload: Vec<u8>) -> Result<(), Error> {
        self.call(endpoint, conn_id, payload, false).await
    }

    async fn del_conn(
        &self,
        endpoint: &str,
        conn_id: u64,
        payload: Vec<u8>,
    ) -> Result<(), Error> {
        self.call(endpoint, conn_id, payload, true).await
    }
}
