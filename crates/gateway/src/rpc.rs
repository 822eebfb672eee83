// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Client side of the gateway→state RPC hop.
//!
//! `StateTransport` is the seam: the production implementation dials the
//! state service over tonic; tests substitute a recorder.

use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::Channel;

use volary_common::error::Error;
use volary_common::proto::state_client::StateClient;
use volary_common::proto::StateRequest;

#[async_trait]
pub trait StateTransport: Send + Sync + 'static {
    /// Forward one uplink frame.
    async fn send_msg(&self, endpoint: &str, conn_id: u64, payload: Vec<u8>)
        -> Result<(), Error>;

    /// Report a gateway-observed disconnect.
    async fn cancel_conn(
        &self,
        endpoint: &str,
        conn_id: u64,
        payload: Vec<u8>,
    ) -> Result<(), Error>;
}

pub struct GrpcStateTransport {
    client: StateClient<Channel>,
    timeout: Duration,
}

impl GrpcStateTransport {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, Error> {
        let channel = Channel::from_shared(url.to_owned())
            .map_err(|e| Error::ProtocolViolation(format!("bad state endpoint: {e}")))?
            .connect()
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
        Ok(Self { client: StateClient::new(channel), timeout })
    }

    async fn call<F, Fut>(&self, f: F) -> Result<(), Error>
    where
        F: FnOnce(StateClient<Channel>) -> Fut,
        Fut: std::future::Future<
            Output = Result<tonic::Response<volary_common::proto::StateResponse>, tonic::Status>,
        >,
    {
        let client = self.client.clone();
        match tokio::time::timeout(self.timeout, f(client)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(status)) => Err(Error::Io(std::io::Error::other(status.to_string()))),
            Err(_) => Err(Error::RpcDeadline),
        }
    }
}

#[async_trait]
impl StateTransport for GrpcStateTransport {
    async fn send_msg(
        &self,
        endpoint: &str,
        conn_id: u64,
        payload: Vec<u8>,
    ) -> Result<(), Error> {
        let request = StateRequest { endpoint: endpoint.to_owned(), conn_id, data: payload };
        self.call(|mut client| async move { client.send_msg(request).await }).await
    }

    async fn cancel_conn(
        &self,
        endpoint: &str,
        conn_id: u64,
        payload: Vec<u8>,
    ) -> Result<(), Error> {
        let request = StateRequest { endpoint: endpoint.to_owned(), conn_id, data: payload };
        self.call(|mut client| async move { client.cancel_conn(request).await }).await
    }
}
