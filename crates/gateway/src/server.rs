// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Gateway service wiring: the reactor-facing frame handler, the RPC
//! command channel, and the `volary.v1.Gateway` gRPC surface.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tonic::{Request, Response, Status};

use volary_common::error::Error;
use volary_common::proto::gateway_server::Gateway;
use volary_common::proto::{code, GatewayRequest, GatewayResponse};

use crate::conn::{ConnRegistry, Connection};
use crate::reactor::ReactorEvents;
use crate::rpc::StateTransport;
use crate::workpool::WorkerPool;

/// Liveness counters published through discovery.
#[derive(Default)]
pub struct GatewayMetrics {
    pub message_bytes: AtomicU64,
}

/// Commands dispatched from the RPC surface through the single-consumer
/// command channel onto the worker pool, by command kind.
pub enum Command {
    Push { conn_id: u64, payload: Vec<u8>, done: oneshot::Sender<i32> },
    DelConn { conn_id: u64 },
}

/// Reactor callbacks: uplink frames become `SendMsg` RPC tasks, disconnects
/// become `CancelConn` notifications.
pub struct FrameHandler {
    pool: Arc<WorkerPool>,
    state: Arc<dyn StateTransport>,
    endpoint: String,
    metrics: Arc<GatewayMetrics>,
    runtime: tokio::runtime::Handle,
}

impl FrameHandler {
    pub fn new(
        pool: Arc<WorkerPool>,
        state: Arc<dyn StateTransport>,
        endpoint: String,
        metrics: Arc<GatewayMetrics>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self { pool, state, endpoint, metrics, runtime }
    }
}

impl ReactorEvents for FrameHandler {
    fn on_frame(&self, conn: &Arc<Connection>, frame: Bytes) {
        self.metrics.message_bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);
        let state = Arc::clone(&self.state);
        let endpoint = self.endpoint.clone();
        let conn_id = conn.id();
        let submitted = self.pool.try_submit(async move {
            if let Err(e) = state.send_msg(&endpoint, conn_id, frame.to_vec()).await {
                tracing::debug!(conn_id, err = %e, "uplink forward failed");
            }
        });
        if let Err(Error::PoolSaturated) = submitted {
            // At-least-once uplink: the client retransmits this frame.
            tracing::warn!(conn_id, "worker pool saturated; uplink frame dropped");
        }
    }

    fn on_disconnect(&self, conn: &Arc<Connection>) {
        let state = Arc::clone(&self.state);
        let endpoint = self.endpoint.clone();
        let conn_id = conn.id();
        self.runtime.spawn(async move {
            if let Err(e) = state.cancel_conn(&endpoint, conn_id, Vec::new()).await {
                tracing::warn!(conn_id, err = %e, "disconnect report failed");
            }
        });
    }
}

/// Single consumer of the command channel; socket work runs on the pool.
pub fn spawn_cmd_consumer(
    mut rx: mpsc::Receiver<Command>,
    pool: Arc<WorkerPool>,
    registry: Arc<ConnRegistry>,
    metrics: Arc<GatewayMetrics>,
    max_frame_bytes: usize,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Push { conn_id, payload, done } => {
                    let registry = Arc::clone(&registry);
                    let metrics = Arc::clone(&metrics);
                    let _ = pool
                        .submit(async move {
                            let status = match registry.get(conn_id) {
                                None => code::NO_SUCH_CONN,
                                Some(conn) => match conn.write_frame(&payload, max_frame_bytes) {
                                    Ok(()) => {
                                        metrics
                                            .message_bytes
                                            .fetch_add(payload.len() as u64, Ordering::Relaxed);
                                        code::OK
                                    }
                                    Err(e) => {
                                        tracing::warn!(conn_id, err = %e, "push write failed");
                                        code::WRITE_FAILED
                                    }
                                },
                            };
                            let _ = done.send(status);
                        })
                        .await;
                }
                Command::DelConn { conn_id } => {
                    let registry = Arc::clone(&registry);
                    let _ = pool
                        .submit(async move {
                            if let Some(conn) = registry.remove(conn_id) {
                                // the owning shard sees EOF and finishes the
                                // epoll/fd-table cleanup
                                conn.close();
                            }
                        })
                        .await;
                }
            }
        }
    })
}

/// gRPC implementation of `volary.v1.Gateway`.
pub struct GatewayGrpc {
    registry: Arc<ConnRegistry>,
    cmd_tx: mpsc::Sender<Command>,
    rpc_timeout: Duration,
}

impl GatewayGrpc {
    pub fn new(
        registry: Arc<ConnRegistry>,
        cmd_tx: mpsc::Sender<Command>,
        rpc_timeout: Duration,
    ) -> Self {
        Self { registry, cmd_tx, rpc_timeout }
    }

    /// Build a [`tonic`] router for this service.
    pub fn into_router(self) -> tonic::transport::server::Router {
        tonic::transport::Server::builder()
            .add_service(volary_common::proto::gateway_server::GatewayServer::new(self))
    }
}

#[tonic::async_trait]
impl Gateway for GatewayGrpc {
    async fn del_conn(
        &self,
        request: Request<GatewayRequest>,
    ) -> Result<Response<GatewayResponse>, Status> {
        let req = request.into_inner();
        tracing::info!(conn_id = req.conn_id, "state requested disconnect");
        let status = match self.cmd_tx.send(Command::DelConn { conn_id: req.conn_id }).await {
            Ok(()) => code::OK,
            Err(_) => code::INTERNAL,
        };
        Ok(Response::new(GatewayResponse { code: status, message: String::new() }))
    }

    async fn push(
        &self,
        request: Request<GatewayRequest>,
    ) -> Result<Response<GatewayResponse>, Status> {
        let req = request.into_inner();
        if self.registry.get(req.conn_id).is_none() {
            return Ok(Response::new(GatewayResponse {
                code: code::NO_SUCH_CONN,
                message: format!("no such connection: {}", req.conn_id),
            }));
        }

        let (done_tx, done_rx) = oneshot::channel();
        let cmd = Command::Push { conn_id: req.conn_id, payload: req.data, done: done_tx };
        if self.cmd_tx.send(cmd).await.is_err() {
            return Ok(Response::new(GatewayResponse {
                code: code::INTERNAL,
                message: "command channel closed".to_owned(),
            }));
        }

        let status = match tokio::time::timeout(self.rpc_timeout, done_rx).await {
            Ok(Ok(status)) => status,
            Ok(Err(_)) => code::INTERNAL,
            Err(_) => code::WRITE_FAILED,
        };
        let message = match status {
            code::OK => String::new(),
            code::NO_SUCH_CONN => "connection closed mid-push".to_owned(),
            _ => "socket write failed".to_owned(),
        };
        Ok(Response::new(GatewayResponse { code: status, message }))
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
