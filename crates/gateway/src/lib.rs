// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Volary gateway: terminates client TCP sessions on an epoll reactor and
//! bridges them to the state service over the two-hop RPC fabric. The
//! gateway holds no session state; it maps `connID`s to sockets and moves
//! frames.

pub mod conn;
pub mod reactor;
pub mod rpc;
pub mod server;
pub mod workpool;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use volary_common::config::GatewayConfig;
use volary_common::discovery::{Discovery, EndpointStats, GatewayEndpoint};

use crate::conn::ConnRegistry;
use crate::reactor::Reactor;
use crate::rpc::{GrpcStateTransport, StateTransport};
use crate::server::{spawn_cmd_consumer, FrameHandler, GatewayGrpc, GatewayMetrics};
use crate::workpool::WorkerPool;

const DISCOVERY_REFRESH: Duration = Duration::from_secs(10);

/// Run the gateway until shutdown.
pub async fn run(
    cfg: GatewayConfig,
    discovery: Arc<dyn Discovery>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let state: Arc<dyn StateTransport> =
        Arc::new(GrpcStateTransport::connect(&cfg.state_endpoint, cfg.rpc_timeout()).await?);
    run_with_transport(cfg, discovery, state, shutdown).await
}

/// Run with an injected state transport (tests use a recorder).
pub async fn run_with_transport(
    cfg: GatewayConfig,
    discovery: Arc<dyn Discovery>,
    state: Arc<dyn StateTransport>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let registry = Arc::new(ConnRegistry::new());
    let pool = Arc::new(WorkerPool::start(
        cfg.worker_pool_size,
        cfg.worker_queue_size,
        &tokio::runtime::Handle::current(),
    ));
    let metrics = Arc::new(GatewayMetrics::default());

    let handler = Arc::new(FrameHandler::new(
        Arc::clone(&pool),
        state,
        cfg.endpoint.clone(),
        Arc::clone(&metrics),
        tokio::runtime::Handle::current(),
    ));
    let mut reactor = Reactor::start(&cfg, Arc::clone(&registry), handler)?;
    tracing::info!(addr = %reactor.local_addr(), "gateway accepting client connections");

    // Periodic liveness registration for the ipconf dispatcher.
    let tcp_num = reactor.tcp_num_counter();
    let endpoint = cfg.endpoint.clone();
    let register_metrics = Arc::clone(&metrics);
    let register_shutdown = shutdown.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = register_shutdown.cancelled() => break,
                _ = tokio::time::sleep(DISCOVERY_REFRESH) => {}
            }
            let stats = EndpointStats {
                connect_num: tcp_num.load(Ordering::Acquire) as f64,
                message_bytes: register_metrics.message_bytes.load(Ordering::Relaxed) as f64,
            };
            let endpoint = GatewayEndpoint { addr: endpoint.clone(), stats };
            if let Err(e) = discovery.register(endpoint).await {
                tracing::warn!(err = %e, "discovery registration failed");
            }
        }
    });

    let (cmd_tx, cmd_rx) = mpsc::channel(cfg.cmd_channel_size.max(1));
    let consumer = spawn_cmd_consumer(
        cmd_rx,
        Arc::clone(&pool),
        Arc::clone(&registry),
        Arc::clone(&metrics),
        cfg.max_frame_bytes,
    );

    let grpc = GatewayGrpc::new(registry, cmd_tx, cfg.rpc_timeout());
    let addr: std::net::SocketAddr = format!("{}:{}", cfg.host, cfg.rpc_port).parse()?;
    tracing::info!(%addr, "gateway RPC surface listening");
    grpc.into_router().serve_with_shutdown(addr, shutdown.cancelled_owned()).await?;

    reactor.shutdown();
    consumer.abort();
    Ok(())
}
