// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Volary state service: owner of the per-connection session state machine,
//! the at-least-once delivery protocol, and the distributed-cache state
//! behind it. Gateways are stateless; everything a session *is* lives here.

pub mod business;
pub mod manager;
pub mod rpc;
pub mod server;
pub mod session;
pub mod test_support;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use volary_common::cache::{RedisStore, Store};
use volary_common::config::{CacheConfig, StateConfig};
use volary_common::timingwheel::TimingWheel;

use crate::business::{Business, EchoBusiness};
use crate::manager::SessionManager;
use crate::rpc::{GatewayTransport, GrpcGatewayTransport};
use crate::server::{spawn_cmd_dispatcher, StateGrpc};

/// Run the state service until shutdown.
pub async fn run(
    cfg: StateConfig,
    cache: CacheConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(RedisStore::connect(&cache).await?);
    let gateway: Arc<dyn GatewayTransport> =
        Arc::new(GrpcGatewayTransport::new(cfg.rpc_timeout()));
    run_with(cfg, store, gateway, Arc::new(EchoBusiness), shutdown).await
}

/// Run with injected store, gateway transport, and business hook.
pub async fn run_with(
    cfg: StateConfig,
    store: Arc<dyn Store>,
    gateway: Arc<dyn GatewayTransport>,
    business: Arc<dyn Business>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let wheel = Arc::new(TimingWheel::with_defaults());
    let mgr = SessionManager::new(
        cfg.clone(),
        store,
        gateway,
        Arc::clone(&wheel),
        tokio::runtime::Handle::current(),
    );

    // reclaim sessions that survived the previous process
    mgr.recover().await?;

    let (cmd_tx, cmd_rx) = mpsc::channel(cfg.cmd_channel_size.max(1));
    let dispatcher = spawn_cmd_dispatcher(cmd_rx, Arc::clone(&mgr), business);

    let grpc = StateGrpc::new(cmd_tx);
    let addr: std::net::SocketAddr = format!("{}:{}", cfg.host, cfg.rpc_port).parse()?;
    tracing::info!(%addr, "state RPC surface listening");
    grpc.into_router().serve_with_shutdown(addr, shutdown.cancelled_owned()).await?;

    dispatcher.abort();
    wheel.shutdown();
    Ok(())
}
