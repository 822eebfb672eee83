// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Volary ipconf: hands clients a ranked list of gateway endpoints. The
//! ranking consumes gateway liveness metadata from service discovery and is
//! served over one HTTP endpoint, `GET /ip/list`.

pub mod domain;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use volary_common::config::IpconfConfig;
use volary_common::discovery::Discovery;

use crate::domain::{Dispatcher, RankedEndpoint};

struct AppState {
    dispatcher: Dispatcher,
    top_n: usize,
}

#[derive(Serialize)]
struct ListResponse {
    code: i32,
    message: String,
    data: Vec<RankedEndpoint>,
}

async fn list_endpoints(State(state): State<Arc<AppState>>) -> Json<ListResponse> {
    let data = state.dispatcher.dispatch(state.top_n);
    Json(ListResponse { code: 0, message: "ok".to_owned(), data })
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ip/list", get(list_endpoints))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the dispatcher until shutdown.
pub async fn run(
    cfg: IpconfConfig,
    discovery: Arc<dyn Discovery>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState { dispatcher: Dispatcher::new(cfg.window_size), top_n: cfg.top_n });

    // feed the candidate table from discovery
    let mut events = discovery.watch().await.map_err(|e| anyhow::anyhow!("{e}"))?;
    let feed_state = Arc::clone(&state);
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            feed_state.dispatcher.apply(event);
        }
        tracing::warn!("discovery stream closed");
    });

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "ipconf listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
