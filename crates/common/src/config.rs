// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Typed settings for every volary service, loaded from one YAML file.
//!
//! Each service reads its own section; unknown sections are ignored so one
//! file can drive a whole deployment. Every field has a default, so an empty
//! file is a valid local configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub gateway: GatewayConfig,
    pub state: StateConfig,
    pub ipconf: IpconfConfig,
    pub cache: CacheConfig,
    pub discovery: DiscoveryConfig,
}

impl Settings {
    /// Load settings from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_yaml::from_str(&contents)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host the client-facing TCP listener binds on.
    pub host: String,
    /// Port of the client-facing TCP listener.
    pub port: u16,
    /// Port of the gateway's gRPC surface (DelConn/Push).
    pub rpc_port: u16,
    /// Endpoint advertised to the state service; must route back to
    /// `rpc_port` of this process.
    pub endpoint: String,
    /// URL of the state service's gRPC surface.
    pub state_endpoint: String,
    /// Admission ceiling for concurrently open client sockets.
    pub max_tcp_num: i64,
    /// Reactor shard count; 0 means one per CPU.
    pub reactor_shards: usize,
    /// Accept thread count; 0 means one per CPU.
    pub accept_threads: usize,
    /// Bound of each acceptor-to-shard handoff channel.
    pub reactor_channel_size: usize,
    /// Events fetched per epoll_wait call.
    pub epoll_wait_queue_size: usize,
    /// Number of worker tasks draining the frame/command queue.
    pub worker_pool_size: usize,
    /// Bound of the worker task queue.
    pub worker_queue_size: usize,
    /// Bound of the RPC command channel.
    pub cmd_channel_size: usize,
    pub max_frame_bytes: usize,
    pub rpc_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8900,
            rpc_port: 8901,
            endpoint: "127.0.0.1:8901".to_owned(),
            state_endpoint: "http://127.0.0.1:8902".to_owned(),
            max_tcp_num: 60_000,
            reactor_shards: 0,
            accept_threads: 0,
            reactor_channel_size: 1024,
            epoll_wait_queue_size: 1024,
            worker_pool_size: 64,
            worker_queue_size: 4096,
            cmd_channel_size: 1024,
            max_frame_bytes: crate::framing::DEFAULT_MAX_FRAME_BYTES,
            rpc_timeout_ms: 100,
        }
    }
}

impl GatewayConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Host the gRPC surface binds on.
    pub host: String,
    pub rpc_port: u16,
    /// Number of login slots the live-session set is sharded into.
    pub login_slot_count: u64,
    /// Bound of the RPC command channel.
    pub cmd_channel_size: usize,
    pub heartbeat_timeout_ms: u64,
    pub reconn_timeout_ms: u64,
    pub retransmit_ms: u64,
    pub rpc_timeout_ms: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            rpc_port: 8902,
            login_slot_count: 16,
            cmd_channel_size: 1024,
            heartbeat_timeout_ms: 5_000,
            reconn_timeout_ms: 10_000,
            retransmit_ms: 100,
            rpc_timeout_ms: 100,
        }
    }
}

impl StateConfig {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn reconn_timeout(&self) -> Duration {
        Duration::from_millis(self.reconn_timeout_ms)
    }

    pub fn retransmit_interval(&self) -> Duration {
        Duration::from_millis(self.retransmit_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IpconfConfig {
    pub host: String,
    pub port: u16,
    /// How many gateway endpoints `/ip/list` returns.
    pub top_n: usize,
    /// Samples kept per endpoint sliding window.
    pub window_size: usize,
}

impl Default for IpconfConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_owned(), port: 8903, top_n: 5, window_size: 5 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache cluster endpoints; the first reachable one is used.
    pub endpoints: Vec<String>,
    pub conn_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { endpoints: vec!["redis://127.0.0.1:6379".to_owned()], conn_timeout_ms: 2_000 }
    }
}

impl CacheConfig {
    pub fn conn_timeout(&self) -> Duration {
        Duration::from_millis(self.conn_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Statically configured gateway endpoints (the config-backed
    /// `Discovery` implementation).
    pub gateways: Vec<String>,
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
