// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Builders and doubles for session-machine tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use volary_common::cache::MemoryStore;
use volary_common::config::StateConfig;
use volary_common::error::Error;
use volary_common::proto::{decode_cmd, decode_payload, AckMsg, CmdType, MsgCmd, PushMsg};
use volary_common::timingwheel::TimingWheel;

use crate::manager::SessionManager;
use crate::rpc::GatewayTransport;

/// Everything the state service sent towards a gateway.
#[derive(Debug)]
pub enum GatewayCall {
    Push { endpoint: String, conn_id: u64, cmd: MsgCmd },
    DelConn { endpoint: String, conn_id: u64 },
}

impl GatewayCall {
    /// Decode the inner ACK if this call pushes one.
    pub fn as_ack(&self) -> Option<AckMsg> {
        match self {
            Self::Push { cmd, .. } if cmd.r#type() == CmdType::Ack => decode_payload(cmd).ok(),
            _ => None,
        }
    }

    /// Decode the inner `PushMsg` if this call pushes one.
    pub fn as_push_msg(&self) -> Option<PushMsg> {
        match self {
            Self::Push { cmd, .. } if cmd.r#type() == CmdType::Push => decode_payload(cmd).ok(),
            _ => None,
        }
    }
}

pub struct MockGateway {
    tx: mpsc::UnboundedSender<GatewayCall>,
}

#[async_trait]
impl GatewayTransport for MockGateway {
    async fn push(&self, endpoint: &str, conn_id: u64, payload: Vec<u8>) -> Result<(), Error> {
        let cmd = decode_cmd(&payload)?;
        let _ = self.tx.send(GatewayCall::Push { endpoint: endpoint.to_owned(), conn_id, cmd });
        Ok(())
    }

    async fn del_conn(
        &self,
        endpoint: &str,
        conn_id: u64,
        _payload: Vec<u8>,
    ) -> Result<(), Error> {
        let _ = self.tx.send(GatewayCall::DelConn { endpoint: endpoint.to_owned(), conn_id });
        Ok(())
    }
}

/// Millisecond-scale timers so state-machine tests run fast.
pub fn fast_config() -> StateConfig {
    StateConfig {
        heartbeat_timeout_ms: 100,
        reconn_timeout_ms: 200,
        retransmit_ms: 50,
        ..StateConfig::default()
    }
}

/// Timers far in the future, for tests that drive transitions explicitly.
pub fn quiet_config() -> StateConfig {
    StateConfig {
        heartbeat_timeout_ms: 60_000,
        reconn_timeout_ms: 60_000,
        retransmit_ms: 60_000,
        ..StateConfig::default()
    }
}

pub struct Harness {
    pub mgr: Arc<SessionManager>,
    pub store: Arc<MemoryStore>,
    pub calls: mpsc::UnboundedReceiver<GatewayCall>,
    // keeps the wheel driver alive for the test's duration
    pub wheel: Arc<TimingWheel>,
}

/// Build a manager over a `MemoryStore` and a recording gateway. Must be
/// called from a tokio runtime.
pub fn harness(cfg: StateConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let (tx, calls) = mpsc::unbounded_channel();
    let wheel = Arc::new(TimingWheel::with_defaults());
    let mgr = SessionManager::new(
        cfg,
        Arc::<MemoryStore>::clone(&store),
        Arc::new(MockGateway { tx }),
        Arc::clone(&wheel),
        tokio::runtime::Handle::current(),
    );
    Harness { mgr, store, calls, wheel }
}
