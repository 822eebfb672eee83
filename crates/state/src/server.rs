// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! State service wiring: the `volary.v1.State` gRPC surface, the command
//! channel between RPC handlers and the protocol dispatcher, and the
//! per-command message handlers.

use std::sync::Arc;

use tokio::sync::mpsc;
use tonic::{Request, Response, Status};

use volary_common::error::Error;
use volary_common::proto::state_server::State;
use volary_common::proto::{
    code, decode_cmd, decode_payload, encode_cmd, AckMsg, CmdType, HeartbeatMsg, LoginMsg,
    ReConnMsg, StateRequest, StateResponse, UpMsg,
};

use crate::business::Business;
use crate::manager::SessionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdKind {
    CancelConn,
    SendMsg,
}

/// One gateway-originated command, as queued on the command channel.
pub struct CmdContext {
    pub kind: CmdKind,
    pub endpoint: String,
    pub conn_id: u64,
    pub payload: Vec<u8>,
}

/// gRPC implementation of `volary.v1.State`: handlers validate, enqueue,
/// and reply; the dispatcher does the session work.
pub struct StateGrpc {
    cmd_tx: mpsc::Sender<CmdContext>,
}

impl StateGrpc {
    pub fn new(cmd_tx: mpsc::Sender<CmdContext>) -> Self {
        Self { cmd_tx }
    }

    /// Build a [`tonic`] router for this service.
    pub fn into_router(self) -> tonic::transport::server::Router {
        tonic::transport::Server::builder()
            .add_service(volary_common::proto::state_server::StateServer::new(self))
    }

    async fn enqueue(&self, kind: CmdKind, req: StateRequest) -> StateResponse {
        let cmd = CmdContext {
            kind,
            endpoint: req.endpoint,
            conn_id: req.conn_id,
            payload: req.data,
        };
        match self.cmd_tx.send(cmd).await {
            Ok(()) => StateResponse { code: code::OK, message: String::new() },
            Err(_) => StateResponse {
                code: code::INTERNAL,
                message: "command channel closed".to_owned(),
            },
        }
    }
}

#[tonic::async_trait]
impl State for StateGrpc {
    async fn cancel_conn(
        &self,
        request: Request<StateRequest>,
    ) -> Result<Response<StateResponse>, Status> {
        Ok(Response::new(self.enqueue(CmdKind::CancelConn, request.into_inner()).await))
    }

    async fn send_msg(
        &self,
        request: Request<StateRequest>,
    ) -> Result<Response<StateResponse>, Status> {
        Ok(Response::new(self.enqueue(CmdKind::SendMsg, request.into_inner()).await))
    }
}

/// Single consumer of the command channel; routes by command kind and, for
/// `SendMsg`, by the inner `MsgCmd` type.
pub fn spawn_cmd_dispatcher(
    mut rx: mpsc::Receiver<CmdContext>,
    mgr: Arc<SessionManager>,
    business: Arc<dyn Business>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            match cmd.kind {
                CmdKind::CancelConn => {
                    tracing::info!(conn_id = cmd.conn_id, endpoint = %cmd.endpoint, "gateway reported disconnect");
                    if let Err(e) = mgr.logout(cmd.conn_id).await {
                        tracing::warn!(conn_id = cmd.conn_id, err = %e, "logout failed");
                    }
                }
                CmdKind::SendMsg => {
                    if let Err(e) = dispatch_msg(&mgr, business.as_ref(), &cmd).await {
                        // per-frame failure; other connections are unaffected
                        tracing::warn!(conn_id = cmd.conn_id, err = %e, "uplink frame dropped");
                    }
                }
            }
        }
    })
}

async fn dispatch_msg(
    mgr: &Arc<SessionManager>,
    business: &dyn Business,
    cmd: &CmdContext,
) -> Result<(), Error> {
    let msg = decode_cmd(&cmd.payload)?;
    match msg.r#type() {
        CmdType::Login => handle_login(mgr, cmd, decode_payload(&msg)?).await,
        CmdType::Heartbeat => handle_heartbeat(mgr, cmd, decode_payload(&msg)?),
        CmdType::ReConn => handle_reconn(mgr, cmd, decode_payload(&msg)?).await,
        CmdType::Up => handle_up(mgr, business, cmd, decode_payload(&msg)?).await,
        CmdType::Ack => handle_ack(mgr, cmd, decode_payload(&msg)?).await,
        other => Err(Error::ProtocolViolation(format!("unexpected inner command {other:?}"))),
    }
}

async fn handle_login(
    mgr: &Arc<SessionManager>,
    cmd: &CmdContext,
    login: LoginMsg,
) -> Result<(), Error> {
    let did = login.head.map(|h| h.device_id).unwrap_or_default();
    mgr.login(&cmd.endpoint, did, cmd.conn_id).await?;
    send_ack(mgr, &cmd.endpoint, CmdType::Login, cmd.conn_id, 0, 0, "login ok").await;
    Ok(())
}

fn handle_heartbeat(
    mgr: &Arc<SessionManager>,
    cmd: &CmdContext,
    _heartbeat: HeartbeatMsg,
) -> Result<(), Error> {
    // no heartbeat ACK: silence is cheaper and the client does not need one
    if !mgr.reset_heart_timer(cmd.conn_id) {
        tracing::debug!(conn_id = cmd.conn_id, "heartbeat for unknown session");
    }
    Ok(())
}

async fn handle_reconn(
    mgr: &Arc<SessionManager>,
    cmd: &CmdContext,
    reconn: ReConnMsg,
) -> Result<(), Error> {
    let old_conn_id = reconn.head.map(|h| h.conn_id).unwrap_or_default();
    match mgr.reconn(&cmd.endpoint, old_conn_id, cmd.conn_id).await {
        Ok(()) => {
            send_ack(mgr, &cmd.endpoint, CmdType::ReConn, cmd.conn_id, 0, 0, "reconn ok").await;
            Ok(())
        }
        Err(Error::NoSuchConn(_)) => {
            // grace expired first: the session is dead, the client must
            // perform a fresh login
            send_ack(mgr, &cmd.endpoint, CmdType::ReConn, cmd.conn_id, 0, 1, "reconn failed")
                .await;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn handle_up(
    mgr: &Arc<SessionManager>,
    business: &dyn Business,
    cmd: &CmdContext,
    up: UpMsg,
) -> Result<(), Error> {
    let head = up.head.clone().unwrap_or_default();
    if !mgr.accept_up(cmd.conn_id, head.session_id, head.client_id).await? {
        // duplicate: silently drop, the earlier ACK already covered it
        return Ok(());
    }
    send_ack(mgr, &cmd.endpoint, CmdType::Up, cmd.conn_id, head.client_id, 0, "ok").await;

    let did = mgr.session(cmd.conn_id).map(|s| s.did()).unwrap_or_default();
    if let Some(push) = business.handle_up(did, &up, mgr.next_msg_id()).await {
        mgr.push_down(cmd.conn_id, push).await?;
    }
    Ok(())
}

async fn handle_ack(
    mgr: &Arc<SessionManager>,
    cmd: &CmdContext,
    ack: AckMsg,
) -> Result<(), Error> {
    mgr.handle_ack(cmd.conn_id, ack.session_id, ack.msg_id).await;
    Ok(())
}

/// Reply to the client by pushing an `ACK` frame through its gateway.
async fn send_ack(
    mgr: &Arc<SessionManager>,
    endpoint: &str,
    ack_type: CmdType,
    conn_id: u64,
    client_id: u64,
    status: u32,
    message: &str,
) {
    let ack = AckMsg {
        r#type: ack_type as i32,
        code: status,
        msg: message.to_owned(),
        conn_id,
        session_id: 0,
        msg_id: 0,
        client_id,
    };
    let payload = encode_cmd(CmdType::Ack, &ack);
    if let Err(e) = mgr.gateway().push(endpoint, conn_id, payload).await {
        tracing::debug!(conn_id, err = %e, "ack push failed");
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
