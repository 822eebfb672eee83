// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Client SDK for the volary backbone.
//!
//! [`Chat`] speaks the framed `MsgCmd` protocol against a gateway: login,
//! automatic heartbeats, at-least-once uplinks with client-assigned
//! `clientID`s, automatic ACK of downstream pushes, and reconnection that
//! carries the prior connID through the grace window.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use volary_common::error::Error;
use volary_common::framing;
use volary_common::proto::{
    decode_cmd, decode_payload, encode_cmd, AckMsg, CmdType, HeartbeatMsg, HeartbeatMsgHead,
    LoginMsg, LoginMsgHead, PushMsg, ReConnMsg, ReConnMsgHead, UpMsg, UpMsgHead,
};

const ACK_DEADLINE: Duration = Duration::from_secs(5);
const UP_ATTEMPTS: usize = 3;

pub struct Chat {
    addr: String,
    max_frame_bytes: usize,
    conn_id: Arc<AtomicU64>,
    did: u64,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    acks: Mutex<mpsc::Receiver<AckMsg>>,
    pushes: Mutex<mpsc::Receiver<PushMsg>>,
    ack_tx: mpsc::Sender<AckMsg>,
    push_tx: mpsc::Sender<PushMsg>,
    /// Next clientID per sessionID; advanced only on a confirmed ACK.
    client_ids: Mutex<HashMap<u64, u64>>,
    reader: Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown: CancellationToken,
    ack_deadline: Duration,
}

impl Chat {
    /// Open the socket and start the receive loop. `login` must follow.
    pub async fn connect(addr: &str, max_frame_bytes: usize) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();

        let (ack_tx, ack_rx) = mpsc::channel(64);
        let (push_tx, push_rx) = mpsc::channel(64);
        let chat = Self {
            addr: addr.to_owned(),
            max_frame_bytes,
            conn_id: Arc::new(AtomicU64::new(0)),
            did: 0,
            writer: Arc::new(Mutex::new(write_half)),
            acks: Mutex::new(ack_rx),
            pushes: Mutex::new(push_rx),
            ack_tx,
            push_tx,
            client_ids: Mutex::new(HashMap::new()),
            reader: Mutex::new(None),
            shutdown: CancellationToken::new(),
            ack_deadline: ACK_DEADLINE,
        };
        chat.spawn_reader(read_half).await;
        Ok(chat)
    }

    fn spawn_reader_task(&self, read_half: OwnedReadHalf) -> tokio::task::JoinHandle<()> {
        let conn_id = Arc::clone(&self.conn_id);
        let writer = Arc::clone(&self.writer);
        let ack_tx = self.ack_tx.clone();
        let push_tx = self.push_tx.clone();
        let max = self.max_frame_bytes;
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut read_half = read_half;
            loop {
                let frame = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    frame = framing::read_frame(&mut read_half, max) => frame,
                };
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(Error::PeerClosed) => return,
                    Err(e) => {
                        tracing::debug!(err = %e, "receive loop stopped");
                        return;
                    }
                };
                let Ok(cmd) = decode_cmd(&frame) else {
                    continue;
                };
                match cmd.r#type() {
                    CmdType::Ack => {
                        let Ok(ack) = decode_payload::<AckMsg>(&cmd) else { continue };
                        // login-class ACKs carry our server-assigned connID
                        if matches!(ack.r#type(), CmdType::Login | CmdType::ReConn)
                            && ack.code == 0
                        {
                            conn_id.store(ack.conn_id, Ordering::Release);
                        }
                        let _ = ack_tx.send(ack).await;
                    }
                    CmdType::Push => {
                        let Ok(push) = decode_payload::<PushMsg>(&cmd) else { continue };
                        // ack first so the server stops retransmitting
                        let ack = AckMsg {
                            r#type: CmdType::Push as i32,
                            conn_id: conn_id.load(Ordering::Acquire),
                            session_id: push.session_id,
                            msg_id: push.msg_id,
                            ..AckMsg::default()
                        };
                        let payload = encode_cmd(CmdType::Ack, &ack);
                        let mut w = writer.lock().await;
                        if let Err(e) = framing::write_frame(&mut *w, &payload, max).await {
                            tracing::debug!(err = %e, "push ack failed");
                        }
                        drop(w);
                        let _ = push_tx.send(push).await;
                    }
                    other => {
                        tracing::debug!(?other, "unexpected downstream command");
                    }
                }
            }
        })
    }

    async fn spawn_reader(&self, read_half: OwnedReadHalf) {
        let mut reader = self.reader.lock().await;
        if let Some(prev) = reader.take() {
            prev.abort();
        }
        *reader = Some(self.spawn_reader_task(read_half));
    }

    async fn send(&self, ty: CmdType, payload: &impl prost::Message) -> Result<(), Error> {
        let data = encode_cmd(ty, payload);
        let mut writer = self.writer.lock().await;
        framing::write_frame(&mut *writer, &data, self.max_frame_bytes).await
    }

    /// Tighten the per-ACK wait, mainly for tests and the perf harness.
    pub fn set_ack_deadline(&mut self, deadline: Duration) {
        self.ack_deadline = deadline;
    }

    async fn wait_ack(&self, want: CmdType) -> Result<AckMsg, Error> {
        let mut acks = self.acks.lock().await;
        loop {
            let ack = tokio::time::timeout(self.ack_deadline, acks.recv())
                .await
                .map_err(|_| Error::RpcDeadline)?
                .ok_or(Error::PeerClosed)?;
            if ack.r#type() == want {
                return Ok(ack);
            }
        }
    }

    /// Log in with the device ID; learns this connection's connID.
    pub async fn login(&mut self, did: u64) -> Result<AckMsg, Error> {
        self.did = did;
        let login = LoginMsg { head: Some(LoginMsgHead { device_id: did }) };
        self.send(CmdType::Login, &login).await?;
        self.wait_ack(CmdType::Login).await
    }

    /// Spawn the periodic heartbeat. Runs until the client is dropped.
    pub fn start_heartbeat(&self, period: Duration) {
        let writer = Arc::clone(&self.writer);
        let did = self.did;
        let max = self.max_frame_bytes;
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let heartbeat = HeartbeatMsg { head: Some(HeartbeatMsgHead { device_id: did }) };
            let payload = encode_cmd(CmdType::Heartbeat, &heartbeat);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(period) => {}
                }
                let mut w = writer.lock().await;
                if let Err(e) = framing::write_frame(&mut *w, &payload, max).await {
                    tracing::debug!(err = %e, "heartbeat failed");
                }
            }
        });
    }

    /// Send one uplink, retrying with the same clientID until the server
    /// ACKs it (the server deduplicates). Returns the clientID used.
    pub async fn send_up(&self, session_id: u64, body: &[u8]) -> Result<u64, Error> {
        let client_id = {
            let ids = self.client_ids.lock().await;
            ids.get(&session_id).copied().unwrap_or(0)
        };
        let up = UpMsg {
            head: Some(UpMsgHead { client_id, session_id }),
            up_msg_body: body.to_vec(),
        };

        for attempt in 0..UP_ATTEMPTS {
            self.send(CmdType::Up, &up).await?;
            match self.wait_ack(CmdType::Up).await {
                Ok(ack) if ack.client_id == client_id && ack.code == 0 => {
                    self.client_ids.lock().await.insert(session_id, client_id + 1);
                    return Ok(client_id);
                }
                Ok(_) | Err(Error::RpcDeadline) => {
                    tracing::debug!(attempt, client_id, "uplink unconfirmed; retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::RpcDeadline)
    }

    /// Next downstream push (already ACKed on the wire).
    pub async fn recv_push(&self) -> Option<PushMsg> {
        self.pushes.lock().await.recv().await
    }

    /// The server-assigned connID of the current connection.
    pub fn conn_id(&self) -> u64 {
        self.conn_id.load(Ordering::Acquire)
    }

    /// Open a fresh socket and resume the session under a new connID by
    /// presenting the old one inside the grace window.
    pub async fn reconnect(&mut self) -> Result<AckMsg, Error> {
        let old_conn_id = self.conn_id();
        let stream = TcpStream::connect(&self.addr).await?;
        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = write_half;
        self.spawn_reader(read_half).await;

        let reconn = ReConnMsg { head: Some(ReConnMsgHead { conn_id: old_conn_id }) };
        self.send(CmdType::ReConn, &reconn).await?;
        let ack = self.wait_ack(CmdType::ReConn).await?;
        if ack.code != 0 {
            return Err(Error::NoSuchConn(old_conn_id));
        }
        Ok(ack)
    }
}

impl Drop for Chat {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
#[path = "chat_tests.rs"]
mod tests;
