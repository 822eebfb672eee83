// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! The authoritative session table and its cache coordination: login,
//! logout, reconnect, uplink idempotency, the at-most-one outstanding
//! downlink push, and boot-time reclamation of surviving sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use prost::Message;

use volary_common::cache::{
    last_msg_key, login_slot_key, max_client_id_key, parse_slot_member, slot_for, slot_member,
    Store, TTL_7D,
};
use volary_common::config::StateConfig;
use volary_common::error::Error;
use volary_common::proto::{encode_cmd, CmdType, PushMsg};
use volary_common::router;
use volary_common::timingwheel::TimingWheel;

use crate::rpc::GatewayTransport;
use crate::session::ConnState;

pub struct SessionManager {
    cfg: StateConfig,
    store: Arc<dyn Store>,
    gateway: Arc<dyn GatewayTransport>,
    wheel: Arc<TimingWheel>,
    runtime: tokio::runtime::Handle,
    table: RwLock<HashMap<u64, Arc<ConnState>>>,
    next_msg_id: AtomicU64,
    // handed to timer callbacks; upgrades fail only during final drop
    self_ref: Weak<SessionManager>,
}

impl SessionManager {
    pub fn new(
        cfg: StateConfig,
        store: Arc<dyn Store>,
        gateway: Arc<dyn GatewayTransport>,
        wheel: Arc<TimingWheel>,
        runtime: tokio::runtime::Handle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            cfg,
            store,
            gateway,
            wheel,
            runtime,
            table: RwLock::new(HashMap::new()),
            next_msg_id: AtomicU64::new(0),
            self_ref: self_ref.clone(),
        })
    }

    fn strong(&self) -> Option<Arc<Self>> {
        self.self_ref.upgrade()
    }

    pub(crate) fn cfg(&self) -> &StateConfig {
        &self.cfg
    }

    pub(crate) fn wheel(&self) -> &TimingWheel {
        &self.wheel
    }

    pub(crate) fn gateway(&self) -> &dyn GatewayTransport {
        self.gateway.as_ref()
    }

    pub fn session(&self, conn_id: u64) -> Option<Arc<ConnState>> {
        self.table.read().get(&conn_id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.table.read().len()
    }

    /// Server-assigned msgID for business-layer pushes.
    pub fn next_msg_id(&self) -> u64 {
        self.next_msg_id.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn insert_session(&self, state: Arc<ConnState>) {
        // at most one ConnState per connID: a replaced entry loses its
        // timers before it is dropped
        if let Some(prev) = self.table.write().insert(state.conn_id(), state) {
            prev.stop_all();
        }
    }

    fn remove_session(&self, conn_id: u64) -> Option<Arc<ConnState>> {
        self.table.write().remove(&conn_id)
    }

    /// NEW -> LIVE: create the session, arm the heartbeat window, claim the
    /// login slot, and write the router record.
    pub async fn login(&self, endpoint: &str, did: u64, conn_id: u64) -> Result<(), Error> {
        let Some(mgr) = self.strong() else {
            return Ok(());
        };
        let state = Arc::new(ConnState::new(conn_id, did, endpoint));
        state.reset_heart_timer(&mgr);

        let slot = slot_for(conn_id, self.cfg.login_slot_count);
        self.store.sadd(&login_slot_key(slot), &slot_member(did, conn_id)).await?;
        router::add_record(self.store.as_ref(), did, endpoint, conn_id).await?;

        self.insert_session(state);
        tracing::info!(conn_id, did, endpoint, "session login");
        Ok(())
    }

    /// Recovered login: the cache entries already exist, no heartbeat timer
    /// is armed, and a pending last-message re-arms the retransmit timer.
    pub async fn relogin(&self, endpoint: &str, did: u64, conn_id: u64) {
        let Some(mgr) = self.strong() else {
            return;
        };
        let state = Arc::new(ConnState::new(conn_id, did, endpoint));
        self.insert_session(state);
        match self.get_last_msg(conn_id).await {
            Ok(Some(push)) => {
                if let Some(state) = self.session(conn_id) {
                    state.set_msg_timer(&mgr, push.session_id, push.msg_id);
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(conn_id, err = %e, "last-message restore failed");
            }
        }
        tracing::info!(conn_id, did, "session recovered");
    }

    /// Any -> DEAD: stop timers, run the atomic cache cleanup, tell the
    /// gateway to drop the socket, and forget the session. Unknown connIDs
    /// are a no-op.
    pub async fn logout(&self, conn_id: u64) -> Result<(), Error> {
        let Some(state) = self.remove_session(conn_id) else {
            return Ok(());
        };
        state.stop_all();

        if let Err(e) = self
            .store
            .cleanup_connection(conn_id, state.did(), self.cfg.login_slot_count)
            .await
        {
            // leave the keys for the boot-time reclaimer on next restart
            tracing::warn!(conn_id, err = %e, "cache cleanup failed; state left for recovery");
        }
        if let Err(e) = self.gateway.del_conn(state.endpoint(), conn_id, Vec::new()).await {
            tracing::debug!(conn_id, err = %e, "gateway disconnect notify failed");
        }
        tracing::info!(conn_id, did = state.did(), "session logout");
        Ok(())
    }

    /// GRACE -> LIVE under a fresh connID. Fails with `NoSuchConn` when the
    /// old session already died (grace expired).
    pub async fn reconn(
        &self,
        endpoint: &str,
        old_conn_id: u64,
        new_conn_id: u64,
    ) -> Result<(), Error> {
        let old = self.session(old_conn_id).ok_or(Error::NoSuchConn(old_conn_id))?;
        let did = old.did();
        self.logout(old_conn_id).await?;
        self.login(endpoint, did, new_conn_id).await
    }

    /// LIVE -> LIVE on heartbeat. Returns whether the session exists.
    pub fn reset_heart_timer(&self, conn_id: u64) -> bool {
        let Some(mgr) = self.strong() else {
            return false;
        };
        match self.session(conn_id) {
            Some(state) => {
                state.reset_heart_timer(&mgr);
                true
            }
            None => false,
        }
    }

    /// Heartbeat window elapsed: LIVE -> GRACE.
    pub(crate) fn heartbeat_expired(&self, conn_id: u64) {
        let Some(mgr) = self.strong() else {
            return;
        };
        if let Some(state) = self.session(conn_id) {
            tracing::debug!(conn_id, "heartbeat lost; entering grace");
            state.arm_reconn_timer(&mgr);
        }
    }

    /// Grace window elapsed: GRACE -> DEAD.
    pub(crate) fn grace_expired(&self, conn_id: u64) {
        let Some(mgr) = self.strong() else {
            return;
        };
        self.runtime.spawn(async move {
            if let Err(e) = mgr.logout(conn_id).await {
                tracing::warn!(conn_id, err = %e, "grace logout failed");
            }
        });
    }

    /// Retransmit timer fired; re-send the outstanding push, if any.
    pub(crate) fn retransmit_due(&self, conn_id: u64) {
        let Some(mgr) = self.strong() else {
            return;
        };
        self.runtime.spawn(async move {
            mgr.repush(conn_id).await;
        });
    }

    /// Uplink idempotency: accept the frame iff `client_id` equals the
    /// stored counter (compare-and-increment, atomic in the cache).
    pub async fn accept_up(
        &self,
        conn_id: u64,
        session_id: u64,
        client_id: u64,
    ) -> Result<bool, Error> {
        let slot = slot_for(conn_id, self.cfg.login_slot_count);
        let key = max_client_id_key(slot, conn_id, session_id);
        let verdict = self.store.compare_and_incr(&key, client_id, TTL_7D).await?;
        Ok(verdict > 0)
    }

    /// Downlink send: persist the last-message record, take the
    /// `msg_timer_lock`, arm the retransmit timer, then push.
    pub async fn push_down(&self, conn_id: u64, push: PushMsg) -> Result<(), Error> {
        let Some(mgr) = self.strong() else {
            return Ok(());
        };
        let state = self.session(conn_id).ok_or(Error::NoSuchConn(conn_id))?;
        let slot = slot_for(conn_id, self.cfg.login_slot_count);
        let key = last_msg_key(slot, conn_id);
        self.store.set_bytes(&key, &push.encode_to_vec(), Some(TTL_7D)).await?;
        state.set_msg_timer(&mgr, push.session_id, push.msg_id);

        let payload = encode_cmd(CmdType::Push, &push);
        if let Err(e) = self.gateway.push(state.endpoint(), conn_id, payload).await {
            // the retransmit timer re-sends it
            tracing::debug!(conn_id, err = %e, "push send failed");
        }
        Ok(())
    }

    /// Client ACK for a push: verify against the lock, stop the timer, and
    /// delete the last-message record. Mismatches and repeats are no-ops.
    pub async fn handle_ack(&self, conn_id: u64, session_id: u64, msg_id: u64) -> bool {
        let Some(state) = self.session(conn_id) else {
            return false;
        };
        if !state.ack_matches(session_id, msg_id) {
            return false;
        }
        let slot = slot_for(conn_id, self.cfg.login_slot_count);
        if let Err(e) = self.store.del(&last_msg_key(slot, conn_id)).await {
            tracing::warn!(conn_id, err = %e, "last-message delete failed");
            return false;
        }
        true
    }

    pub(crate) async fn repush(self: Arc<Self>, conn_id: u64) {
        let push = match self.get_last_msg(conn_id).await {
            Ok(Some(push)) => push,
            // ACKed (or never stored): nothing to re-send
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(conn_id, err = %e, "retransmit read failed");
                return;
            }
        };
        let Some(state) = self.session(conn_id) else {
            return;
        };
        let payload = encode_cmd(CmdType::Push, &push);
        if let Err(e) = self.gateway.push(state.endpoint(), conn_id, payload).await {
            tracing::debug!(conn_id, err = %e, "retransmit send failed");
        }
        state.set_msg_timer(&self, push.session_id, push.msg_id);
    }

    pub(crate) async fn get_last_msg(&self, conn_id: u64) -> Result<Option<PushMsg>, Error> {
        let slot = slot_for(conn_id, self.cfg.login_slot_count);
        match self.store.get_bytes(&last_msg_key(slot, conn_id)).await? {
            Some(data) => PushMsg::decode(data.as_slice())
                .map(Some)
                .map_err(|e| Error::ProtocolViolation(e.to_string())),
            None => Ok(None),
        }
    }

    /// Boot-time recovery: enumerate every login slot and rebuild the
    /// in-memory table. Heartbeat timers are not re-armed; a recovered
    /// session lives until its client heartbeats, reconnects, or its next
    /// silence is reported by the gateway.
    pub async fn recover(&self) -> Result<(), Error> {
        let mut recovered = 0usize;
        for slot in 0..self.cfg.login_slot_count {
            let members = self.store.smembers(&login_slot_key(slot)).await?;
            for member in members {
                let Some((did, conn_id)) = parse_slot_member(&member) else {
                    tracing::warn!(slot, member = %member, "malformed login-slot member skipped");
                    continue;
                };
                let endpoint = match router::get_record(self.store.as_ref(), did).await {
                    Ok(Some(record)) => record.endpoint,
                    Ok(None) | Err(_) => String::new(),
                };
                self.relogin(&endpoint, did, conn_id).await;
                recovered += 1;
            }
        }
        if recovered > 0 {
            tracing::info!(recovered, "login-slot recovery complete");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
