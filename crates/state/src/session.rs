// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Per-connection session state: the three scoped timers and the
//! `msg_timer_lock` guarding the outstanding downstream push.
//!
//! Timer callbacks may still fire once after cancellation (timing-wheel
//! semantics), so every callback re-checks state through the manager before
//! acting; the lock string is the canonical guard for the retransmit path.

use std::sync::Arc;

use parking_lot::Mutex;

use volary_common::timingwheel::Timer;

use crate::manager::SessionManager;

#[derive(Default)]
struct Timers {
    heart: Option<Timer>,
    reconn: Option<Timer>,
    msg: Option<Timer>,
    /// `"sessionID_msgID"` of the outstanding push, empty when none.
    msg_timer_lock: String,
}

pub struct ConnState {
    conn_id: u64,
    did: u64,
    /// Gateway endpoint holding this connection's socket.
    endpoint: String,
    timers: Mutex<Timers>,
}

pub(crate) fn msg_lock(session_id: u64, msg_id: u64) -> String {
    format!("{session_id}_{msg_id}")
}

impl ConnState {
    pub fn new(conn_id: u64, did: u64, endpoint: &str) -> Self {
        Self { conn_id, did, endpoint: endpoint.to_owned(), timers: Mutex::new(Timers::default()) }
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    pub fn did(&self) -> u64 {
        self.did
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// LIVE -> LIVE: restart the heartbeat window. Only the heart timer is
    /// touched; once GRACE is entered, the grace timer runs to expiry and
    /// the session comes back only via ReConn under a fresh connID.
    pub(crate) fn reset_heart_timer(&self, mgr: &Arc<SessionManager>) {
        let mut timers = self.timers.lock();
        if let Some(heart) = timers.heart.take() {
            heart.stop();
        }
        let conn_id = self.conn_id;
        let cb_mgr = Arc::clone(mgr);
        timers.heart = Some(mgr.wheel().after_func(mgr.cfg().heartbeat_timeout(), move || {
            cb_mgr.heartbeat_expired(conn_id);
        }));
    }

    /// LIVE -> GRACE: arm the reconnect-grace window; expiry is session
    /// death.
    pub(crate) fn arm_reconn_timer(&self, mgr: &Arc<SessionManager>) {
        let mut timers = self.timers.lock();
        if let Some(reconn) = timers.reconn.take() {
            reconn.stop();
        }
        let conn_id = self.conn_id;
        let cb_mgr = Arc::clone(mgr);
        timers.reconn = Some(mgr.wheel().after_func(mgr.cfg().reconn_timeout(), move || {
            cb_mgr.grace_expired(conn_id);
        }));
    }

    /// Record the outstanding push and arm (or re-arm) the retransmit
    /// timer.
    pub(crate) fn set_msg_timer(&self, mgr: &Arc<SessionManager>, session_id: u64, msg_id: u64) {
        let mut timers = self.timers.lock();
        if let Some(msg) = timers.msg.take() {
            msg.stop();
        }
        timers.msg_timer_lock = msg_lock(session_id, msg_id);
        let conn_id = self.conn_id;
        let cb_mgr = Arc::clone(mgr);
        timers.msg = Some(mgr.wheel().after_func(mgr.cfg().retransmit_interval(), move || {
            cb_mgr.retransmit_due(conn_id);
        }));
    }

    /// Verify the client ACK against the lock; on a match, stop the
    /// retransmit timer. Mismatches are ignored. Repeats keep matching, so
    /// acking twice is a no-op for the caller.
    pub(crate) fn ack_matches(&self, session_id: u64, msg_id: u64) -> bool {
        let mut timers = self.timers.lock();
        if timers.msg_timer_lock != msg_lock(session_id, msg_id) {
            return false;
        }
        if let Some(msg) = timers.msg.take() {
            msg.stop();
        }
        true
    }

    /// Stop every timer; idempotent.
    pub(crate) fn stop_all(&self) {
        let mut timers = self.timers.lock();
        for timer in
            [timers.heart.take(), timers.reconn.take(), timers.msg.take()].into_iter().flatten()
        {
            timer.stop();
        }
    }

    #[cfg(test)]
    pub(crate) fn msg_timer_lock(&self) -> String {
        self.timers.lock().msg_timer_lock.clone()
    }

    #[cfg(test)]
    pub(crate) fn in_grace(&self) -> bool {
        self.timers.lock().reconn.is_some()
    }
}
