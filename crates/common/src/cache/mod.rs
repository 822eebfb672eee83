// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Distributed-cache abstraction.
//!
//! All per-connection keys hash-tag the slot (`{N}`) so every key for one
//! connection lands on the same cache-cluster shard; that is what lets the
//! multi-key cleanup script run atomically in one round trip.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Error;

pub use memory::MemoryStore;
pub use redis::RedisStore;

pub const TTL_7D: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// `login_slot_set_{N}`: set of `"did|connID"` members, one per live session.
pub fn login_slot_key(slot: u64) -> String {
    format!("login_slot_set_{{{slot}}}")
}

/// `gateway_router_DID`: string `"endpoint|connID"`.
pub fn router_key(device_id: u64) -> String {
    format!("gateway_router_{device_id}")
}

/// `last_msg_{N}_CONNID`: serialized outstanding `PushMsg`.
pub fn last_msg_key(slot: u64, conn_id: u64) -> String {
    format!("last_msg_{{{slot}}}_{conn_id}")
}

/// `max_client_id_{N}_CONNID_SESSIONID`: uplink idempotency counter.
pub fn max_client_id_key(slot: u64, conn_id: u64, session_id: u64) -> String {
    format!("max_client_id_{{{slot}}}_{conn_id}_{session_id}")
}

pub fn slot_for(conn_id: u64, slot_count: u64) -> u64 {
    conn_id % slot_count.max(1)
}

pub fn slot_member(device_id: u64, conn_id: u64) -> String {
    format!("{device_id}|{conn_id}")
}

pub fn parse_slot_member(member: &str) -> Option<(u64, u64)> {
    let (did, conn) = member.split_once('|')?;
    Some((did.parse().ok()?, conn.parse().ok()?))
}

/// Typed operations over the cache cluster.
///
/// [`RedisStore`] is the production implementation; [`MemoryStore`] backs
/// tests and single-process development and obeys the same atomicity laws.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;
    async fn set_bytes(&self, key: &str, value: &[u8], ttl: Option<Duration>)
        -> Result<(), Error>;
    async fn get_string(&self, key: &str) -> Result<Option<String>, Error>;
    async fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>)
        -> Result<(), Error>;
    async fn del(&self, key: &str) -> Result<(), Error>;
    async fn sadd(&self, key: &str, member: &str) -> Result<(), Error>;
    async fn srem(&self, key: &str, member: &str) -> Result<(), Error>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, Error>;
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, Error>;

    /// Registered compare-and-increment script: sets the key to 0 if absent,
    /// increments iff the current value equals `expected` (refreshing `ttl`),
    /// and returns `1` on acceptance or `-1` for a duplicate.
    async fn compare_and_incr(&self, key: &str, expected: u64, ttl: Duration)
        -> Result<i64, Error>;

    /// Registered cleanup script: atomically removes the login-slot member,
    /// the router record, the last-message key, and every
    /// `max_client_id_{slot}_{connID}_*` counter for the connection.
    async fn cleanup_connection(
        &self,
        conn_id: u64,
        device_id: u64,
        slot_count: u64,
    ) -> Result<(), Error>;
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
