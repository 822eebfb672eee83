// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! In-process [`Store`] for tests and single-node development.
//!
//! Values live under one mutex, so the script-backed operations are atomic
//! exactly as their Redis counterparts are. TTLs are accepted and ignored;
//! expiry is not modeled.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Error;

use super::{last_msg_key, login_slot_key, router_key, slot_member, Store};

#[derive(Default)]
struct Inner {
    kv: HashMap<String, Vec<u8>>,
    sets: HashMap<String, BTreeSet<String>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held (sets included). Test helper.
    pub fn key_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.kv.len() + inner.sets.values().filter(|s| !s.is_empty()).count()
    }
}

fn parse_counter(raw: Option<&Vec<u8>>) -> Result<u64, Error> {
    match raw {
        None => Ok(0),
        Some(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::CacheUnavailable("counter is not an integer".to_owned())),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.inner.lock().kv.get(key).cloned())
    }

    async fn set_bytes(
        &self,
        key: &str,
        value: &[u8],
        _ttl: Option<Duration>,
    ) -> Result<(), Error> {
        self.inner.lock().kv.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self
            .inner
            .lock()
            .kv
            .get(key)
            .map(|v| String::from_utf8_lossy(v).into_owned()))
    }

    async fn set_string(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), Error> {
        self.set_bytes(key, value.as_bytes(), ttl).await
    }

    async fn del(&self, key: &str) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.kv.remove(key);
        inner.sets.remove(key);
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), Error> {
        self.inner.lock().sets.entry(key.to_owned()).or_default().insert(member.to_owned());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), Error> {
        if let Some(set) = self.inner.lock().sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, Error> {
        Ok(self
            .inner
            .lock()
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn incr(&self, key: &str, _ttl: Duration) -> Result<u64, Error> {
        let mut inner = self.inner.lock();
        let next = parse_counter(inner.kv.get(key))? + 1;
        inner.kv.insert(key.to_owned(), next.to_string().into_bytes());
        Ok(next)
    }

    async fn compare_and_incr(
        &self,
        key: &str,
        expected: u64,
        _ttl: Duration,
    ) -> Result<i64, Error> {
        let mut inner = self.inner.lock();
        let current = parse_counter(inner.kv.get(key))?;
        if inner.kv.get(key).is_none() {
            inner.kv.insert(key.to_owned(), b"0".to_vec());
        }
        if current == expected {
            inner.kv.insert(key.to_owned(), (current + 1).to_string().into_bytes());
            Ok(1)
        } else {
            Ok(-1)
        }
    }

    async fn cleanup_connection(
        &self,
        conn_id: u64,
        device_id: u64,
        slot_count: u64,
    ) -> Result<(), Error> {
        let slot = super::slot_for(conn_id, slot_count);
        let mut inner = self.inner.lock();
        if let Some(set) = inner.sets.get_mut(&login_slot_key(slot)) {
            set.remove(&slot_member(device_id, conn_id));
        }
        inner.kv.remove(&router_key(device_id));
        inner.kv.remove(&last_msg_key(slot, conn_id));
        let prefix = format!("max_client_id_{{{slot}}}_{conn_id}_");
        inner.kv.retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
