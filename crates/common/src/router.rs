// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Router records: `deviceID -> (gateway endpoint, connID)`.
//!
//! The business layer reads these to decide which gateway currently holds a
//! device's live socket. The record follows the session: written on login,
//! rewritten on reconnect, deleted by the logout cleanup script.

use crate::cache::{router_key, Store};
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterRecord {
    pub endpoint: String,
    pub conn_id: u64,
}

impl RouterRecord {
    fn marshal(&self) -> String {
        format!("{}|{}", self.endpoint, self.conn_id)
    }

    fn unmarshal(raw: &str) -> Option<Self> {
        // endpoints contain ':'; the connID is everything after the last '|'
        let (endpoint, conn) = raw.rsplit_once('|')?;
        Some(Self { endpoint: endpoint.to_owned(), conn_id: conn.parse().ok()? })
    }
}

pub async fn add_record(
    store: &dyn Store,
    device_id: u64,
    endpoint: &str,
    conn_id: u64,
) -> Result<(), Error> {
    let record = RouterRecord { endpoint: endpoint.to_owned(), conn_id };
    store.set_string(&router_key(device_id), &record.marshal(), None).await
}

pub async fn del_record(store: &dyn Store, device_id: u64) -> Result<(), Error> {
    store.del(&router_key(device_id)).await
}

pub async fn get_record(
    store: &dyn Store,
    device_id: u64,
) -> Result<Option<RouterRecord>, Error> {
    match store.get_string(&router_key(device_id)).await? {
        Some(raw) => RouterRecord::unmarshal(&raw)
            .map(Some)
            .ok_or_else(|| Error::CacheUnavailable(format!("malformed router record: {raw}"))),
        None => Ok(None),
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
