// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Redis-backed [`Store`] implementation.
//!
//! Scripts are loaded once at connect time; `redis::Script` re-submits the
//! source transparently when a node answers `NOSCRIPT`, which covers cache
//! restarts and script-cache eviction without a coordination step.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};

use crate::config::CacheConfig;
use crate::error::Error;

use super::Store;

const COMPARE_AND_INCR_LUA: &str = r#"
if redis.call('exists', KEYS[1]) == 0 then
    redis.call('set', KEYS[1], 0)
end
if redis.call('get', KEYS[1]) == ARGV[1] then
    redis.call('incr', KEYS[1])
    redis.call('expire', KEYS[1], ARGV[2])
    return 1
else
    return -1
end
"#;

// ARGV: connID, deviceID, slot count. Every touched key carries the same
// `{slot}` hash tag except the router record, which is keyed by device.
const CLEANUP_CONNECTION_LUA: &str = r#"
local conn_id = ARGV[1]
local device_id = ARGV[2]
local slot_count = tonumber(ARGV[3])
local slot = tonumber(conn_id) % slot_count

redis.call("SREM", "login_slot_set_{" .. slot .. "}", device_id .. "|" .. conn_id)
redis.call("DEL", "gateway_router_" .. device_id)
redis.call("DEL", "last_msg_{" .. slot .. "}_" .. conn_id)

local pattern = "max_client_id_{" .. slot .. "}_" .. conn_id .. "_*"
local cursor = "0"
repeat
    local result = redis.call("SCAN", cursor, "MATCH", pattern, "COUNT", 100)
    cursor = result[1]
    local keys = result[2]
    if #keys > 0 then
        redis.call("DEL", unpack(keys))
    end
until cursor == "0"
return 1
"#;

fn unavailable(e: redis::RedisError) -> Error {
    Error::CacheUnavailable(e.to_string())
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

pub struct RedisStore {
    conn: MultiplexedConnection,
    compare_and_incr: Script,
    cleanup_connection: Script,
}

impl RedisStore {
    /// Connect to the first configured endpoint and register the Lua
    /// scripts.
    pub async fn connect(cfg: &CacheConfig) -> Result<Self, Error> {
        let url = cfg
            .endpoints
            .first()
            .ok_or_else(|| Error::CacheUnavailable("no cache endpoints configured".to_owned()))?;
        let client = redis::Client::open(url.as_str()).map_err(unavailable)?;
        let mut conn = tokio::time::timeout(
            cfg.conn_timeout(),
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| Error::CacheUnavailable(format!("connect timeout to {url}")))?
        .map_err(unavailable)?;

        for (name, lua) in
            [("compare_and_incr", COMPARE_AND_INCR_LUA), ("cleanup", CLEANUP_CONNECTION_LUA)]
        {
            let _sha: String = redis::cmd("SCRIPT")
                .arg("LOAD")
                .arg(lua)
                .query_async(&mut conn)
                .await
                .map_err(|e| Error::ScriptMissing(format!("{name}: {e}")))?;
        }

        Ok(Self {
            conn,
            compare_and_incr: Script::new(COMPARE_AND_INCR_LUA),
            cleanup_connection: Script::new(CLEANUP_CONNECTION_LUA),
        })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let mut conn = self.conn();
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(unavailable)?;
        Ok(value)
    }

    async fn set_bytes(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), Error> {
        let mut conn = self.conn();
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl_secs(ttl)).await.map_err(unavailable)?;
            }
            None => {
                let _: () = conn.set(key, value).await.map_err(unavailable)?;
            }
        }
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>, Error> {
        let mut conn = self.conn();
        let value: Option<String> = conn.get(key).await.map_err(unavailable)?;
        Ok(value)
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
        let mut conn = self.conn();
        let _: () = conn.del(key).await.map_err(unavailable)?;
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), Error> {
        let mut conn = self.conn();
        let _: () = conn.sadd(key, member).await.map_err(unavailable)?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), Error> {
        let mut conn = self.conn();
        let _: () = conn.srem(key, member).await.map_err(unavailable)?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, Error> {
        let mut conn = self.conn();
        let members: Vec<String> = conn.smembers(key).await.map_err(unavailable)?;
        Ok(members)
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, Error> {
        let mut conn = self.conn();
        let (value,): (u64,) = redis::pipe()
            .atomic()
            .incr(key, 1u64)
            .expire(key, ttl_secs(ttl) as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(value)
    }

    async fn compare_and_incr(
        &self,
        key: &str,
        expected: u64,
        ttl: Duration,
    ) -> Result<i64, Error> {
        let mut conn = self.conn();
        let verdict: i64 = self
            .compare_and_incr
            .key(key)
            .arg(expected.to_string())
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(verdict)
    }

    async fn cleanup_connection(
        &self,
        conn_id: u64,
        device_id: u64,
        slot_count: u64,
    ) -> Result<(), Error> {
        let mut conn = self.conn();
        let _: i64 = self
            .cleanup_connection
            .arg(conn_id.to_string())
            .arg(device_id.to_string())
            .arg(slot_count)
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
