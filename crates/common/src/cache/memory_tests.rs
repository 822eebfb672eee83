// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

use super::super::{
    last_msg_key, login_slot_key, max_client_id_key, router_key, slot_member, TTL_7D,
};
use super::*;

#[tokio::test]
async fn bytes_roundtrip_and_delete() {
    let store = MemoryStore::new();
    store.set_bytes("k", b"v", Some(TTL_7D)).await.unwrap();
    assert_eq!(store.get_bytes("k").await.unwrap(), Some(b"v".to_vec()));

    store.del("k").await.unwrap();
    assert_eq!(store.get_bytes("k").await.unwrap(), None);
    // deleting again is a no-op
    store.del("k").await.unwrap();
}

#[tokio::test]
async fn srem_after_sadd_restores_prior_state() {
    let store = MemoryStore::new();
    let key = login_slot_key(3);
    let member = slot_member(42, 35);

    store.sadd(&key, &member).await.unwrap();
    assert_eq!(store.smembers(&key).await.unwrap(), vec![member.clone()]);

    store.srem(&key, &member).await.unwrap();
    assert!(store.smembers(&key).await.unwrap().is_empty());
}

#[tokio::test]
async fn incr_counts_from_one() {
    let store = MemoryStore::new();
    assert_eq!(store.incr("n", TTL_7D).await.unwrap(), 1);
    assert_eq!(store.incr("n", TTL_7D).await.unwrap(), 2);
}

#[tokio::test]
async fn compare_and_incr_accepts_once() {
    let store = MemoryStore::new();
    let key = max_client_id_key(0, 100, 7);

    // absent counter is created as 0, so clientID 0 is accepted...
    assert_eq!(store.compare_and_incr(&key, 0, TTL_7D).await.unwrap(), 1);
    // ...and the duplicate is refused with the counter left at 1
    assert_eq!(store.compare_and_incr(&key, 0, TTL_7D).await.unwrap(), -1);
    assert_eq!(store.get_string(&key).await.unwrap().as_deref(), Some("1"));

    assert_eq!(store.compare_and_incr(&key, 1, TTL_7D).await.unwrap(), 1);
    assert_eq!(store.get_string(&key).await.unwrap().as_deref(), Some("2"));
}

#[tokio::test]
async fn compare_and_incr_rejects_gaps() {
    let store = MemoryStore::new();
    let key = max_client_id_key(0, 100, 7);
    assert_eq!(store.compare_and_incr(&key, 5, TTL_7D).await.unwrap(), -1);
    // the probe still materialized the counter at 0
    assert_eq!(store.get_string(&key).await.unwrap().as_deref(), Some("0"));
}

#[tokio::test]
async fn cleanup_connection_removes_every_key() {
    let store = MemoryStore::new();
    let (did, conn_id, slots) = (42u64, 35u64, 16u64);
    let slot = conn_id % slots;

    store.sadd(&login_slot_key(slot), &slot_member(did, conn_id)).await.unwrap();
    store.set_string(&router_key(did), "ep|35", None).await.unwrap();
    store.set_bytes(&last_msg_key(slot, conn_id), b"msg", Some(TTL_7D)).await.unwrap();
    store.compare_and_incr(&max_client_id_key(slot, conn_id, 7), 0, TTL_7D).await.unwrap();
    store.compare_and_incr(&max_client_id_key(slot, conn_id, 8), 0, TTL_7D).await.unwrap();

    // an unrelated connection in the same slot survives
    store.sadd(&login_slot_key(slot), &slot_member(9, slot + slots)).await.unwrap();

    store.cleanup_connection(conn_id, did, slots).await.unwrap();

    assert!(store.smembers(&login_slot_key(slot)).await.unwrap()
        == vec![slot_member(9, slot + slots)]);
    assert_eq!(store.get_string(&router_key(did)).await.unwrap(), None);
    assert_eq!(store.get_bytes(&last_msg_key(slot, conn_id)).await.unwrap(), None);
    assert_eq!(
        store.get_bytes(&max_client_id_key(slot, conn_id, 7)).await.unwrap(),
        None
    );
    assert_eq!(
        store.get_bytes(&max_client_id_key(slot, conn_id, 8)).await.unwrap(),
        None
    );
}
