// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

use super::*;
use crate::cache::MemoryStore;

#[tokio::test]
async fn record_roundtrip() {
    let store = MemoryStore::new();
    add_record(&store, 42, "127.0.0.1:8901", 9001).await.unwrap();

    let record = get_record(&store, 42).await.unwrap().unwrap();
    assert_eq!(record, RouterRecord { endpoint: "127.0.0.1:8901".to_owned(), conn_id: 9001 });

    del_record(&store, 42).await.unwrap();
    assert_eq!(get_record(&store, 42).await.unwrap(), None);
}

#[tokio::test]
async fn relogin_overwrites_record() {
    let store = MemoryStore::new();
    add_record(&store, 42, "127.0.0.1:8901", 9001).await.unwrap();
    add_record(&store, 42, "127.0.0.1:8901", 9002).await.unwrap();

    let record = get_record(&store, 42).await.unwrap().unwrap();
    assert_eq!(record.conn_id, 9002);
}

#[test]
fn unmarshal_splits_on_last_pipe() {
    let record = RouterRecord::unmarshal("10.0.0.1:8901|77").unwrap();
    assert_eq!(record.endpoint, "10.0.0.1:8901");
    assert_eq!(record.conn_id, 77);
    assert!(RouterRecord::unmarshal("no-conn-id").is_none());
    assert!(RouterRecord::unmarshal("ep|notanumber").is_none());
}
