// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

use super::*;

#[tokio::test]
async fn static_watch_emits_configured_endpoints() {
    let cfg = DiscoveryConfig {
        gateways: vec!["127.0.0.1:8901".to_owned(), "127.0.0.1:8911".to_owned()],
    };
    let disco = StaticDiscovery::from_config(&cfg);

    let mut rx = disco.watch().await.unwrap();
    let mut addrs = Vec::new();
    for _ in 0..2 {
        match rx.recv().await.unwrap() {
            EndpointEvent::Put(ep) => addrs.push(ep.addr),
            EndpointEvent::Del(_) => panic!("unexpected delete"),
        }
    }
    assert_eq!(addrs, cfg.gateways);

    // no further events, but the stream stays open
    let pending =
        tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await;
    assert!(pending.is_err());
}

#[tokio::test]
async fn static_register_is_accepted() {
    let disco = StaticDiscovery::from_config(&DiscoveryConfig::default());
    let ep = GatewayEndpoint {
        addr: "127.0.0.1:8901".to_owned(),
        stats: EndpointStats { connect_num: 3.0, message_bytes: 128.0 },
    };
    assert!(disco.register(ep).await.is_ok());
}
