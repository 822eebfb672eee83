// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

use super::*;
use volary_common::discovery::{EndpointEvent, EndpointStats, GatewayEndpoint};

#[tokio::test]
async fn list_returns_ranked_endpoints() {
    let state = Arc::new(AppState { dispatcher: Dispatcher::new(1), top_n: 2 });
    for (addr, conns) in [("10.0.0.1:8901", 1.0), ("10.0.0.2:8901", 5.0), ("10.0.0.3:8901", 3.0)]
    {
        state.dispatcher.apply(EndpointEvent::Put(GatewayEndpoint {
            addr: addr.to_owned(),
            stats: EndpointStats { connect_num: conns, message_bytes: 0.0 },
        }));
    }

    let Json(resp) = list_endpoints(State(Arc::clone(&state))).await;
    assert_eq!(resp.code, 0);
    assert_eq!(resp.data.len(), 2);
    assert_eq!(resp.data[0].endpoint, "10.0.0.2:8901");
    assert_eq!(resp.data[1].endpoint, "10.0.0.3:8901");
}

#[tokio::test]
async fn list_with_no_candidates_is_empty_ok() {
    let state = Arc::new(AppState { dispatcher: Dispatcher::new(1), top_n: 5 });
    let Json(resp) = list_endpoints(State(state)).await;
    assert_eq!(resp.code, 0);
    assert!(resp.data.is_empty());
}
