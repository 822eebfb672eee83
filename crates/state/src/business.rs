// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Hook into the application layer.
//!
//! The state service validates uplinks and owns delivery; what a message
//! *means* belongs to the business layer behind this trait. The default
//! implementation echoes the uplink body back to the sender, which is
//! enough for loopback testing and the perf harness.

use async_trait::async_trait;

use volary_common::proto::{PushMsg, UpMsg};

#[async_trait]
pub trait Business: Send + Sync + 'static {
    /// Turn an accepted uplink into the downstream push to deliver, if any.
    /// `msg_id` is the server-assigned identifier reserved for it.
    async fn handle_up(&self, did: u64, up: &UpMsg, msg_id: u64) -> Option<PushMsg>;
}

pub struct EchoBusiness;

#[async_trait]
impl Business for EchoBusiness {
    async fn handle_up(&self, _did: u64, up: &UpMsg, msg_id: u64) -> Option<PushMsg> {
        let session_id = up.head.as_ref().map(|h| h.session_id).unwrap_or_default();
        Some(PushMsg { msg_id, session_id, content: up.up_msg_body.clone() })
    }
}
