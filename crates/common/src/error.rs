// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Error taxonomy shared by the gateway and state services.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Frame declared a zero or over-limit payload length.
    #[error("invalid frame length {len} (max {max})")]
    FrameInvalid { len: usize, max: usize },

    /// The peer closed the socket (clean EOF).
    #[error("peer closed connection")]
    PeerClosed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A bounded worker pool or channel refused the submission.
    #[error("worker pool saturated")]
    PoolSaturated,

    /// The wall clock moved backwards; connID uniqueness can no longer be
    /// guaranteed by the generator.
    #[error("clock moved backwards")]
    ClockRegression,

    #[error("no such connection: {0}")]
    NoSuchConn(u64),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    /// A Lua script was not registered, or reloading it failed.
    #[error("cache script missing: {0}")]
    ScriptMissing(String),

    #[error("rpc deadline exceeded")]
    RpcDeadline,

    /// Undecodable payload or an unknown `MsgCmd` type tag.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
