// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Shared plumbing for the volary messaging backbone: wire framing, the
//! `volary.v1` protocol types, the distributed-cache abstraction, router
//! records, the timing wheel, and service configuration.

pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod framing;
pub mod proto;
pub mod router;
pub mod timingwheel;

pub use error::Error;
