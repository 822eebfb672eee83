// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Bounded worker pool.
//!
//! Decouples reactor latency from RPC latency: every decoded frame and every
//! RPC-originated command becomes a queued task. The queue is bounded;
//! [`WorkerPool::try_submit`] fails with `PoolSaturated` instead of blocking
//! the reactor shard, and the frame is dropped (uplink is at-least-once, the
//! client retransmits).

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use volary_common::error::Error;

type Task = BoxFuture<'static, ()>;

pub struct WorkerPool {
    tx: mpsc::Sender<Task>,
}

impl WorkerPool {
    /// Spawn `workers` tasks draining a queue of at most `queue_size`
    /// entries onto the given runtime.
    pub fn start(workers: usize, queue_size: usize, handle: &tokio::runtime::Handle) -> Self {
        let (tx, rx) = mpsc::channel::<Task>(queue_size.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for _ in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            handle.spawn(async move {
                loop {
                    let task = { rx.lock().await.recv().await };
                    match task {
                        Some(task) => task.await,
                        None => break,
                    }
                }
            });
        }
        Self { tx }
    }

    /// Non-blocking submission for the reactor path.
    pub fn try_submit<F>(&self, task: F) -> Result<(), Error>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tx.try_send(Box::pin(task)).map_err(|_| Error::PoolSaturated)
    }

    /// Awaiting submission for async callers; applies queue backpressure.
    pub async fn submit<F>(&self, task: F) -> Result<(), Error>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tx.send(Box::pin(task)).await.map_err(|_| Error::PoolSaturated)
    }
}

#[cfg(test)]
#[path = "workpool_tests.rs"]
mod tests;
