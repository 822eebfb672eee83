// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Gateway ranking: sliding-window smoothing of discovery stats and the
//! two-tier score used to order candidates.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

use volary_common::discovery::{EndpointEvent, EndpointStats};

/// Fixed-size window of the last N stat samples for one endpoint.
struct StatWindow {
    queue: Vec<EndpointStats>,
    sum: EndpointStats,
    idx: usize,
}

impl StatWindow {
    fn new(size: usize) -> Self {
        Self { queue: vec![EndpointStats::default(); size.max(1)], sum: EndpointStats::default(), idx: 0 }
    }

    fn append(&mut self, stats: EndpointStats) {
        let size = self.queue.len();
        let slot = &mut self.queue[self.idx % size];
        self.sum.connect_num += stats.connect_num - slot.connect_num;
        self.sum.message_bytes += stats.message_bytes - slot.message_bytes;
        *slot = stats;
        self.idx += 1;
    }

    fn average(&self) -> EndpointStats {
        let size = self.queue.len() as f64;
        EndpointStats {
            connect_num: self.sum.connect_num / size,
            message_bytes: self.sum.message_bytes / size,
        }
    }
}

/// Gigabytes moved, truncated to two decimals.
fn active_score(stats: &EndpointStats) -> f64 {
    let gb = stats.message_bytes / (1u64 << 30) as f64;
    (gb * 100.0 + 0.5).trunc() / 100.0
}

fn static_score(stats: &EndpointStats) -> f64 {
    stats.connect_num
}

/// One ranked gateway as returned by `/ip/list`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankedEndpoint {
    pub endpoint: String,
    #[serde(skip)]
    pub active_score: f64,
    #[serde(skip)]
    pub static_score: f64,
}

/// Candidate table fed by discovery events.
pub struct Dispatcher {
    window_size: usize,
    table: RwLock<HashMap<String, StatWindow>>,
}

impl Dispatcher {
    pub fn new(window_size: usize) -> Self {
        Self { window_size, table: RwLock::new(HashMap::new()) }
    }

    pub fn apply(&self, event: EndpointEvent) {
        let mut table = self.table.write();
        match event {
            EndpointEvent::Put(ep) => {
                table
                    .entry(ep.addr)
                    .or_insert_with(|| StatWindow::new(self.window_size))
                    .append(ep.stats);
            }
            EndpointEvent::Del(addr) => {
                table.remove(&addr);
            }
        }
    }

    pub fn candidate_count(&self) -> usize {
        self.table.read().len()
    }

    /// Rank every candidate: active (traffic) score first, connection count
    /// as the tiebreak, best first; return the top `n`.
    pub fn dispatch(&self, n: usize) -> Vec<RankedEndpoint> {
        let table = self.table.read();
        let mut ranked: Vec<RankedEndpoint> = table
            .iter()
            .map(|(addr, window)| {
                let stats = window.average();
                RankedEndpoint {
                    endpoint: addr.clone(),
                    active_score: active_score(&stats),
                    static_score: static_score(&stats),
                }
            })
            .collect();
        drop(table);

        ranked.sort_by(|a, b| {
            b.active_score
                .total_cmp(&a.active_score)
                .then(b.static_score.total_cmp(&a.static_score))
                .then(a.endpoint.cmp(&b.endpoint))
        });
        ranked.truncate(n);
        ranked
    }
}

#[cfg(test)]
#[path = "domain_tests.rs"]
mod tests;
