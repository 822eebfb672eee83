// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! `volary perf`: concurrent clients hammering one gateway with uplinks,
//! reporting throughput and ACK latency percentiles.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use volary_client::Chat;
use volary_common::config::Settings;

#[derive(clap::Args)]
pub struct PerfArgs {
    /// Path to the YAML configuration file.
    #[arg(long, value_name = "PATH", env = "VOLARY_CONFIG")]
    config: Option<PathBuf>,

    /// Gateway address; overrides the configured gateway host:port.
    #[arg(long)]
    gateway: Option<String>,

    /// Concurrent clients.
    #[arg(long, default_value_t = 10)]
    clients: u64,

    /// Uplinks per client.
    #[arg(long, default_value_t = 100)]
    messages: u64,

    /// Uplink body size in bytes.
    #[arg(long, default_value_t = 64)]
    body_size: usize,
}

pub async fn run(args: PerfArgs) -> anyhow::Result<()> {
    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let addr = args
        .gateway
        .unwrap_or_else(|| format!("{}:{}", settings.gateway.host, settings.gateway.port));
    let max_frame = settings.gateway.max_frame_bytes;
    let body = vec![b'x'; args.body_size.max(1)];

    let started = Instant::now();
    let mut workers = Vec::new();
    for i in 0..args.clients {
        let addr = addr.clone();
        let body = body.clone();
        let messages = args.messages;
        workers.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(messages as usize);
            let mut chat = Chat::connect(&addr, max_frame).await?;
            // spread device IDs so each worker is its own session
            chat.login(10_000 + i).await?;
            chat.start_heartbeat(Duration::from_secs(1));
            for _ in 0..messages {
                let sent = Instant::now();
                chat.send_up(1, &body).await?;
                latencies.push(sent.elapsed());
            }
            Ok::<_, volary_common::Error>(latencies)
        }));
    }

    let mut latencies = Vec::new();
    let mut failures = 0u64;
    for worker in workers {
        match worker.await {
            Ok(Ok(mut worker_latencies)) => latencies.append(&mut worker_latencies),
            Ok(Err(e)) => {
                failures += 1;
                tracing::warn!(err = %e, "perf worker failed");
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(err = %e, "perf worker panicked");
            }
        }
    }
    let elapsed = started.elapsed();

    latencies.sort_unstable();
    let total = latencies.len();
    println!("clients:     {}", args.clients);
    println!("acked:       {total}");
    println!("failures:    {failures}");
    println!("elapsed:     {elapsed:.2?}");
    if total > 0 {
        let rate = total as f64 / elapsed.as_secs_f64();
        println!("throughput:  {rate:.0} msg/s");
        println!("p50 latency: {:.2?}", latencies[total / 2]);
        println!("p99 latency: {:.2?}", latencies[(total * 99 / 100).min(total - 1)]);
    }
    Ok(())
}
