// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! `volary client`: a minimal wire-level client for poking at a deployment.

use std::path::PathBuf;
use std::time::Duration;

use volary_client::Chat;
use volary_common::config::Settings;

#[derive(clap::Args)]
pub struct ClientArgs {
    /// Path to the YAML configuration file.
    #[arg(long, value_name = "PATH", env = "VOLARY_CONFIG")]
    config: Option<PathBuf>,

    /// Gateway address; overrides the configured gateway host:port.
    #[arg(long)]
    gateway: Option<String>,

    /// Device ID to log in with.
    #[arg(long, default_value_t = 42)]
    did: u64,

    /// Session to send on.
    #[arg(long, default_value_t = 1)]
    session: u64,

    /// Messages to send as uplinks.
    #[arg(value_name = "MESSAGE")]
    messages: Vec<String>,

    /// How long to keep listening for pushes after sending, in seconds.
    #[arg(long, default_value_t = 3)]
    linger_secs: u64,
}

pub async fn run(args: ClientArgs) -> anyhow::Result<()> {
    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let addr = args
        .gateway
        .unwrap_or_else(|| format!("{}:{}", settings.gateway.host, settings.gateway.port));

    let mut chat = Chat::connect(&addr, settings.gateway.max_frame_bytes).await?;
    let ack = chat.login(args.did).await?;
    println!("logged in: connID={} ({})", ack.conn_id, ack.msg);
    chat.start_heartbeat(Duration::from_secs(1));

    for message in &args.messages {
        let client_id = chat.send_up(args.session, message.as_bytes()).await?;
        println!("sent clientID={client_id}: {message}");
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.linger_secs);
    loop {
        let push = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            push = chat.recv_push() => push,
        };
        match push {
            Some(push) => println!(
                "push session={} msgID={}: {}",
                push.session_id,
                push.msg_id,
                String::from_utf8_lossy(&push.content)
            ),
            None => break,
        }
    }
    Ok(())
}
