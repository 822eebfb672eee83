// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Reactor integration tests against real loopback sockets.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use volary_common::config::GatewayConfig;
use volary_common::framing;
use volary_gateway::conn::{ConnRegistry, Connection};
use volary_gateway::reactor::{Reactor, ReactorEvents};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, PartialEq)]
enum Event {
    Frame(u64, Vec<u8>),
    Disconnect(u64),
}

struct Recorder {
    tx: mpsc::Sender<Event>,
}

impl ReactorEvents for Recorder {
    fn on_frame(&self, conn: &Arc<Connection>, frame: Bytes) {
        let _ = self.tx.try_send(Event::Frame(conn.id(), frame.to_vec()));
    }

    fn on_disconnect(&self, conn: &Arc<Connection>) {
        let _ = self.tx.try_send(Event::Disconnect(conn.id()));
    }
}

fn test_config(max_tcp_num: i64) -> GatewayConfig {
    GatewayConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        max_tcp_num,
        reactor_shards: 2,
        accept_threads: 1,
        ..GatewayConfig::default()
    }
}

fn start(max_tcp_num: i64) -> (Reactor, Arc<ConnRegistry>, mpsc::Receiver<Event>) {
    let registry = Arc::new(ConnRegistry::new());
    let (tx, rx) = mpsc::channel(256);
    let reactor = Reactor::start(&test_config(max_tcp_num), Arc::clone(&registry), Arc::new(Recorder { tx }))
        .expect("reactor start");
    (reactor, registry, rx)
}

async fn next_event(rx: &mut mpsc::Receiver<Event>) -> Event {
    tokio::time::timeout(WAIT, rx.recv()).await.expect("event deadline").expect("channel open")
}

fn frame(payload: &[u8]) -> Vec<u8> {
    framing::encode(payload, framing::DEFAULT_MAX_FRAME_BYTES).expect("encode")
}

#[tokio::test]
async fn frames_reach_the_handler_in_order() {
    let (reactor, registry, mut rx) = start(16);
    let mut client = TcpStream::connect(reactor.local_addr()).expect("connect");

    client.write_all(&frame(b"first")).expect("write");
    client.write_all(&frame(b"second")).expect("write");

    let Event::Frame(conn_id, payload) = next_event(&mut rx).await else {
        panic!("expected frame");
    };
    assert_eq!(payload, b"first");
    let Event::Frame(second_id, payload) = next_event(&mut rx).await else {
        panic!("expected frame");
    };
    assert_eq!(second_id, conn_id);
    assert_eq!(payload, b"second");

    assert_eq!(reactor.tcp_num(), 1);
    assert!(registry.get(conn_id).is_some());
}

#[tokio::test]
async fn partial_frames_are_reassembled() {
    let (reactor, _registry, mut rx) = start(16);
    let mut client = TcpStream::connect(reactor.local_addr()).expect("connect");

    let whole = frame(b"stitched");
    client.write_all(&whole[..3]).expect("write head");
    client.flush().expect("flush");
    std::thread::sleep(Duration::from_millis(300));
    client.write_all(&whole[3..]).expect("write tail");

    let Event::Frame(_, payload) = next_event(&mut rx).await else {
        panic!("expected frame");
    };
    assert_eq!(payload, b"stitched");
}

#[tokio::test]
async fn eof_tears_the_connection_down() {
    let (reactor, registry, mut rx) = start(16);
    let mut client = TcpStream::connect(reactor.local_addr()).expect("connect");
    client.write_all(&frame(b"hello")).expect("write");

    let Event::Frame(conn_id, _) = next_event(&mut rx).await else {
        panic!("expected frame");
    };
    drop(client);

    assert_eq!(next_event(&mut rx).await, Event::Disconnect(conn_id));

    // deregistered everywhere, counter released
    let deadline = std::time::Instant::now() + WAIT;
    while reactor.tcp_num() != 0 && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(reactor.tcp_num(), 0);
    assert!(registry.get(conn_id).is_none());
}

#[tokio::test]
async fn excess_connections_are_shed_before_registration() {
    let (reactor, _registry, mut rx) = start(1);
    let mut first = TcpStream::connect(reactor.local_addr()).expect("connect");
    first.write_all(&frame(b"occupy")).expect("write");
    let Event::Frame(first_id, _) = next_event(&mut rx).await else {
        panic!("expected frame");
    };

    let mut second = TcpStream::connect(reactor.local_addr()).expect("connect");
    second.set_read_timeout(Some(WAIT)).expect("timeout");
    let mut buf = [0u8; 1];
    // the acceptor closes the excess socket without registering it
    match second.read(&mut buf) {
        Ok(0) => {}
        Ok(n) => panic!("unexpected {n} bytes on shed connection"),
        Err(e) => panic!("expected EOF, got {e}"),
    }

    // the admitted connection keeps working
    first.write_all(&frame(b"still-alive")).expect("write");
    let Event::Frame(conn_id, payload) = next_event(&mut rx).await else {
        panic!("expected frame");
    };
    assert_eq!(conn_id, first_id);
    assert_eq!(payload, b"still-alive");
}

#[tokio::test]
async fn invalid_frame_closes_the_connection() {
    let (reactor, _registry, mut rx) = start(16);
    let mut client = TcpStream::connect(reactor.local_addr()).expect("connect");

    // zero-length header is a protocol violation
    client.write_all(&[0, 0, 0, 0]).expect("write");

    assert!(matches!(next_event(&mut rx).await, Event::Disconnect(_)));
    client.set_read_timeout(Some(WAIT)).expect("timeout");
    let mut buf = [0u8; 1];
    assert_eq!(client.read(&mut buf).unwrap_or(0), 0, "expected server-side close");
}

#[tokio::test]
async fn distinct_connections_get_distinct_ids() {
    let (reactor, _registry, mut rx) = start(16);
    let mut a = TcpStream::connect(reactor.local_addr()).expect("connect a");
    let mut b = TcpStream::connect(reactor.local_addr()).expect("connect b");
    a.write_all(&frame(b"a")).expect("write");
    b.write_all(&frame(b"b")).expect("write");

    let mut ids = std::collections::HashSet::new();
    for _ in 0..2 {
        let Event::Frame(conn_id, _) = next_event(&mut rx).await else {
            panic!("expected frame");
        };
        ids.insert(conn_id);
    }
    assert_eq!(ids.len(), 2);
}
