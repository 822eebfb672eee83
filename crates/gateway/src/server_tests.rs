// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

use super::*;
use async_trait::async_trait;
use std::io::Read;
use std::net::{TcpListener, TcpStream};

struct RecordingTransport {
    tx: mpsc::Sender<(String, u64, Vec<u8>)>,
}

#[async_trait]
impl StateTransport for RecordingTransport {
    async fn send_msg(
        &self,
        endpoint: &str,
        conn_id: u64,
        payload: Vec<u8>,
    ) -> Result<(), Error> {
        let _ = self.tx.send((endpoint.to_owned(), conn_id, payload)).await;
        Ok(())
    }

    async fn cancel_conn(
        &self,
        endpoint: &str,
        conn_id: u64,
        _payload: Vec<u8>,
    ) -> Result<(), Error> {
        let _ = self.tx.send((endpoint.to_owned(), conn_id, Vec::new())).await;
        Ok(())
    }
}

fn loopback_conn(id: u64) -> (TcpStream, Arc<Connection>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let client = TcpStream::connect(addr).expect("connect");
    let (server, _) = listener.accept().expect("accept");
    server.set_nonblocking(true).expect("nonblocking");
    (client, Arc::new(Connection::new(id, server, 1024)))
}

struct Harness {
    grpc: GatewayGrpc,
    registry: Arc<ConnRegistry>,
    _consumer: tokio::task::JoinHandle<()>,
}

fn harness() -> Harness {
    let registry = Arc::new(ConnRegistry::new());
    let pool = Arc::new(WorkerPool::start(2, 16, &tokio::runtime::Handle::current()));
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let consumer = spawn_cmd_consumer(
        cmd_rx,
        pool,
        Arc::clone(&registry),
        Arc::new(GatewayMetrics::default()),
        1024,
    );
    let grpc = GatewayGrpc::new(Arc::clone(&registry), cmd_tx, Duration::from_millis(500));
    Harness { grpc, registry, _consumer: consumer }
}

#[tokio::test]
async fn push_to_unknown_conn_replies_no_such_conn() {
    let h = harness();
    let resp = h
        .grpc
        .push(Request::new(GatewayRequest { conn_id: 404, data: b"x".to_vec() }))
        .await
        .expect("rpc")
        .into_inner();
    assert_eq!(resp.code, code::NO_SUCH_CONN);
}

#[tokio::test]
async fn push_writes_a_frame_to_the_socket() {
    let h = harness();
    let (mut client, conn) = loopback_conn(7);
    h.registry.insert(conn);

    let resp = h
        .grpc
        .push(Request::new(GatewayRequest { conn_id: 7, data: b"dl".to_vec() }))
        .await
        .expect("rpc")
        .into_inner();
    assert_eq!(resp.code, code::OK);

    let mut buf = [0u8; 6];
    client.read_exact(&mut buf).expect("read");
    assert_eq!(&buf, &[0, 0, 0, 2, b'd', b'l']);
}

#[tokio::test(flavor = "multi_thread")]
async fn del_conn_closes_the_socket_and_deregisters() {
    let h = harness();
    let (mut client, conn) = loopback_conn(9);
    h.registry.insert(conn);

    let resp = h
        .grpc
        .del_conn(Request::new(GatewayRequest { conn_id: 9, data: Vec::new() }))
        .await
        .expect("rpc")
        .into_inner();
    assert_eq!(resp.code, code::OK);

    // consumer runs async; wait for the close to land
    let mut buf = [0u8; 1];
    client.set_read_timeout(Some(Duration::from_secs(5))).expect("timeout");
    assert_eq!(client.read(&mut buf).expect("read"), 0, "expected EOF");
    assert!(h.registry.get(9).is_none());
}

#[tokio::test]
async fn frames_are_forwarded_with_gateway_endpoint() {
    let pool = Arc::new(WorkerPool::start(2, 16, &tokio::runtime::Handle::current()));
    let (tx, mut rx) = mpsc::channel(4);
    let handler = FrameHandler::new(
        pool,
        Arc::new(RecordingTransport { tx }),
        "10.0.0.1:8901".to_owned(),
        Arc::new(GatewayMetrics::default()),
        tokio::runtime::Handle::current(),
    );
    let (_client, conn) = loopback_conn(3);

    handler.on_frame(&conn, Bytes::from_static(b"up"));

    let (endpoint, conn_id, payload) =
        tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.expect("deadline").expect("sent");
    assert_eq!(endpoint, "10.0.0.1:8901");
    assert_eq!(conn_id, 3);
    assert_eq!(payload, b"up");
}

#[tokio::test]
async fn disconnects_are_reported() {
    let pool = Arc::new(WorkerPool::start(2, 16, &tokio::runtime::Handle::current()));
    let (tx, mut rx) = mpsc::channel(4);
    let handler = FrameHandler::new(
        pool,
        Arc::new(RecordingTransport { tx }),
        "10.0.0.1:8901".to_owned(),
        Arc::new(GatewayMetrics::default()),
        tokio::runtime::Handle::current(),
    );
    let (_client, conn) = loopback_conn(5);

    handler.on_disconnect(&conn);

    let (_, conn_id, payload) =
        tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.expect("deadline").expect("sent");
    assert_eq!(conn_id, 5);
    assert!(payload.is_empty());
}
