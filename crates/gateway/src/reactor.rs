// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Epoll reactor and acceptor.
//!
//! N accept threads share one listening socket; admitted connections are
//! handed to M reactor shards over bounded channels. Each shard owns one
//! epoll instance in edge-triggered mode plus the fd table for its sockets,
//! and drains ready sockets through the per-connection frame buffer. An
//! eventfd per shard wakes `epoll_wait` early for registrations, and the
//! 200 ms wait timeout keeps shutdown responsive.

use std::collections::HashMap;
use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use nix::sys::eventfd::{EfdFlags, EventFd};
use nix::sys::socket::{self, sockopt};
use tokio::sync::mpsc;

use volary_common::config::GatewayConfig;

use crate::conn::{ConnIdGenerator, ConnRegistry, Connection};

/// Epoll user-data token reserved for the shard's wake eventfd.
const WAKE_TOKEN: u64 = u64::MAX;

const WAIT_TIMEOUT_MS: u16 = 200;
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Callbacks the reactor raises from its shard threads. Implementations
/// must not block; heavy work belongs on the worker pool.
pub trait ReactorEvents: Send + Sync + 'static {
    /// A complete frame was decoded from `conn`'s socket.
    fn on_frame(&self, conn: &Arc<Connection>, frame: Bytes);

    /// `conn` was torn down (EOF, read error, or protocol violation).
    fn on_disconnect(&self, conn: &Arc<Connection>);
}

struct Shared {
    stop: AtomicBool,
    tcp_num: Arc<AtomicI64>,
    max_tcp_num: i64,
    max_frame_bytes: usize,
    epoll_wait_queue: usize,
    registry: Arc<ConnRegistry>,
    events: Arc<dyn ReactorEvents>,
}

struct ShardHandle {
    tx: mpsc::Sender<Arc<Connection>>,
    wake: Arc<EventFd>,
}

pub struct Reactor {
    shared: Arc<Shared>,
    shards: Vec<ShardHandle>,
    threads: Vec<std::thread::JoinHandle<()>>,
    local_addr: std::net::SocketAddr,
}

fn thread_count(configured: usize) -> usize {
    if configured != 0 {
        return configured;
    }
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

impl Reactor {
    /// Bind the listener and start the acceptor and shard threads.
    pub fn start(
        cfg: &GatewayConfig,
        registry: Arc<ConnRegistry>,
        events: Arc<dyn ReactorEvents>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind((cfg.host.as_str(), cfg.port))?;
        let local_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shared = Arc::new(Shared {
            stop: AtomicBool::new(false),
            tcp_num: Arc::new(AtomicI64::new(0)),
            max_tcp_num: cfg.max_tcp_num,
            max_frame_bytes: cfg.max_frame_bytes,
            epoll_wait_queue: cfg.epoll_wait_queue_size.max(16),
            registry,
            events,
        });

        let mut shards = Vec::new();
        let mut threads = Vec::new();
        for i in 0..thread_count(cfg.reactor_shards) {
            let (tx, rx) = mpsc::channel(cfg.reactor_channel_size.max(1));
            let wake = Arc::new(
                EventFd::from_value_and_flags(0, EfdFlags::EFD_NONBLOCK)
                    .map_err(|e| anyhow::anyhow!("eventfd: {e}"))?,
            );
            let worker_shared = Arc::clone(&shared);
            let worker_wake = Arc::clone(&wake);
            let handle = std::thread::Builder::new()
                .name(format!("reactor-{i}"))
                .spawn(move || shard_loop(worker_shared, worker_wake, rx))?;
            shards.push(ShardHandle { tx, wake });
            threads.push(handle);
        }

        let generator = Arc::new(ConnIdGenerator::new());
        let next_shard = Arc::new(AtomicUsize::new(0));
        let listener = Arc::new(listener);
        let shard_handles: Arc<Vec<ShardHandle>> = Arc::new(
            shards
                .iter()
                .map(|s| ShardHandle { tx: s.tx.clone(), wake: Arc::clone(&s.wake) })
                .collect(),
        );
        for i in 0..thread_count(cfg.accept_threads) {
            let accept_shared = Arc::clone(&shared);
            let accept_listener = Arc::clone(&listener);
            let accept_generator = Arc::clone(&generator);
            let accept_shards = Arc::clone(&shard_handles);
            let accept_next = Arc::clone(&next_shard);
            let handle = std::thread::Builder::new().name(format!("accept-{i}")).spawn(move || {
                accept_loop(
                    accept_shared,
                    accept_listener,
                    accept_generator,
                    accept_shards,
                    accept_next,
                )
            })?;
            threads.push(handle);
        }

        Ok(Self { shared, shards, threads, local_addr })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Currently admitted sockets.
    pub fn tcp_num(&self) -> i64 {
        self.shared.tcp_num.load(Ordering::Acquire)
    }

    /// Shared admitted-socket counter, for liveness reporting.
    pub fn tcp_num_counter(&self) -> Arc<AtomicI64> {
        Arc::clone(&self.shared.tcp_num)
    }

    /// Stop acceptors and shards and join their threads.
    pub fn shutdown(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        for shard in &self.shards {
            let _ = shard.wake.write(1);
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(
    shared: Arc<Shared>,
    listener: Arc<TcpListener>,
    generator: Arc<ConnIdGenerator>,
    shards: Arc<Vec<ShardHandle>>,
    next: Arc<AtomicUsize>,
) {
    while !shared.stop.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                // Connection-level shedding: over the ceiling, close before
                // the socket ever reaches a shard.
                let admitted = shared.tcp_num.fetch_add(1, Ordering::AcqRel) + 1;
                if admitted > shared.max_tcp_num {
                    shared.tcp_num.fetch_sub(1, Ordering::AcqRel);
                    tracing::warn!(%peer, tcp_num = admitted - 1, "admission ceiling reached");
                    continue;
                }
                if let Err(e) = configure_socket(&stream) {
                    shared.tcp_num.fetch_sub(1, Ordering::AcqRel);
                    tracing::warn!(%peer, err = %e, "socket setup failed");
                    continue;
                }
                let conn_id = match generator.next_id() {
                    Ok(id) => id,
                    Err(e) => {
                        // A backwards clock breaks connID uniqueness for the
                        // whole process; refusing one socket does not fix it.
                        tracing::error!(err = %e, "connID generator failed; aborting");
                        std::process::abort();
                    }
                };
                let conn = Arc::new(Connection::new(conn_id, stream, shared.max_frame_bytes));
                let shard = &shards[next.fetch_add(1, Ordering::AcqRel) % shards.len()];
                if shard.tx.blocking_send(conn).is_err() {
                    shared.tcp_num.fetch_sub(1, Ordering::AcqRel);
                    continue;
                }
                let _ = shard.wake.write(1);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::warn!(err = %e, "accept failed");
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

fn configure_socket(stream: &TcpStream) -> std::io::Result<()> {
    socket::setsockopt(stream, sockopt::KeepAlive, &true)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    stream.set_nonblocking(true)
}

struct Shard {
    shared: Arc<Shared>,
    epoll: Epoll,
    wake: Arc<EventFd>,
    fd_table: HashMap<u64, Arc<Connection>>,
}

fn shard_loop(shared: Arc<Shared>, wake: Arc<EventFd>, mut rx: mpsc::Receiver<Arc<Connection>>) {
    let epoll = match Epoll::new(EpollCreateFlags::empty()) {
        Ok(epoll) => epoll,
        Err(e) => {
            tracing::error!(err = %e, "epoll_create failed; shard not started");
            return;
        }
    };
    if let Err(e) =
        epoll.add(&*wake, EpollEvent::new(EpollFlags::EPOLLIN, WAKE_TOKEN))
    {
        tracing::error!(err = %e, "wake eventfd registration failed; shard not started");
        return;
    }

    let mut shard = Shard { shared, epoll, wake, fd_table: HashMap::new() };
    let mut ready = vec![EpollEvent::empty(); shard.shared.epoll_wait_queue];

    while !shard.shared.stop.load(Ordering::Acquire) {
        match shard.epoll.wait(&mut ready, EpollTimeout::from(WAIT_TIMEOUT_MS)) {
            Ok(n) => {
                for event in &ready[..n] {
                    let token = event.data();
                    if token == WAKE_TOKEN {
                        let _ = shard.wake.read();
                    } else {
                        shard.handle_ready(token);
                    }
                }
            }
            Err(Errno::EINTR) => {}
            Err(e) => {
                tracing::error!(err = %e, "epoll_wait failed");
            }
        }
        // Register connections handed over since the last pass.
        while let Ok(conn) = rx.try_recv() {
            shard.register(conn);
        }
    }

    for (_, conn) in shard.fd_table.drain() {
        conn.close();
        shard.shared.registry.remove(conn.id());
        shard.shared.tcp_num.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Shard {
    fn register(&mut self, conn: Arc<Connection>) {
        let fd = conn.fd() as u64;
        let flags = EpollFlags::EPOLLIN | EpollFlags::EPOLLHUP | EpollFlags::EPOLLET;
        if let Err(e) = self.epoll.add(conn.stream(), EpollEvent::new(flags, fd)) {
            tracing::error!(conn_id = conn.id(), err = %e, "epoll add failed");
            conn.close();
            self.shared.tcp_num.fetch_sub(1, Ordering::AcqRel);
            return;
        }
        self.fd_table.insert(fd, Arc::clone(&conn));
        self.shared.registry.insert(conn);
    }

    /// Edge-triggered read: drain the socket to EAGAIN, then surface every
    /// complete frame that accumulated.
    fn handle_ready(&mut self, fd: u64) {
        let Some(conn) = self.fd_table.get(&fd).cloned() else {
            return;
        };

        let mut closed = false;
        let mut chunk = [0u8; 8192];
        loop {
            match (&mut conn.stream()).read(&mut chunk) {
                Ok(0) => {
                    closed = true;
                    break;
                }
                Ok(n) => conn.with_read_buf(|buf| buf.extend(&chunk[..n])),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::debug!(conn_id = conn.id(), err = %e, "socket read failed");
                    closed = true;
                    break;
                }
            }
        }

        loop {
            match conn.with_read_buf(|buf| buf.next_frame()) {
                Ok(Some(frame)) => self.shared.events.on_frame(&conn, frame),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(conn_id = conn.id(), err = %e, "bad frame; closing");
                    closed = true;
                    break;
                }
            }
        }

        if closed {
            self.teardown(fd);
        }
    }

    /// Idempotent: a second teardown of the same fd is a no-op.
    fn teardown(&mut self, fd: u64) {
        let Some(conn) = self.fd_table.remove(&fd) else {
            return;
        };
        let _ = self.epoll.delete(conn.stream());
        self.shared.registry.remove(conn.id());
        self.shared.tcp_num.fetch_sub(1, Ordering::AcqRel);
        conn.close();
        self.shared.events.on_disconnect(&conn);
    }
}
