// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Connections, the process-wide registry, and connID generation.

use std::collections::HashMap;
use std::io::Write;
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};

use volary_common::error::Error;
use volary_common::framing::{self, FrameBuffer};

const VERSION: u64 = 0;
const SEQUENCE_BITS: u64 = 16;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;
const TIME_SHIFT: u8 = 16;
const VERSION_SHIFT: u8 = 63;
// 2024-01-01 00:00:00 UTC, milliseconds.
const EPOCH_OFFSET_MS: u64 = 1_704_067_200_000;

/// How long a socket write may retry through kernel-buffer pressure before
/// it is reported as failed.
const WRITE_DEADLINE: Duration = Duration::from_secs(5);

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[derive(Default)]
struct GeneratorState {
    last_stamp: u64,
    sequence: u64,
}

/// Single-writer snowflake-style connID generator.
///
/// `connID = version << 63 | (ms - epoch) << 16 | sequence`. IDs are
/// strictly increasing within one process; uniqueness across gateways needs
/// external disambiguation (the version bit is reserved for that).
#[derive(Default)]
pub struct ConnIdGenerator {
    state: Mutex<GeneratorState>,
}

impl ConnIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> Result<u64, Error> {
        let mut state = self.state.lock();
        let mut stamp = now_ms();
        if stamp < state.last_stamp {
            return Err(Error::ClockRegression);
        }
        if stamp == state.last_stamp {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                // sequence exhausted this millisecond: spin to the next one
                while stamp <= state.last_stamp {
                    stamp = now_ms();
                }
            }
        } else {
            state.sequence = 0;
        }
        state.last_stamp = stamp;
        let id = (stamp.saturating_sub(EPOCH_OFFSET_MS)) << TIME_SHIFT | state.sequence;
        Ok(VERSION << VERSION_SHIFT | id)
    }
}

/// One accepted client socket.
///
/// The owning reactor shard is the only reader; writes are serialized by the
/// internal write lock, shared by the Push path and any future writer.
pub struct Connection {
    id: u64,
    fd: RawFd,
    stream: TcpStream,
    read_buf: Mutex<FrameBuffer>,
    write_lock: Mutex<()>,
}

impl Connection {
    pub fn new(id: u64, stream: TcpStream, max_frame_bytes: usize) -> Self {
        let fd = stream.as_raw_fd();
        Self { id, fd, stream, read_buf: Mutex::new(FrameBuffer::new(max_frame_bytes)), write_lock: Mutex::new(()) }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Run `f` over the connection's accumulating frame buffer.
    pub fn with_read_buf<R>(&self, f: impl FnOnce(&mut FrameBuffer) -> R) -> R {
        f(&mut self.read_buf.lock())
    }

    /// Write one framed payload, serialized against concurrent writers.
    ///
    /// The socket is non-blocking; kernel-buffer pressure is absorbed by a
    /// bounded retry loop rather than by parking the worker on the fd.
    pub fn write_frame(&self, payload: &[u8], max_frame_bytes: usize) -> Result<(), Error> {
        let frame = framing::encode(payload, max_frame_bytes)?;
        let _guard = self.write_lock.lock();
        let deadline = Instant::now() + WRITE_DEADLINE;
        let mut written = 0;
        while written < frame.len() {
            match (&self.stream).write(&frame[written..]) {
                Ok(0) => return Err(Error::PeerClosed),
                Ok(n) => written += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(Error::Io(e));
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }

    /// Shut the socket down; the owning shard observes EOF and deregisters.
    pub fn close(&self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

/// Process-wide `connID -> connection` table.
#[derive(Default)]
pub struct ConnRegistry {
    table: RwLock<HashMap<u64, Arc<Connection>>>,
}

impl ConnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conn: Arc<Connection>) {
        self.table.write().insert(conn.id(), conn);
    }

    /// Remove is idempotent: unknown IDs are a no-op.
    pub fn remove(&self, conn_id: u64) -> Option<Arc<Connection>> {
        self.table.write().remove(&conn_id)
    }

    pub fn get(&self, conn_id: u64) -> Option<Arc<Connection>> {
        self.table.read().get(&conn_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

#[cfg(test)]
#[path = "conn_tests.rs"]
mod tests;
