// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Length-prefixed TCP framing.
//!
//! Every frame is a 4-byte big-endian payload length followed by exactly
//! that many bytes. Two decode modes exist: [`read_frame`] blocks until one
//! whole frame arrives (client SDK and tooling), while [`FrameBuffer`] is
//! fed by the gateway's edge-triggered reactor and yields every complete
//! frame accumulated so far, keeping partial frames buffered.

use std::io::ErrorKind;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Error;

pub const HEADER_LEN: usize = 4;
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1 << 20;

/// Deadline for the blocking decode mode.
pub const READ_DEADLINE: Duration = Duration::from_secs(120);

/// Encode one payload as a length-prefixed frame.
pub fn encode(payload: &[u8], max: usize) -> Result<Vec<u8>, Error> {
    if payload.is_empty() || payload.len() > max {
        return Err(Error::FrameInvalid { len: payload.len(), max });
    }
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.put_u32(payload.len() as u32);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Accumulating per-connection decode buffer for edge-triggered reads.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    max: usize,
}

impl FrameBuffer {
    pub fn new(max: usize) -> Self {
        Self { buf: BytesMut::with_capacity(8 * 1024), max }
    }

    /// Append bytes drained from the socket.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Extract the next complete frame, if one is buffered.
    ///
    /// Returns `Ok(None)` when the buffer holds only a partial frame (or
    /// nothing); those bytes stay buffered for the next read burst.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, Error> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len == 0 || len > self.max {
            return Err(Error::FrameInvalid { len, max: self.max });
        }
        if self.buf.len() < HEADER_LEN + len {
            return Ok(None);
        }
        self.buf.advance(HEADER_LEN);
        Ok(Some(self.buf.split_to(len).freeze()))
    }

    /// Bytes currently buffered (partial frame remainder included).
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Read one whole frame, waiting up to [`READ_DEADLINE`].
pub async fn read_frame<R>(reader: &mut R, max: usize) -> Result<Vec<u8>, Error>
where
    R: AsyncRead + Unpin,
{
    tokio::time::timeout(READ_DEADLINE, read_frame_inner(reader, max))
        .await
        .map_err(|_| Error::Io(std::io::Error::new(ErrorKind::TimedOut, "frame read deadline")))?
}

async fn read_frame_inner<R>(reader: &mut R, max: usize) -> Result<Vec<u8>, Error>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    read_exact(reader, &mut header).await?;
    let len = u32::from_be_bytes(header) as usize;
    if len == 0 || len > max {
        return Err(Error::FrameInvalid { len, max });
    }
    let mut payload = vec![0u8; len];
    read_exact(reader, &mut payload).await?;
    Ok(payload)
}

async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), Error>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(Error::PeerClosed),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Write one payload as a frame and flush.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max: usize) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(payload, max)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "framing_tests.rs"]
mod tests;
