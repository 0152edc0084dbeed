//! Bridge from async I/O to the non-blocking [`Port`](super::Port) API.
//!
//! Two tokio tasks own the async halves of the link. The reader task
//! forwards inbound chunks and the writer task drains outbound chunks, each
//! through an mpsc channel:
//!
//! ```text
//! AsyncRead ─► Reader Task ─► mpsc<Bytes> ─► BridgePort::read
//! BridgePort::write_all ─► mpsc<Bytes> ─► Writer Task ─► AsyncWrite
//! ```
//!
//! The dispatcher drives `BridgePort` from a blocking context (for example
//! `tokio::task::spawn_blocking`), never from inside an async task.

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::task::JoinHandle;

use super::{ByteSink, ByteSource};
use crate::error::{LinkError, Result};
use crate::protocol::MAX_FRAME_LEN;

/// Default number of chunks buffered in each direction.
pub const DEFAULT_BRIDGE_CAPACITY: usize = 64;

/// Maximum chunks written per batch.
const MAX_BATCH_SIZE: usize = 16;

/// Handles of the two bridge tasks.
pub struct BridgeTasks {
    /// Ends with `Ok` on EOF or when the port is dropped.
    pub reader: JoinHandle<Result<()>>,
    /// Ends with `Ok` when the port is dropped.
    pub writer: JoinHandle<Result<()>>,
}

/// Non-blocking port backed by the bridge channels.
pub struct BridgePort {
    inbound: mpsc::Receiver<Bytes>,
    outbound: mpsc::Sender<Bytes>,
    leftover: Bytes,
}

/// Spawn the reader and writer tasks for an async link.
///
/// Must be called from within a tokio runtime.
///
/// # Arguments
///
/// * `reader` - Async read half of the link
/// * `writer` - Async write half of the link
/// * `capacity` - Chunks buffered in each direction
pub fn spawn_bridge<R, W>(reader: R, writer: W, capacity: usize) -> (BridgePort, BridgeTasks)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let capacity = capacity.max(1);
    let (in_tx, in_rx) = mpsc::channel(capacity);
    let (out_tx, out_rx) = mpsc::channel(capacity);

    let tasks = BridgeTasks {
        reader: tokio::spawn(reader_loop(reader, in_tx)),
        writer: tokio::spawn(writer_loop(out_rx, writer)),
    };

    let port = BridgePort {
        inbound: in_rx,
        outbound: out_tx,
        leftover: Bytes::new(),
    };

    (port, tasks)
}

/// Forward everything read from `reader` into the channel.
async fn reader_loop<R>(mut reader: R, tx: mpsc::Sender<Bytes>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(MAX_FRAME_LEN);

    loop {
        buf.reserve(MAX_FRAME_LEN);
        let n = reader.read_buf(&mut buf).await?;
        if n == 0 {
            tracing::debug!("Bridge reader reached EOF");
            return Ok(());
        }

        if tx.send(buf.split().freeze()).await.is_err() {
            // Port dropped
            return Ok(());
        }
    }
}

/// Write every chunk from the channel, batching what is already queued.
async fn writer_loop<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(chunk) => chunk,
            None => return Ok(()),
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(chunk) => batch.push(chunk),
                Err(_) => break,
            }
        }

        for chunk in &batch {
            if let Err(e) = writer.write_all(chunk).await {
                tracing::error!("Bridge write failed: {}", e);
                return Err(e.into());
            }
        }
        writer.flush().await?;
    }
}

impl ByteSource for BridgePort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;

        while filled < buf.len() {
            if self.leftover.is_empty() {
                match self.inbound.try_recv() {
                    Ok(chunk) => self.leftover = chunk,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) if filled > 0 => break,
                    Err(TryRecvError::Disconnected) => return Err(LinkError::ConnectionClosed),
                }
            }

            let n = self.leftover.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&self.leftover[..n]);
            self.leftover.advance(n);
            filled += n;
        }

        Ok(filled)
    }
}

impl ByteSink for BridgePort {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.outbound
            .try_send(Bytes::copy_from_slice(data))
            .map_err(|e| match e {
                TrySendError::Full(_) => LinkError::WouldBlock,
                TrySendError::Closed(_) => LinkError::ConnectionClosed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;

    async fn read_some(port: &mut BridgePort, buf: &mut [u8]) -> usize {
        for _ in 0..100 {
            let n = port.read(buf).unwrap();
            if n > 0 {
                return n;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        0
    }

    #[tokio::test]
    async fn test_bridge_forwards_inbound() {
        let (host, mut radio) = duplex(1024);
        let (reader, writer) = tokio::io::split(host);
        let (mut port, _tasks) = spawn_bridge(reader, writer, 8);

        radio.write_all(&[0xDE, 0x35, 0x01, 0x07]).await.unwrap();

        let mut buf = [0u8; 16];
        let n = read_some(&mut port, &mut buf).await;
        assert_eq!(&buf[..n], &[0xDE, 0x35, 0x01, 0x07]);
    }

    #[tokio::test]
    async fn test_bridge_forwards_outbound() {
        let (host, mut radio) = duplex(1024);
        let (reader, writer) = tokio::io::split(host);
        let (mut port, _tasks) = spawn_bridge(reader, writer, 8);

        port.write_all(&[0xDE, 0x47, 0x00]).unwrap();
        port.write_all(&[0xDE, 0x45, 0x00]).unwrap();

        let mut buf = [0u8; 6];
        radio.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0xDE, 0x47, 0x00, 0xDE, 0x45, 0x00]);
    }

    #[tokio::test]
    async fn test_read_splits_large_chunk() {
        let (host, mut radio) = duplex(1024);
        let (reader, writer) = tokio::io::split(host);
        let (mut port, _tasks) = spawn_bridge(reader, writer, 8);

        radio.write_all(&[1, 2, 3, 4, 5]).await.unwrap();

        let mut small = [0u8; 2];
        let n = read_some(&mut port, &mut small).await;
        assert_eq!(&small[..n], &[1, 2]);

        // The rest is served from the leftover chunk
        let mut rest = [0u8; 8];
        let n = port.read(&mut rest).unwrap();
        assert_eq!(&rest[..n], &[3, 4, 5]);
    }

    #[tokio::test]
    async fn test_eof_reports_closed() {
        let (host, radio) = duplex(64);
        let (reader, writer) = tokio::io::split(host);
        let (mut port, tasks) = spawn_bridge(reader, writer, 8);

        drop(radio);
        tasks.reader.await.unwrap().unwrap();

        let mut buf = [0u8; 4];
        assert!(matches!(port.read(&mut buf), Err(LinkError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_full_queue_would_block() {
        let (tx, _rx) = mpsc::channel::<Bytes>(1);
        let (_in_tx, in_rx) = mpsc::channel::<Bytes>(1);
        let mut port = BridgePort {
            inbound: in_rx,
            outbound: tx,
            leftover: Bytes::new(),
        };

        port.write_all(&[1]).unwrap();
        assert!(matches!(port.write_all(&[2]), Err(LinkError::WouldBlock)));
    }

    #[tokio::test]
    async fn test_writer_stops_when_port_dropped() {
        let (host, _radio) = duplex(64);
        let (reader, writer) = tokio::io::split(host);
        let (port, tasks) = spawn_bridge(reader, writer, 8);

        drop(port);
        tasks.writer.await.unwrap().unwrap();
    }
}
