//! Port over a blocking-capable `std::io` stream.
//!
//! The stream should be in non-blocking mode (a serial device opened with
//! `O_NONBLOCK`, a socket with `set_nonblocking(true)`); `WouldBlock` on
//! read is reported as "nothing available".

use std::io::{ErrorKind, Read, Write};

use super::{ByteSink, ByteSource};
use crate::error::{LinkError, Result};

/// Adapter from a `Read + Write` stream to [`Port`](super::Port).
pub struct IoPort<S> {
    stream: S,
}

impl<S: Read + Write> IoPort<S> {
    /// Wrap a stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Borrow the stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Mutably borrow the stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Unwrap the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> ByteSource for IoPort<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stream.read(buf) {
            Ok(0) if !buf.is_empty() => Err(LinkError::ConnectionClosed),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

impl<S: Read + Write> ByteSink for IoPort<S> {
    fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            match self.stream.write(data) {
                Ok(0) => return Err(LinkError::ConnectionClosed),
                Ok(n) => data = &data[n..],
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                    std::thread::yield_now();
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        loop {
            match self.stream.flush() {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::WouldBlock => std::thread::yield_now(),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    fn pair() -> (IoPort<UnixStream>, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        (IoPort::new(a), b)
    }

    #[test]
    fn test_read_nothing_available() {
        let (mut port, _peer) = pair();
        let mut buf = [0u8; 16];

        assert_eq!(port.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_roundtrip_through_socket() {
        let (mut port, mut peer) = pair();

        port.write_all(&[0xDE, 0x45, 0x00]).unwrap();
        let mut received = [0u8; 3];
        peer.read_exact(&mut received).unwrap();
        assert_eq!(received, [0xDE, 0x45, 0x00]);

        peer.write_all(&[0xDE, 0x68, 0x00]).unwrap();
        let mut buf = [0u8; 16];
        let mut n = 0;
        while n == 0 {
            n = port.read(&mut buf).unwrap();
        }
        assert_eq!(&buf[..n], &[0xDE, 0x68, 0x00]);
    }

    #[test]
    fn test_peer_closed() {
        let (mut port, peer) = pair();
        drop(peer);

        let mut buf = [0u8; 4];
        assert!(matches!(port.read(&mut buf), Err(LinkError::ConnectionClosed)));
    }
}
