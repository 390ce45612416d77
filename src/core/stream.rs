//! Byte stream with a user-space unread buffer.
//!
//! Bytes pulled from the OS but not yet handed to the caller live in the
//! buffer; [`ReadinessPoller`](super::poller::ReadinessPoller) counts them
//! and short-circuits readability checks while any remain.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

const FILL_CHUNK: usize = 4096;

pub struct BufferedStream<S> {
    inner: Option<S>,
    rbuf: VecDeque<u8>,
}

impl<S> BufferedStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Some(inner),
            rbuf: VecDeque::new(),
        }
    }

    pub fn get_ref(&self) -> Option<&S> {
        self.inner.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut S> {
        self.inner.as_mut()
    }

    /// Bytes held in the unread buffer.
    pub fn buffered(&self) -> usize {
        self.rbuf.len()
    }

    /// Push bytes back so the next read returns them first.
    pub fn unread(&mut self, bytes: &[u8]) {
        for &b in bytes.iter().rev() {
            self.rbuf.push_front(b);
        }
    }

    /// Release the underlying stream. Buffered bytes stay readable.
    pub fn close(&mut self) -> Option<S> {
        self.inner.take()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    fn closed_error() -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, "stream closed")
    }
}

impl<S: Read> BufferedStream<S> {
    /// One read from the underlying stream into the buffer. Returns the
    /// number of bytes added; zero means end-of-file (or an expired
    /// VMIN/VTIME read).
    pub fn fill(&mut self) -> io::Result<usize> {
        let inner = self.inner.as_mut().ok_or_else(Self::closed_error)?;
        let mut chunk = [0u8; FILL_CHUNK];
        let n = inner.read(&mut chunk)?;
        self.rbuf.extend(&chunk[..n]);
        Ok(n)
    }

    /// Next byte, from the buffer if possible, otherwise a single-byte read
    /// so nothing beyond it is consumed from the device.
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if let Some(b) = self.rbuf.pop_front() {
            return Ok(Some(b));
        }
        let inner = self.inner.as_mut().ok_or_else(Self::closed_error)?;
        let mut byte = [0u8; 1];
        match inner.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }
}

impl<S: Read> Read for BufferedStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.rbuf.is_empty() {
            let n = buf.len().min(self.rbuf.len());
            for (dst, src) in buf.iter_mut().zip(self.rbuf.drain(..n)) {
                *dst = src;
            }
            return Ok(n);
        }
        match self.inner.as_mut() {
            Some(inner) => inner.read(buf),
            None => Err(Self::closed_error()),
        }
    }
}

impl<S: Write> Write for BufferedStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(inner) => inner.write(buf),
            None => Err(Self::closed_error()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.as_mut() {
            Some(inner) => inner.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_drains_buffer_first() {
        let mut stream = BufferedStream::new(Cursor::new(b"world".to_vec()));
        stream.unread(b"hello ");
        assert_eq!(stream.buffered(), 6);

        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
        assert_eq!(stream.buffered(), 0);
    }

    #[test]
    fn test_fill_and_read_byte() {
        let mut stream = BufferedStream::new(Cursor::new(b"abc".to_vec()));
        assert_eq!(stream.fill().unwrap(), 3);
        assert_eq!(stream.buffered(), 3);
        assert_eq!(stream.read_byte().unwrap(), Some(b'a'));
        assert_eq!(stream.buffered(), 2);

        stream.unread(b"a");
        assert_eq!(stream.read_byte().unwrap(), Some(b'a'));
        assert_eq!(stream.read_byte().unwrap(), Some(b'b'));
        assert_eq!(stream.read_byte().unwrap(), Some(b'c'));
        assert_eq!(stream.read_byte().unwrap(), None);
    }

    #[test]
    fn test_closed_stream_keeps_buffer() {
        let mut stream = BufferedStream::new(Cursor::new(b"xy".to_vec()));
        stream.fill().unwrap();
        assert!(stream.close().is_some());
        assert!(stream.is_closed());

        assert_eq!(stream.read_byte().unwrap(), Some(b'x'));
        assert_eq!(stream.read_byte().unwrap(), Some(b'y'));
        let err = stream.read_byte().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert!(stream.write(b"z").is_err());
    }
}
