// ABOUTME: Framed TCP transport for SMPP PDUs with read buffering and buffered writes
// ABOUTME: Owns no protocol state; the session layer drives the bind lifecycle

use bytes::{Buf, BytesMut};
use std::io::{self, Cursor};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

use crate::codec::{CodecError, Frame};

/// One TCP connection to the SMSC, framed into SMPP PDUs.
///
/// Reads accumulate into a buffer until a complete PDU is available; writes
/// go through a `BufWriter` and are flushed per frame so outbound submits
/// are never left sitting behind keep-alive traffic.
#[derive(Debug)]
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl Connection {
    pub fn new(socket: TcpStream) -> Connection {
        Connection {
            stream: BufWriter::new(socket),
            // PDUs are small; 4KB covers several frames per read
            buffer: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Read a single frame from the underlying stream.
    ///
    /// Returns `None` on a clean remote close (no partial frame left in the
    /// buffer); a close mid-frame is an error.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(CodecError::Io(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "connection reset mid-frame",
                    )))
                };
            }
        }
    }

    fn parse_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        let mut buf = Cursor::new(&self.buffer[..]);

        match Frame::check(&mut buf) {
            Ok(len) => {
                buf.set_position(0);
                let frame = Frame::parse(&mut buf)?;
                self.buffer.advance(len);
                Ok(Some(frame))
            }
            // Not enough buffered data yet; read more from the socket
            Err(CodecError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write a single frame and flush it to the socket.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), CodecError> {
        let bytes = frame.to_bytes()?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Shut down the write half, letting the peer observe EOF.
    pub async fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}
