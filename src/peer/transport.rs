use super::error::PeerError;
use super::message::{Handshake, Message, HANDSHAKE_LEN};
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
const MAX_ZERO_READS: u32 = 10;
const READ_TIMEOUT: Duration = Duration::from_secs(120);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// A framed view over a peer TCP stream.
///
/// Reads honor the exact-length contract of the wire protocol: first the
/// 4-byte length prefix, then exactly that many bytes. A read that returns
/// zero bytes counts as a strike; after [`MAX_ZERO_READS`] strikes the
/// connection is considered dead, which bounds waits on half-open sockets.
pub struct PeerTransport {
    stream: TcpStream,
    read_buf: BytesMut,
}

impl PeerTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(32 * 1024),
        }
    }

    pub async fn send_handshake(&mut self, handshake: &Handshake) -> Result<(), PeerError> {
        let data = handshake.encode();
        timeout(WRITE_TIMEOUT, self.stream.write_all(&data))
            .await
            .map_err(|_| PeerError::Timeout)??;
        Ok(())
    }

    pub async fn receive_handshake(&mut self) -> Result<Handshake, PeerError> {
        let data = self.read_exactly(HANDSHAKE_LEN).await?;
        Handshake::decode(&data)
    }

    pub async fn send_message(&mut self, message: &Message) -> Result<(), PeerError> {
        let data = message.encode();
        timeout(WRITE_TIMEOUT, self.stream.write_all(&data))
            .await
            .map_err(|_| PeerError::Timeout)??;
        Ok(())
    }

    /// Reads one length-prefixed frame and decodes it.
    pub async fn receive_message(&mut self) -> Result<Message, PeerError> {
        let header = self.read_exactly(4).await?;
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;

        if length > MAX_MESSAGE_SIZE {
            return Err(PeerError::InvalidMessage(format!(
                "message too large: {}",
                length
            )));
        }

        let body = self.read_exactly(length).await?;

        let mut frame = BytesMut::with_capacity(4 + length);
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&body);
        Message::decode(frame.freeze())
    }

    async fn read_exactly(&mut self, n: usize) -> Result<Bytes, PeerError> {
        let mut zero_reads = 0u32;
        while self.read_buf.len() < n {
            let read = timeout(READ_TIMEOUT, self.stream.read_buf(&mut self.read_buf))
                .await
                .map_err(|_| PeerError::Timeout)??;

            if read == 0 {
                zero_reads += 1;
                if zero_reads > MAX_ZERO_READS {
                    return Err(PeerError::ConnectionClosed);
                }
            }
        }

        Ok(self.read_buf.split_to(n).freeze())
    }
}
