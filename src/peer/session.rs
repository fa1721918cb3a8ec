use std::net::SocketAddrV4;

use bytes::{Bytes, BytesMut};
use sha1::{Digest, Sha1};
use tokio::net::TcpStream;
use tracing::debug;

use super::error::PeerError;
use super::extension::{ExtensionHandshake, EXTENSION_HANDSHAKE_ID, LOCAL_METADATA_ID, UT_METADATA};
use super::message::{Handshake, Message};
use super::metadata::{MetadataMessage, MetadataMessageType};
use super::peer_id::PeerId;
use super::transport::PeerTransport;
use crate::metainfo::InfoHash;

/// The block size used for piece requests (16 KB).
pub const BLOCK_SIZE: u32 = 16 * 1024;

/// Where a session currently is in the protocol.
///
/// A session moves strictly forward; any transport or protocol error closes
/// it, and the socket closes with it on drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Dialing,
    HandshakeSent,
    HandshakeAcked,
    BitfieldReceived,
    ExtensionHandshaked,
    Unchoked,
    Requesting,
    Closed,
}

/// A single connection to one peer.
///
/// The session owns the connection and performs only serial, blocking
/// exchanges: one message is written, then the reply is read. The download
/// flow is handshake, bitfield, interested/unchoke, then one request/piece
/// round trip per block. Magnet sessions insert the extension handshake and
/// metadata fetch after the bitfield.
pub struct PeerSession {
    addr: SocketAddrV4,
    transport: PeerTransport,
    pub state: SessionState,
    /// The peer id the remote sent in its handshake.
    pub remote_peer_id: PeerId,
    /// Whether the remote set the extension bit in its reserved bytes.
    pub supports_extensions: bool,
    metadata_ext_id: Option<u8>,
    metadata_size: Option<u64>,
}

impl PeerSession {
    /// Dials a peer and performs the 68-byte handshake.
    ///
    /// Fails with [`PeerError::InfoHashMismatch`] if the peer echoes a
    /// different info hash than ours.
    pub async fn connect(
        addr: SocketAddrV4,
        info_hash: &InfoHash,
        peer_id: &PeerId,
        extensions: bool,
    ) -> Result<Self, PeerError> {
        debug!(%addr, "dialing peer");
        let stream = TcpStream::connect(addr).await?;
        let mut transport = PeerTransport::new(stream);

        let handshake = Handshake::new(*info_hash.as_bytes(), *peer_id.as_bytes(), extensions);
        transport.send_handshake(&handshake).await?;

        let theirs = transport.receive_handshake().await?;
        if theirs.info_hash != *info_hash.as_bytes() {
            return Err(PeerError::InfoHashMismatch);
        }

        let remote_peer_id = PeerId::from_bytes(theirs.peer_id);
        debug!(%addr, remote = %remote_peer_id, "handshake complete");

        Ok(Self {
            addr,
            transport,
            state: SessionState::HandshakeAcked,
            remote_peer_id,
            supports_extensions: theirs.supports_extensions(),
            metadata_ext_id: None,
            metadata_size: None,
        })
    }

    /// Reads the frame peers send right after the handshake.
    ///
    /// The bitfield contents are not consulted for piece routing; a piece a
    /// peer cannot serve fails and is redispatched elsewhere.
    pub async fn await_bitfield(&mut self) -> Result<(), PeerError> {
        let message = self.transport.receive_message().await?;
        debug!(addr = %self.addr, kind = message.name(), "discarding post-handshake frame");
        self.state = SessionState::BitfieldReceived;
        Ok(())
    }

    /// Sends `interested` and reads frames until the peer unchokes us.
    ///
    /// Bitfield, have, and keep-alive frames arriving in between are
    /// discarded; a choke simply keeps us waiting.
    pub async fn express_interest(&mut self) -> Result<(), PeerError> {
        self.transport.send_message(&Message::Interested).await?;

        loop {
            match self.transport.receive_message().await? {
                Message::Unchoke => break,
                other => {
                    debug!(addr = %self.addr, kind = other.name(), "waiting for unchoke");
                }
            }
        }

        self.state = SessionState::Unchoked;
        Ok(())
    }

    /// Downloads and verifies one piece.
    ///
    /// Blocks are requested in ascending `begin` order, one outstanding
    /// request at a time, each at most [`BLOCK_SIZE`] bytes. The assembled
    /// piece must hash to `expected`.
    pub async fn download_piece(
        &mut self,
        index: u32,
        piece_len: u64,
        expected: &[u8; 20],
    ) -> Result<Bytes, PeerError> {
        self.state = SessionState::Requesting;

        let mut piece = BytesMut::with_capacity(piece_len as usize);
        let mut begin: u32 = 0;

        while (begin as u64) < piece_len {
            let length = BLOCK_SIZE.min((piece_len - begin as u64) as u32);
            self.transport
                .send_message(&Message::Request {
                    index,
                    begin,
                    length,
                })
                .await?;

            let data = loop {
                match self.transport.receive_message().await? {
                    Message::Piece {
                        index: got_index,
                        begin: got_begin,
                        data,
                    } => {
                        if got_index != index || got_begin != begin {
                            return Err(PeerError::InvalidMessage(format!(
                                "block ({got_index}, {got_begin}) does not match request ({index}, {begin})"
                            )));
                        }
                        break data;
                    }
                    Message::KeepAlive => continue,
                    other => return Err(PeerError::UnexpectedMessage(other.name())),
                }
            };

            if data.len() != length as usize {
                return Err(PeerError::InvalidMessage(format!(
                    "block length {} does not match requested {}",
                    data.len(),
                    length
                )));
            }

            piece.extend_from_slice(&data);
            begin += length;
        }

        let actual: [u8; 20] = Sha1::digest(&piece).into();
        if actual != *expected {
            return Err(PeerError::HashMismatch {
                index,
                expected: hex(expected),
                actual: hex(&actual),
            });
        }

        debug!(addr = %self.addr, piece = index, len = piece.len(), "piece verified");
        Ok(piece.freeze())
    }

    /// Performs the BEP-10 extension handshake, registering our interest in
    /// `ut_metadata` and recording the id the peer chose for it.
    pub async fn extension_handshake(&mut self) -> Result<(), PeerError> {
        let ours = ExtensionHandshake::with_extensions(&[(UT_METADATA, LOCAL_METADATA_ID)]);
        self.transport
            .send_message(&Message::Extended {
                id: EXTENSION_HANDSHAKE_ID,
                payload: ours.encode()?,
            })
            .await?;

        let theirs = loop {
            match self.transport.receive_message().await? {
                Message::Extended { id, payload } if id == EXTENSION_HANDSHAKE_ID => {
                    break ExtensionHandshake::decode(&payload)?;
                }
                Message::KeepAlive | Message::Bitfield(_) | Message::Have { .. } => continue,
                other => return Err(PeerError::UnexpectedMessage(other.name())),
            }
        };

        let ut_metadata = theirs.get_extension_id(UT_METADATA).ok_or_else(|| {
            PeerError::Extension("peer does not offer ut_metadata".into())
        })?;

        debug!(addr = %self.addr, ut_metadata, metadata_size = ?theirs.metadata_size, "extension handshake complete");

        self.metadata_ext_id = Some(ut_metadata);
        self.metadata_size = theirs.metadata_size.map(|s| s as u64);
        self.state = SessionState::ExtensionHandshaked;
        Ok(())
    }

    /// Fetches the raw info dictionary through the metadata exchange.
    ///
    /// Metadata pieces are requested in order and concatenated; the result
    /// must hash to `expected` (the magnet link's info hash).
    pub async fn fetch_metadata(&mut self, expected: &InfoHash) -> Result<Bytes, PeerError> {
        let ext_id = self.metadata_ext_id.ok_or_else(|| {
            PeerError::Extension("extension handshake not completed".into())
        })?;

        let mut raw = BytesMut::new();
        let mut piece: u32 = 0;

        loop {
            let request = MetadataMessage::request(piece);
            self.transport
                .send_message(&Message::Extended {
                    id: ext_id,
                    payload: request.encode()?,
                })
                .await?;

            let payload = loop {
                match self.transport.receive_message().await? {
                    Message::Extended { id, payload } if id != EXTENSION_HANDSHAKE_ID => {
                        break payload;
                    }
                    Message::KeepAlive | Message::Have { .. } => continue,
                    other => return Err(PeerError::UnexpectedMessage(other.name())),
                }
            };

            let message = MetadataMessage::decode(&payload)?;
            match message.msg_type {
                MetadataMessageType::Data => {}
                MetadataMessageType::Reject => {
                    return Err(PeerError::Extension(format!(
                        "peer rejected metadata piece {piece}"
                    )));
                }
                MetadataMessageType::Request => {
                    return Err(PeerError::UnexpectedMessage("metadata request"));
                }
            }

            let data = message
                .data
                .ok_or_else(|| PeerError::Extension("data message without payload".into()))?;
            raw.extend_from_slice(&data);

            let total_size = message
                .total_size
                .map(u64::from)
                .or(self.metadata_size)
                .ok_or_else(|| PeerError::Extension("missing total_size".into()))?;

            if raw.len() as u64 >= total_size {
                break;
            }
            piece += 1;
        }

        let raw = raw.freeze();
        let actual: [u8; 20] = Sha1::digest(&raw).into();
        if actual != *expected.as_bytes() {
            return Err(PeerError::MetadataHashMismatch {
                expected: expected.to_hex(),
                actual: hex(&actual),
            });
        }

        debug!(addr = %self.addr, len = raw.len(), "metadata verified");
        Ok(raw)
    }

    pub fn addr(&self) -> SocketAddrV4 {
        self.addr
    }

    /// Marks the session closed. The socket itself closes when the session
    /// is dropped, on every exit path.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}
