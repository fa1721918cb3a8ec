//! Peer wire protocol (BEP-3, BEP-9, BEP-10)
//!
//! This module implements the BitTorrent peer wire protocol: the fixed
//! handshake, the length-prefixed message stream, the extension protocol
//! handshake, and the metadata exchange used by magnet downloads.

mod error;
mod extension;
mod message;
mod metadata;
mod peer_id;
mod session;
mod transport;

pub use error::PeerError;
pub use extension::{ExtensionHandshake, EXTENSION_HANDSHAKE_ID, LOCAL_METADATA_ID, UT_METADATA};
pub use message::{Handshake, Message, MessageId, HANDSHAKE_LEN};
pub use metadata::{metadata_piece_count, MetadataMessage, MetadataMessageType};
pub use peer_id::PeerId;
pub use session::{PeerSession, SessionState, BLOCK_SIZE};
pub use transport::PeerTransport;
