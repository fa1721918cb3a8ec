//! bitfetch - a command-line BitTorrent client
//!
//! The library implements the download path of the BitTorrent protocol:
//! metainfo files and magnet links in, a verified file on disk out.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 bencode encoding/decoding
//! - [`metainfo`] - Torrent metainfo, magnet links, info hashes
//! - [`tracker`] - HTTP tracker announce and compact peer lists
//! - [`peer`] - Peer wire protocol, extension handshake, metadata exchange
//! - [`download`] - Concurrent piece scheduling and file assembly

pub mod bencode;
pub mod download;
pub mod metainfo;
pub mod peer;
pub mod tracker;

pub use bencode::{decode, encode, BencodeError, Value};
pub use download::{DownloadError, Downloader};
pub use metainfo::{Info, InfoHash, MagnetLink, Metainfo, MetainfoError};
pub use peer::{Handshake, Message, PeerError, PeerId, PeerSession, SessionState};
pub use tracker::{AnnounceResponse, HttpTracker, TrackerError};
