//! Torrent metainfo handling (BEP-3, BEP-9)
//!
//! This module parses torrent metainfo files and magnet links and computes
//! info hashes.

mod error;
mod info_hash;
mod magnet;
mod torrent;

pub use error::MetainfoError;
pub use info_hash::InfoHash;
pub use magnet::MagnetLink;
pub use torrent::{Info, Metainfo};

#[cfg(test)]
mod tests;
