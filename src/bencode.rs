//! Bencode encoding and decoding (BEP-3)
//!
//! Bencode is the serialization format BitTorrent uses for metainfo files,
//! tracker responses, and extension-protocol payloads.

mod decode;
mod encode;
mod error;
mod value;

pub use decode::{decode, decode_prefix};
pub use encode::encode;
pub use error::BencodeError;
pub use value::Value;
