use super::error::MetainfoError;
use super::info_hash::InfoHash;
use crate::bencode::{decode, encode, Value};
use bytes::Bytes;

/// A parsed torrent file.
///
/// Holds the tracker URL, the typed info dictionary, and the info hash
/// computed over the canonical bencoding of the info dictionary.
///
/// # Examples
///
/// ```no_run
/// use bitfetch::metainfo::Metainfo;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let data = std::fs::read("example.torrent")?;
/// let metainfo = Metainfo::from_bytes(&data)?;
///
/// println!("Tracker URL: {}", metainfo.announce);
/// println!("Info Hash: {}", metainfo.info_hash);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// Tracker announce URL.
    pub announce: String,
    /// The info dictionary containing file and piece information.
    pub info: Info,
    /// The unique identifier for this torrent (SHA-1 of the info dictionary).
    pub info_hash: InfoHash,
    raw_info: Bytes,
}

/// The info dictionary of a single-file torrent.
#[derive(Debug, Clone)]
pub struct Info {
    /// Suggested name for the downloaded file.
    pub name: String,
    /// Number of bytes per piece (the last piece may be shorter).
    pub piece_length: u64,
    /// SHA-1 hash of each piece, 20 bytes per entry.
    pub pieces: Vec<[u8; 20]>,
    /// Total size of the file in bytes.
    pub length: u64,
}

impl Metainfo {
    /// Parses a torrent file from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not valid bencode, a required field
    /// (`announce`, `info`, `name`, `piece length`, `pieces`, `length`) is
    /// missing or has the wrong type, or the piece table does not match the
    /// declared length.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MetainfoError> {
        let value = decode(data)?;
        let dict = value.as_dict().ok_or(MetainfoError::InvalidField("root"))?;

        let announce = dict
            .get(b"announce".as_slice())
            .and_then(|v| v.as_str())
            .ok_or(MetainfoError::MissingField("announce"))?
            .to_string();

        let info_value = dict
            .get(b"info".as_slice())
            .ok_or(MetainfoError::MissingField("info"))?;

        // The decoder enforces sorted dictionary keys, so the re-encoding is
        // byte-identical to the slice the torrent was built from.
        let raw_info = Bytes::from(encode(info_value)?);
        let info_hash = InfoHash::from_info_bytes(&raw_info);

        let info = Info::parse(info_value)?;

        Ok(Self {
            announce,
            info,
            info_hash,
            raw_info,
        })
    }

    /// Returns the bencoded info dictionary.
    ///
    /// Useful for extension protocols that share the raw info dictionary.
    pub fn raw_info(&self) -> &Bytes {
        &self.raw_info
    }
}

impl Info {
    /// Parses an info dictionary from a decoded bencode value.
    pub fn parse(value: &Value) -> Result<Self, MetainfoError> {
        let dict = value.as_dict().ok_or(MetainfoError::InvalidField("info"))?;

        let name = dict
            .get(b"name".as_slice())
            .and_then(|v| v.as_str())
            .ok_or(MetainfoError::MissingField("name"))?
            .to_string();

        let piece_length = dict
            .get(b"piece length".as_slice())
            .and_then(|v| v.as_integer())
            .filter(|v| *v > 0)
            .ok_or(MetainfoError::MissingField("piece length"))? as u64;

        let length = dict
            .get(b"length".as_slice())
            .and_then(|v| v.as_integer())
            .filter(|v| *v >= 0)
            .ok_or(MetainfoError::MissingField("length"))? as u64;

        let pieces_bytes = dict
            .get(b"pieces".as_slice())
            .and_then(|v| v.as_bytes())
            .ok_or(MetainfoError::MissingField("pieces"))?;

        if pieces_bytes.len() % 20 != 0 {
            return Err(MetainfoError::InvalidField("pieces"));
        }

        let pieces: Vec<[u8; 20]> = pieces_bytes
            .chunks_exact(20)
            .map(|chunk| {
                let mut arr = [0u8; 20];
                arr.copy_from_slice(chunk);
                arr
            })
            .collect();

        if pieces.len() as u64 != length.div_ceil(piece_length) {
            return Err(MetainfoError::InvalidField("pieces"));
        }

        Ok(Self {
            name,
            piece_length,
            pieces,
            length,
        })
    }

    /// Parses an info dictionary from its raw bencoded bytes, as received
    /// through the metadata exchange.
    pub fn from_raw(data: &[u8]) -> Result<Self, MetainfoError> {
        Self::parse(&decode(data)?)
    }

    /// Returns the number of pieces.
    pub fn num_pieces(&self) -> usize {
        self.pieces.len()
    }

    /// Returns the length of the piece at the given index.
    ///
    /// Every piece has `piece_length` bytes except the last, which holds
    /// whatever remains.
    pub fn piece_size(&self, index: u32) -> u64 {
        if self.pieces.is_empty() {
            return 0;
        }
        if index as usize == self.pieces.len() - 1 {
            self.length - self.piece_length * (self.pieces.len() as u64 - 1)
        } else {
            self.piece_length
        }
    }
}
