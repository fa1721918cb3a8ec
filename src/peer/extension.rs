use super::error::PeerError;
use crate::bencode::{decode, encode, Value};
use bytes::Bytes;
use std::collections::BTreeMap;

/// Extended-message id reserved for the extension handshake itself.
pub const EXTENSION_HANDSHAKE_ID: u8 = 0;

/// The BEP-9 metadata exchange, as named in the extension handshake.
pub const UT_METADATA: &str = "ut_metadata";

/// The extended-message id we register for `ut_metadata`.
pub const LOCAL_METADATA_ID: u8 = 1;

/// The BEP-10 extension handshake payload.
///
/// Carried in an extended message with id 0, it maps extension names to the
/// numeric ids the sender will accept them under.
#[derive(Debug, Clone, Default)]
pub struct ExtensionHandshake {
    /// The `m` dictionary: extension name to extended-message id.
    pub extensions: BTreeMap<String, u8>,
    /// Client name and version (the `v` key).
    pub client: Option<String>,
    /// Size of the info dictionary in bytes, when the sender has it.
    pub metadata_size: Option<i64>,
}

impl ExtensionHandshake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extensions(extensions: &[(&str, u8)]) -> Self {
        let mut hs = Self::new();
        for (name, id) in extensions {
            hs.extensions.insert((*name).to_string(), *id);
        }
        hs
    }

    pub fn encode(&self) -> Result<Bytes, PeerError> {
        let mut dict = BTreeMap::new();

        let mut m = BTreeMap::new();
        for (name, id) in &self.extensions {
            m.insert(
                Bytes::copy_from_slice(name.as_bytes()),
                Value::Integer(*id as i64),
            );
        }
        dict.insert(Bytes::from_static(b"m"), Value::Dict(m));

        if let Some(ref client) = self.client {
            dict.insert(Bytes::from_static(b"v"), Value::string(client));
        }

        if let Some(size) = self.metadata_size {
            dict.insert(Bytes::from_static(b"metadata_size"), Value::Integer(size));
        }

        let encoded = encode(&Value::Dict(dict))?;
        Ok(Bytes::from(encoded))
    }

    pub fn decode(data: &[u8]) -> Result<Self, PeerError> {
        let value = decode(data)?;
        let dict = value
            .as_dict()
            .ok_or_else(|| PeerError::Extension("expected dict".into()))?;

        let mut hs = Self::new();

        if let Some(m) = dict.get(b"m".as_slice()).and_then(|v| v.as_dict()) {
            for (key, val) in m {
                if let (Ok(name), Some(id)) = (std::str::from_utf8(key), val.as_integer()) {
                    if id > 0 {
                        hs.extensions.insert(name.to_string(), id as u8);
                    }
                }
            }
        }

        hs.client = dict
            .get(b"v".as_slice())
            .and_then(|v| v.as_str())
            .map(String::from);

        hs.metadata_size = dict
            .get(b"metadata_size".as_slice())
            .and_then(|v| v.as_integer());

        Ok(hs)
    }

    pub fn get_extension_id(&self, name: &str) -> Option<u8> {
        self.extensions.get(name).copied()
    }
}
