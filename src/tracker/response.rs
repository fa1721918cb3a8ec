use std::net::{Ipv4Addr, SocketAddrV4};

use super::error::TrackerError;
use crate::bencode::decode;

/// A tracker's reply to an announce request.
#[derive(Debug, Clone)]
pub struct AnnounceResponse {
    /// Seconds the tracker asks us to wait before re-announcing.
    pub interval: Option<u32>,
    /// Peer endpoints, in the order the tracker listed them.
    pub peers: Vec<SocketAddrV4>,
}

impl AnnounceResponse {
    /// Parses a bencoded announce response body.
    ///
    /// The `peers` value must be the compact byte-string form: 6 bytes per
    /// peer, 4 for the IPv4 address and 2 for the big-endian port.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not bencode, the tracker reported a
    /// `failure reason`, `peers` is missing or not a byte string, or its
    /// length is not a multiple of 6.
    pub fn from_bytes(body: &[u8]) -> Result<Self, TrackerError> {
        let value = decode(body)?;
        let dict = value
            .as_dict()
            .ok_or_else(|| TrackerError::InvalidResponse("expected dict".into()))?;

        if let Some(failure) = dict
            .get(b"failure reason".as_slice())
            .and_then(|v| v.as_str())
        {
            return Err(TrackerError::Failure(failure.to_string()));
        }

        let interval = dict
            .get(b"interval".as_slice())
            .and_then(|v| v.as_integer())
            .map(|v| v as u32);

        let peers_bytes = dict
            .get(b"peers".as_slice())
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| TrackerError::InvalidResponse("missing compact peers".into()))?;

        let peers = parse_compact_peers(peers_bytes)?;

        Ok(Self { interval, peers })
    }
}

/// Parses a compact peer list: 6 bytes per peer (BEP-23).
pub fn parse_compact_peers(data: &[u8]) -> Result<Vec<SocketAddrV4>, TrackerError> {
    if data.len() % 6 != 0 {
        return Err(TrackerError::InvalidResponse(format!(
            "peers length {} not divisible by 6",
            data.len()
        )));
    }

    Ok(data
        .chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddrV4::new(ip, port)
        })
        .collect())
}
