use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::error::TrackerError;
use super::response::AnnounceResponse;
use crate::metainfo::InfoHash;
use crate::peer::PeerId;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The port reported to the tracker in announce requests.
pub const DEFAULT_PORT: u16 = 6881;

/// An HTTP tracker client ([BEP-3]).
///
/// [BEP-3]: http://bittorrent.org/beps/bep_0003.html
pub struct HttpTracker {
    client: Client,
    url: String,
}

impl HttpTracker {
    pub fn new(url: &str) -> Result<Self, TrackerError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(TrackerError::InvalidUrl(url.to_string()));
        }

        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(TrackerError::Http)?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Announces to the tracker and returns the peer list.
    ///
    /// `left` is the number of bytes still needed; callers on the magnet
    /// path pass a placeholder because the total length is not yet known.
    pub async fn announce(
        &self,
        info_hash: &InfoHash,
        peer_id: &PeerId,
        left: u64,
    ) -> Result<AnnounceResponse, TrackerError> {
        let url = format!(
            "{}?info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}&compact=1",
            self.url,
            info_hash.url_encode(),
            url_encode(peer_id.as_bytes()),
            DEFAULT_PORT,
            left,
        );

        debug!(url = %self.url, "announcing to tracker");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::BadStatus(status.as_u16()));
        }

        let body = response.bytes().await?;
        let announce = AnnounceResponse::from_bytes(&body)?;

        debug!(peers = announce.peers.len(), "tracker replied");
        Ok(announce)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn url_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.' || b == b'~' {
                format!("{}", b as char)
            } else {
                format!("%{:02X}", b)
            }
        })
        .collect()
}
