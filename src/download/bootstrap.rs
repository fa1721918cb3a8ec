use std::net::SocketAddrV4;

use tracing::{debug, info};

use super::error::DownloadError;
use crate::metainfo::{Info, InfoHash};
use crate::peer::{PeerError, PeerId, PeerSession};

/// Obtains the info dictionary from the swarm, given only the info hash.
///
/// Peers are tried in tracker order; those that do not advertise extension
/// support, or fail anywhere in the exchange, are skipped. The first peer
/// whose metadata hashes to `info_hash` wins.
pub async fn fetch_info(
    peers: &[SocketAddrV4],
    info_hash: &InfoHash,
    peer_id: &PeerId,
) -> Result<Info, DownloadError> {
    if peers.is_empty() {
        return Err(DownloadError::NoPeers);
    }

    for &addr in peers {
        match fetch_info_from(addr, info_hash, peer_id).await {
            Ok(info) => {
                info!(peer = %addr, pieces = info.num_pieces(), "metadata obtained");
                return Ok(info);
            }
            Err(err) => {
                debug!(peer = %addr, %err, "metadata fetch failed, trying next peer");
            }
        }
    }

    Err(DownloadError::MetadataUnavailable)
}

/// Fetches and parses the info dictionary from a single peer.
async fn fetch_info_from(
    addr: SocketAddrV4,
    info_hash: &InfoHash,
    peer_id: &PeerId,
) -> Result<Info, DownloadError> {
    let mut session = probe_extension_peer(addr, info_hash, peer_id).await?;
    session.extension_handshake().await?;
    let raw = session.fetch_metadata(info_hash).await?;
    session.close();
    Ok(Info::from_raw(&raw)?)
}

/// Connects to a peer with the extension bit set and reads past the
/// bitfield, leaving the session ready for the extension handshake.
///
/// Fails if the remote did not set the extension bit in its handshake.
pub async fn probe_extension_peer(
    addr: SocketAddrV4,
    info_hash: &InfoHash,
    peer_id: &PeerId,
) -> Result<PeerSession, PeerError> {
    let mut session = PeerSession::connect(addr, info_hash, peer_id, true).await?;
    if !session.supports_extensions {
        return Err(PeerError::Extension(
            "peer does not support the extension protocol".into(),
        ));
    }
    session.await_bitfield().await?;
    Ok(session)
}
