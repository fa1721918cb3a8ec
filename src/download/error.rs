use thiserror::Error;

use crate::metainfo::MetainfoError;
use crate::peer::PeerError;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("tracker returned no peers")]
    NoPeers,

    #[error("pieces failed after retries: {0:?}")]
    PiecesFailed(Vec<u32>),

    #[error("no peer yielded valid metadata")]
    MetadataUnavailable,

    #[error("peer error: {0}")]
    Peer(#[from] PeerError),

    #[error("metainfo error: {0}")]
    Metainfo(#[from] MetainfoError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
