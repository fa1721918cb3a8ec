use std::net::SocketAddrV4;
use std::path::Path;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::error::DownloadError;
use crate::metainfo::{Info, InfoHash};
use crate::peer::{PeerError, PeerId, PeerSession};

/// Upper bound on concurrent peer sessions.
pub const MAX_WORKERS: usize = 10;

/// Attempts granted to each piece before it is declared failed.
pub const MAX_ATTEMPTS: u32 = 10;

/// A piece queued for download.
#[derive(Debug, Clone, Copy)]
struct PieceWork {
    index: u32,
    attempt: u32,
}

/// A piece that downloaded and verified successfully.
#[derive(Debug)]
struct DownloadedPiece {
    index: u32,
    data: Bytes,
}

/// Downloads all pieces of a torrent from a set of peers.
///
/// Workers are stateless: each pulls a piece index from a shared queue,
/// opens a fresh connection to its peer, downloads and verifies the piece,
/// and either reports the bytes or re-queues the index with a bumped
/// attempt counter. Idle peers drain the queue faster than slow ones, so
/// work migrates to whoever can serve it.
pub struct Downloader {
    info: Arc<Info>,
    info_hash: InfoHash,
    peer_id: PeerId,
}

impl Downloader {
    pub fn new(info: Info, info_hash: InfoHash, peer_id: PeerId) -> Self {
        Self {
            info: Arc::new(info),
            info_hash,
            peer_id,
        }
    }

    /// Downloads every piece and returns the assembled file contents.
    ///
    /// Fails with [`DownloadError::PiecesFailed`] listing the indices that
    /// exhausted their retry budget.
    pub async fn download_all(&self, peers: &[SocketAddrV4]) -> Result<Bytes, DownloadError> {
        if peers.is_empty() {
            return Err(DownloadError::NoPeers);
        }

        let num_pieces = self.info.num_pieces();
        if num_pieces == 0 {
            return Ok(Bytes::new());
        }
        let num_workers = peers.len().min(MAX_WORKERS);

        // Each channel holds num_pieces items and at most one live work item
        // exists per piece index, so no send ever blocks on a consumer.
        let (work_tx, work_rx) = mpsc::channel::<PieceWork>(num_pieces);
        let (results_tx, mut results_rx) = mpsc::channel::<DownloadedPiece>(num_pieces);
        let (failures_tx, mut failures_rx) = mpsc::channel::<u32>(num_pieces);

        for index in 0..num_pieces as u32 {
            // The receiver is still in scope, the queue cannot be full.
            let _ = work_tx.try_send(PieceWork { index, attempt: 1 });
        }

        info!(
            pieces = num_pieces,
            peers = peers.len(),
            workers = num_workers,
            "starting download"
        );

        let work_rx = Arc::new(Mutex::new(work_rx));
        let mut workers = JoinSet::new();
        for &addr in peers.iter().take(num_workers) {
            workers.spawn(piece_worker(
                addr,
                self.info.clone(),
                self.info_hash,
                self.peer_id,
                work_tx.clone(),
                work_rx.clone(),
                results_tx.clone(),
                failures_tx.clone(),
            ));
        }
        drop(work_tx);

        let mut pieces: Vec<Option<Bytes>> = vec![None; num_pieces];
        let mut failed: Vec<u32> = Vec::new();
        let mut settled = 0usize;

        while settled < num_pieces {
            tokio::select! {
                Some(piece) = results_rx.recv() => {
                    pieces[piece.index as usize] = Some(piece.data);
                    settled += 1;
                }
                Some(index) = failures_rx.recv() => {
                    failed.push(index);
                    settled += 1;
                }
            }
        }

        // Every piece is accounted for; closing the queue lets the workers
        // drain and exit.
        work_rx.lock().await.close();
        while workers.join_next().await.is_some() {}

        if !failed.is_empty() {
            failed.sort_unstable();
            return Err(DownloadError::PiecesFailed(failed));
        }

        let mut file = BytesMut::with_capacity(self.info.length as usize);
        for piece in pieces.into_iter().flatten() {
            file.extend_from_slice(&piece);
        }

        info!(bytes = file.len(), "download complete");
        Ok(file.freeze())
    }

    /// Downloads every piece and writes the file to `path`.
    ///
    /// The file lands atomically: bytes go to a `.part` sibling which is
    /// renamed over the target once complete.
    pub async fn download_to(
        &self,
        peers: &[SocketAddrV4],
        path: &Path,
    ) -> Result<(), DownloadError> {
        let file = self.download_all(peers).await?;
        write_atomic(path, &file).await?;
        Ok(())
    }
}

/// Downloads a single piece from one peer over a fresh connection.
pub async fn fetch_piece(
    addr: SocketAddrV4,
    info: &Info,
    info_hash: &InfoHash,
    peer_id: &PeerId,
    index: u32,
) -> Result<Bytes, PeerError> {
    let mut session = PeerSession::connect(addr, info_hash, peer_id, false).await?;
    session.await_bitfield().await?;
    session.express_interest().await?;
    let piece = session
        .download_piece(index, info.piece_size(index), &info.pieces[index as usize])
        .await?;
    session.close();
    Ok(piece)
}

#[allow(clippy::too_many_arguments)]
async fn piece_worker(
    addr: SocketAddrV4,
    info: Arc<Info>,
    info_hash: InfoHash,
    peer_id: PeerId,
    work_tx: mpsc::Sender<PieceWork>,
    work_rx: Arc<Mutex<mpsc::Receiver<PieceWork>>>,
    results_tx: mpsc::Sender<DownloadedPiece>,
    failures_tx: mpsc::Sender<u32>,
) {
    loop {
        let item = { work_rx.lock().await.recv().await };
        let Some(item) = item else { break };

        match fetch_piece(addr, &info, &info_hash, &peer_id, item.index).await {
            Ok(data) => {
                debug!(peer = %addr, piece = item.index, "piece downloaded");
                let _ = results_tx
                    .send(DownloadedPiece {
                        index: item.index,
                        data,
                    })
                    .await;
            }
            Err(err) => {
                warn!(
                    peer = %addr,
                    piece = item.index,
                    attempt = item.attempt,
                    %err,
                    "piece attempt failed"
                );
                if item.attempt < MAX_ATTEMPTS {
                    // Re-queue for any worker; the send only fails once the
                    // collector has closed the queue, and then nothing is
                    // owed anymore.
                    if work_tx
                        .send(PieceWork {
                            index: item.index,
                            attempt: item.attempt + 1,
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                } else {
                    let _ = failures_tx.send(item.index).await;
                }
            }
        }
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    let tmp = path.with_file_name(format!("{file_name}.part"));

    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
