use super::*;
use crate::metainfo::{Info, InfoHash};
use crate::peer::PeerId;

fn tiny_info() -> Info {
    Info {
        name: "sample.txt".into(),
        piece_length: 32768,
        pieces: vec![[0u8; 20]; 3],
        length: 92063,
    }
}

#[tokio::test]
async fn test_download_all_requires_peers() {
    let downloader = Downloader::new(tiny_info(), InfoHash::from_bytes([0u8; 20]), PeerId::generate());

    assert!(matches!(
        downloader.download_all(&[]).await,
        Err(DownloadError::NoPeers)
    ));
}

#[tokio::test]
async fn test_fetch_info_requires_peers() {
    let result = fetch_info(&[], &InfoHash::from_bytes([0u8; 20]), &PeerId::generate()).await;
    assert!(matches!(result, Err(DownloadError::NoPeers)));
}

#[test]
fn test_block_layout_of_short_last_piece() {
    // 92063-byte file, 32768-byte pieces: the last piece is 26527 bytes and
    // needs two block requests (16384 + 10143).
    let info = tiny_info();
    let last = info.piece_size(2);
    assert_eq!(last, 26527);

    let block = u64::from(crate::peer::BLOCK_SIZE);
    assert_eq!(last.div_ceil(block), 2);
    assert_eq!(last - block, 10143);
}
