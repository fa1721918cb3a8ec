//! End-to-end tests against in-process mock peers.
//!
//! Each mock seeder listens on a loopback port and speaks just enough of the
//! wire protocol to serve a known file: handshake, bitfield, unchoke, piece
//! frames, and optionally the extension handshake and metadata exchange.

use std::collections::BTreeMap;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use bitfetch::bencode::{encode, Value};
use bitfetch::download::{fetch_info, DownloadError, Downloader};
use bitfetch::metainfo::{Info, InfoHash};
use bitfetch::peer::{
    ExtensionHandshake, Handshake, Message, MetadataMessage, PeerId, PeerSession, HANDSHAKE_LEN,
    UT_METADATA,
};

const PIECE_LENGTH: u64 = 32768;
const FILE_LENGTH: u64 = 92063;
const SEEDER_PEER_ID: &[u8; 20] = b"-MK0001-abcdefghijkl";
const SEEDER_METADATA_ID: u8 = 42;

fn sample_file() -> Vec<u8> {
    (0..FILE_LENGTH).map(|i| (i % 251) as u8).collect()
}

fn sample_info(file: &[u8]) -> Info {
    let pieces = file
        .chunks(PIECE_LENGTH as usize)
        .map(|chunk| {
            let digest: [u8; 20] = Sha1::digest(chunk).into();
            digest
        })
        .collect();

    Info {
        name: "sample.txt".into(),
        piece_length: PIECE_LENGTH,
        pieces,
        length: file.len() as u64,
    }
}

fn raw_info_dict(info: &Info) -> Vec<u8> {
    let mut pieces = Vec::with_capacity(info.pieces.len() * 20);
    for hash in &info.pieces {
        pieces.extend_from_slice(hash);
    }

    let mut dict = BTreeMap::new();
    dict.insert(
        Bytes::from_static(b"length"),
        Value::Integer(info.length as i64),
    );
    dict.insert(Bytes::from_static(b"name"), Value::string(&info.name));
    dict.insert(
        Bytes::from_static(b"piece length"),
        Value::Integer(info.piece_length as i64),
    );
    dict.insert(Bytes::from_static(b"pieces"), Value::Bytes(pieces.into()));

    encode(&Value::Dict(dict)).unwrap()
}

struct SeederConfig {
    file: Vec<u8>,
    /// Serve the metadata exchange when set (and advertise extensions).
    raw_info: Option<Vec<u8>>,
    /// Corrupt the first block of this piece...
    corrupt_piece: Option<u32>,
    /// ...for this many serves of it.
    corrupt_times: u32,
}

impl SeederConfig {
    fn plain(file: Vec<u8>) -> Self {
        Self {
            file,
            raw_info: None,
            corrupt_piece: None,
            corrupt_times: 0,
        }
    }

    fn with_metadata(file: Vec<u8>, raw_info: Vec<u8>) -> Self {
        Self {
            file,
            raw_info: Some(raw_info),
            corrupt_piece: None,
            corrupt_times: 0,
        }
    }
}

async fn spawn_seeder(config: SeederConfig) -> SocketAddrV4 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = match listener.local_addr().unwrap() {
        SocketAddr::V4(addr) => addr,
        SocketAddr::V6(_) => unreachable!("bound to an IPv4 address"),
    };

    let config = Arc::new(config);
    let corrupt_count = Arc::new(AtomicU32::new(0));

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let config = config.clone();
            let corrupt_count = corrupt_count.clone();
            tokio::spawn(async move {
                let _ = serve_peer(stream, config, corrupt_count).await;
            });
        }
    });

    addr
}

async fn serve_peer(
    mut stream: TcpStream,
    config: Arc<SeederConfig>,
    corrupt_count: Arc<AtomicU32>,
) -> std::io::Result<()> {
    let mut buf = [0u8; HANDSHAKE_LEN];
    stream.read_exact(&mut buf).await?;
    let theirs = Handshake::decode(&buf).unwrap();

    let reply = Handshake::new(theirs.info_hash, *SEEDER_PEER_ID, config.raw_info.is_some());
    stream.write_all(&reply.encode()).await?;

    stream
        .write_all(&Message::Bitfield(Bytes::from_static(&[0xff])).encode())
        .await?;

    loop {
        let message = match read_frame(&mut stream).await {
            Ok(message) => message,
            Err(_) => break,
        };

        match message {
            Message::Interested => {
                stream.write_all(&Message::Unchoke.encode()).await?;
            }
            Message::Request {
                index,
                begin,
                length,
            } => {
                let start = index as usize * PIECE_LENGTH as usize + begin as usize;
                let mut data = config.file[start..start + length as usize].to_vec();

                if config.corrupt_piece == Some(index) && begin == 0 {
                    let served = corrupt_count.fetch_add(1, Ordering::SeqCst);
                    if served < config.corrupt_times {
                        data[0] ^= 0xff;
                    }
                }

                stream
                    .write_all(
                        &Message::Piece {
                            index,
                            begin,
                            data: data.into(),
                        }
                        .encode(),
                    )
                    .await?;
            }
            Message::Extended { id: 0, .. } => {
                let raw_info = config.raw_info.as_ref().expect("metadata not configured");
                let mut handshake =
                    ExtensionHandshake::with_extensions(&[(UT_METADATA, SEEDER_METADATA_ID)]);
                handshake.metadata_size = Some(raw_info.len() as i64);
                stream
                    .write_all(
                        &Message::Extended {
                            id: 0,
                            payload: handshake.encode().unwrap(),
                        }
                        .encode(),
                    )
                    .await?;
            }
            Message::Extended { payload, .. } => {
                let raw_info = config.raw_info.as_ref().expect("metadata not configured");
                let request = MetadataMessage::decode(&payload).unwrap();

                let start = request.piece as usize * 16384;
                let end = (start + 16384).min(raw_info.len());
                let reply = MetadataMessage::data(
                    request.piece,
                    raw_info.len() as u32,
                    Bytes::copy_from_slice(&raw_info[start..end]),
                );

                stream
                    .write_all(
                        &Message::Extended {
                            // Addressed by the id the client registered.
                            id: 1,
                            payload: reply.encode().unwrap(),
                        }
                        .encode(),
                    )
                    .await?;
            }
            _ => {}
        }
    }

    Ok(())
}

async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Message> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;

    let mut frame = Vec::with_capacity(4 + len);
    frame.extend_from_slice(&len_buf);
    frame.extend_from_slice(&body);
    Ok(Message::decode(frame.into()).unwrap())
}

#[tokio::test]
async fn download_from_single_seeder() {
    let file = sample_file();
    let info = sample_info(&file);
    let info_hash = InfoHash::from_info_bytes(&raw_info_dict(&info));

    let addr = spawn_seeder(SeederConfig::plain(file.clone())).await;

    let downloader = Downloader::new(info, info_hash, PeerId::generate());
    let downloaded = downloader.download_all(&[addr]).await.unwrap();

    assert_eq!(downloaded.len() as u64, FILE_LENGTH);
    assert_eq!(downloaded.as_ref(), file.as_slice());
}

#[tokio::test]
async fn download_from_multiple_seeders() {
    let file = sample_file();
    let info = sample_info(&file);
    let info_hash = InfoHash::from_info_bytes(&raw_info_dict(&info));

    let mut peers = Vec::new();
    for _ in 0..3 {
        peers.push(spawn_seeder(SeederConfig::plain(file.clone())).await);
    }

    let downloader = Downloader::new(info, info_hash, PeerId::generate());
    let downloaded = downloader.download_all(&peers).await.unwrap();

    assert_eq!(downloaded.as_ref(), file.as_slice());
}

#[tokio::test]
async fn download_to_writes_file_atomically() {
    let file = sample_file();
    let info = sample_info(&file);
    let info_hash = InfoHash::from_info_bytes(&raw_info_dict(&info));

    let addr = spawn_seeder(SeederConfig::plain(file.clone())).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.txt");

    let downloader = Downloader::new(info, info_hash, PeerId::generate());
    downloader.download_to(&[addr], &path).await.unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), file);
    assert!(!dir.path().join("sample.txt.part").exists());
}

#[tokio::test]
async fn retry_recovers_from_corrupt_pieces() {
    let file = sample_file();
    let info = sample_info(&file);
    let info_hash = InfoHash::from_info_bytes(&raw_info_dict(&info));

    let addr = spawn_seeder(SeederConfig {
        file: file.clone(),
        raw_info: None,
        corrupt_piece: Some(1),
        corrupt_times: 2,
    })
    .await;

    let downloader = Downloader::new(info, info_hash, PeerId::generate());
    let downloaded = downloader.download_all(&[addr]).await.unwrap();

    assert_eq!(downloaded.as_ref(), file.as_slice());
}

#[tokio::test]
async fn download_fails_when_piece_never_verifies() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .try_init();
    let file = sample_file();
    let info = sample_info(&file);
    let info_hash = InfoHash::from_info_bytes(&raw_info_dict(&info));

    let addr = spawn_seeder(SeederConfig {
        file,
        raw_info: None,
        corrupt_piece: Some(1),
        corrupt_times: u32::MAX,
    })
    .await;

    let downloader = Downloader::new(info, info_hash, PeerId::generate());
    match downloader.download_all(&[addr]).await {
        Err(DownloadError::PiecesFailed(indices)) => assert_eq!(indices, vec![1]),
        other => panic!("expected PiecesFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn handshake_reports_remote_peer() {
    let file = sample_file();
    let info = sample_info(&file);
    let raw_info = raw_info_dict(&info);
    let info_hash = InfoHash::from_info_bytes(&raw_info);

    let addr = spawn_seeder(SeederConfig::with_metadata(file, raw_info)).await;

    let session = PeerSession::connect(addr, &info_hash, &PeerId::generate(), true)
        .await
        .unwrap();

    assert_eq!(session.remote_peer_id.as_bytes(), SEEDER_PEER_ID);
    assert!(session.supports_extensions);
}

#[tokio::test]
async fn magnet_bootstrap_fetches_info() {
    let file = sample_file();
    let info = sample_info(&file);
    let raw_info = raw_info_dict(&info);
    let info_hash = InfoHash::from_info_bytes(&raw_info);

    let addr = spawn_seeder(SeederConfig::with_metadata(file, raw_info)).await;

    let fetched = fetch_info(&[addr], &info_hash, &PeerId::generate())
        .await
        .unwrap();

    assert_eq!(fetched.length, info.length);
    assert_eq!(fetched.piece_length, info.piece_length);
    assert_eq!(fetched.pieces, info.pieces);
}

#[tokio::test]
async fn magnet_flow_end_to_end() {
    let file = sample_file();
    let info = sample_info(&file);
    let raw_info = raw_info_dict(&info);
    let info_hash = InfoHash::from_info_bytes(&raw_info);

    let addr = spawn_seeder(SeederConfig::with_metadata(file.clone(), raw_info)).await;

    let fetched = fetch_info(&[addr], &info_hash, &PeerId::generate())
        .await
        .unwrap();

    let downloader = Downloader::new(fetched, info_hash, PeerId::generate());
    let downloaded = downloader.download_all(&[addr]).await.unwrap();

    assert_eq!(downloaded.as_ref(), file.as_slice());
}
