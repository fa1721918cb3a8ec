//! bitfetch - command-line entry point.
//!
//! Thin dispatch over the library: each subcommand parses its inputs,
//! drives the download engine, and prints in the format the command
//! contract fixes. Logging goes to stderr so stdout stays machine-readable.

use std::net::SocketAddrV4;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use bitfetch::bencode::{decode, Value};
use bitfetch::download::{fetch_info, fetch_piece, probe_extension_peer, Downloader};
use bitfetch::metainfo::{Info, InfoHash, MagnetLink, Metainfo};
use bitfetch::peer::{PeerId, PeerSession};
use bitfetch::tracker::HttpTracker;

/// The `left` value reported to the tracker when the total length is not
/// yet known (magnet path), kept for tracker compatibility.
const UNKNOWN_LEFT: u64 = 999;

#[derive(Debug, Parser)]
#[command(name = "bitfetch", about = "A command-line BitTorrent client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
#[command(rename_all = "snake_case")]
enum Command {
    /// Decode a bencoded value and print it as JSON.
    Decode { value: String },
    /// Print metainfo details of a torrent file.
    Info { torrent: PathBuf },
    /// Print the peers the tracker returns for a torrent file.
    Peers { torrent: PathBuf },
    /// Handshake with one peer and print its peer id.
    Handshake { torrent: PathBuf, peer: String },
    /// Download a single piece to a file.
    DownloadPiece {
        #[arg(short = 'o', value_name = "OUT")]
        output: PathBuf,
        torrent: PathBuf,
        index: u32,
    },
    /// Download the whole file.
    Download {
        #[arg(short = 'o', value_name = "OUT")]
        output: PathBuf,
        torrent: PathBuf,
    },
    /// Print the tracker URL and info hash of a magnet link.
    MagnetParse { magnet: String },
    /// Handshake with an extension-capable peer from a magnet link.
    MagnetHandshake { magnet: String },
    /// Fetch metadata via a magnet link and print metainfo details.
    MagnetInfo { magnet: String },
    /// Download a single piece via a magnet link.
    MagnetDownloadPiece {
        #[arg(short = 'o', value_name = "OUT")]
        output: PathBuf,
        magnet: String,
        index: u32,
    },
    /// Download the whole file via a magnet link.
    MagnetDownload {
        #[arg(short = 'o', value_name = "OUT")]
        output: PathBuf,
        magnet: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Decode { value } => {
            let decoded = decode(value.as_bytes())?;
            println!("{}", to_json(&decoded));
        }
        Command::Info { torrent } => {
            let metainfo = load_metainfo(&torrent)?;
            print_info(&metainfo.announce, &metainfo.info, &metainfo.info_hash);
        }
        Command::Peers { torrent } => {
            let metainfo = load_metainfo(&torrent)?;
            let peers = announce(&metainfo).await?;
            for peer in peers {
                println!("{peer}");
            }
        }
        Command::Handshake { torrent, peer } => {
            let metainfo = load_metainfo(&torrent)?;
            let addr: SocketAddrV4 = peer
                .parse()
                .with_context(|| format!("invalid peer address: {peer}"))?;

            let session =
                PeerSession::connect(addr, &metainfo.info_hash, &PeerId::generate(), false).await?;
            println!("Peer ID: {}", session.remote_peer_id.to_hex());
        }
        Command::DownloadPiece {
            output,
            torrent,
            index,
        } => {
            let metainfo = load_metainfo(&torrent)?;
            if index as usize >= metainfo.info.num_pieces() {
                bail!("piece index {index} out of range");
            }
            let peers = announce(&metainfo).await?;
            let piece = download_single_piece(
                &peers,
                &metainfo.info,
                &metainfo.info_hash,
                index,
            )
            .await?;
            tokio::fs::write(&output, &piece)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
        }
        Command::Download { output, torrent } => {
            let metainfo = load_metainfo(&torrent)?;
            let peers = announce(&metainfo).await?;
            let downloader = Downloader::new(
                metainfo.info.clone(),
                metainfo.info_hash,
                PeerId::generate(),
            );
            downloader.download_to(&peers, &output).await?;
        }
        Command::MagnetParse { magnet } => {
            let magnet = MagnetLink::parse(&magnet)?;
            println!("Tracker URL: {}", magnet.tracker);
            println!("Info Hash: {}", magnet.info_hash);
        }
        Command::MagnetHandshake { magnet } => {
            let magnet = MagnetLink::parse(&magnet)?;
            let peers = magnet_announce(&magnet).await?;

            let mut last_err = None;
            for &addr in &peers {
                match probe_extension_peer(addr, &magnet.info_hash, &PeerId::generate()).await {
                    Ok(mut session) => {
                        session.extension_handshake().await?;
                        println!("Peer ID: {}", session.remote_peer_id.to_hex());
                        return Ok(());
                    }
                    Err(err) => {
                        debug!(peer = %addr, %err, "peer unusable, trying next");
                        last_err = Some(err);
                    }
                }
            }
            match last_err {
                Some(err) => return Err(err.into()),
                None => bail!("tracker returned no peers"),
            }
        }
        Command::MagnetInfo { magnet } => {
            let magnet = MagnetLink::parse(&magnet)?;
            let peers = magnet_announce(&magnet).await?;
            let info = fetch_info(&peers, &magnet.info_hash, &PeerId::generate()).await?;
            print_info(&magnet.tracker, &info, &magnet.info_hash);
        }
        Command::MagnetDownloadPiece {
            output,
            magnet,
            index,
        } => {
            let magnet = MagnetLink::parse(&magnet)?;
            let peers = magnet_announce(&magnet).await?;
            let info = fetch_info(&peers, &magnet.info_hash, &PeerId::generate()).await?;
            if index as usize >= info.num_pieces() {
                bail!("piece index {index} out of range");
            }
            let piece = download_single_piece(&peers, &info, &magnet.info_hash, index).await?;
            tokio::fs::write(&output, &piece)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
        }
        Command::MagnetDownload { output, magnet } => {
            let magnet = MagnetLink::parse(&magnet)?;
            let peers = magnet_announce(&magnet).await?;
            let info = fetch_info(&peers, &magnet.info_hash, &PeerId::generate()).await?;
            let downloader = Downloader::new(info, magnet.info_hash, PeerId::generate());
            downloader.download_to(&peers, &output).await?;
        }
    }

    Ok(())
}

fn load_metainfo(path: &PathBuf) -> Result<Metainfo> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Metainfo::from_bytes(&data)?)
}

async fn announce(metainfo: &Metainfo) -> Result<Vec<SocketAddrV4>> {
    let tracker = HttpTracker::new(&metainfo.announce)?;
    let response = tracker
        .announce(&metainfo.info_hash, &PeerId::generate(), metainfo.info.length)
        .await?;
    Ok(response.peers)
}

async fn magnet_announce(magnet: &MagnetLink) -> Result<Vec<SocketAddrV4>> {
    let tracker = HttpTracker::new(&magnet.tracker)?;
    let response = tracker
        .announce(&magnet.info_hash, &PeerId::generate(), UNKNOWN_LEFT)
        .await?;
    Ok(response.peers)
}

/// Fetches one piece, trying each peer in order until one serves it.
async fn download_single_piece(
    peers: &[SocketAddrV4],
    info: &Info,
    info_hash: &InfoHash,
    index: u32,
) -> Result<bytes::Bytes> {
    let peer_id = PeerId::generate();
    let mut last_err = None;

    for &addr in peers {
        match fetch_piece(addr, info, info_hash, &peer_id, index).await {
            Ok(piece) => return Ok(piece),
            Err(err) => {
                debug!(peer = %addr, piece = index, %err, "piece fetch failed, trying next peer");
                last_err = Some(err);
            }
        }
    }

    match last_err {
        Some(err) => Err(err.into()),
        None => bail!("tracker returned no peers"),
    }
}

fn print_info(tracker: &str, info: &Info, info_hash: &InfoHash) {
    println!("Tracker URL: {tracker}");
    println!("Length: {}", info.length);
    println!("Info Hash: {info_hash}");
    println!("Piece Length: {}", info.piece_length);
    println!("Piece Hashes:");
    for hash in &info.pieces {
        println!("{}", InfoHash::from_bytes(*hash).to_hex());
    }
}

/// Renders a bencode value as JSON: byte strings become UTF-8 strings,
/// dictionaries become objects keyed by their UTF-8 keys.
fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Bytes(b) => serde_json::Value::from(String::from_utf8_lossy(b).into_owned()),
        Value::List(l) => serde_json::Value::Array(l.iter().map(to_json).collect()),
        Value::Dict(d) => serde_json::Value::Object(
            d.iter()
                .map(|(k, v)| (String::from_utf8_lossy(k).into_owned(), to_json(v)))
                .collect(),
        ),
    }
}
