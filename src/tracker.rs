//! HTTP tracker protocol ([BEP-3], [BEP-23]).
//!
//! The tracker is the rendezvous point of a swarm: clients announce
//! themselves with a single HTTP GET and receive a compact list of peer
//! endpoints in return.
//!
//! ```no_run
//! use bitfetch::metainfo::InfoHash;
//! use bitfetch::peer::PeerId;
//! use bitfetch::tracker::HttpTracker;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tracker = HttpTracker::new("http://tracker.example.com/announce")?;
//! let info_hash = InfoHash::from_hex("c12fe1c06bba254a9dc9f519b335aa7c1367a88a")?;
//!
//! let response = tracker.announce(&info_hash, &PeerId::generate(), 92063).await?;
//! for peer in response.peers {
//!     println!("{peer}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html
//! [BEP-23]: http://bittorrent.org/beps/bep_0023.html

mod error;
mod http;
mod response;

pub use error::TrackerError;
pub use http::{HttpTracker, DEFAULT_PORT};
pub use response::AnnounceResponse;
