//! Concurrent piece download.
//!
//! The coordinator fans piece work items out across peer sessions, retries
//! transient failures, verifies every piece, and assembles the file. The
//! bootstrap obtains the info dictionary from peers when a download starts
//! from a magnet link.

mod bootstrap;
mod coordinator;
mod error;

pub use bootstrap::{fetch_info, probe_extension_peer};
pub use coordinator::{fetch_piece, Downloader, MAX_ATTEMPTS, MAX_WORKERS};
pub use error::DownloadError;

#[cfg(test)]
mod tests;
