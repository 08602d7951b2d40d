//! # Error Types
//!
//! Every fallible operation in the library returns [`Result`], whose error
//! separates failures by how far they propagate:
//!
//! - **Connect / Handshake / Protocol** during a worker's startup abandon
//!   that peer only.
//! - **Integrity / Io** during a fetch return the piece to the worklist.
//! - **Metainfo / Tracker / Bencode / Http / Url** are fatal to the run.
//! - **Stalled** means every worker is gone while pieces are still missing.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Dial failure or dial timeout.
    #[error("could not connect to peer {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Bad protocol identifier or info hash mismatch.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A message did not have the expected type or layout.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A completed piece does not hash to its expected value.
    #[error("piece {0} failed integrity check")]
    Integrity(u32),

    /// Read/write failure or deadline exceeded mid-stream.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid torrent: {0}")]
    Metainfo(String),

    #[error("tracker error: {0}")]
    Tracker(String),

    #[error("bencode error: {0}")]
    Bencode(#[from] serde_bencode::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("download stalled: every peer exited with {remaining} pieces outstanding")]
    Stalled { remaining: usize },
}
