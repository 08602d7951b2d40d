//! # piecewise
//!
//! Downloads a single file from a BitTorrent swarm.
//!
//! ## Architecture
//!
//! - **Main thread**: parses the torrent, asks the tracker for peers, then
//!   assembles pieces as they arrive ([`download::download`])
//! - **Worker threads**: one per peer, each owning its connection
//!   ([`worker::Worker`])
//! - **Worklist and results channel**: the only state workers share
//!   ([`worklist::WorkQueue`])
//!
//! Every piece is checked against its SHA-1 hash before it is accepted.

#[macro_use]
extern crate log;

pub mod bitfield;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod fetch;
pub mod handshake;
pub mod http;
pub mod message;
pub mod peer;
pub mod piece;
pub mod torrent;
pub mod tracker;
pub mod worker;
pub mod worklist;

#[cfg(test)]
mod test_support;

pub use config::DownloadConfig;
pub use error::{Error, Result};
pub use torrent::Torrent;
