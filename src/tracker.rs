//! # HTTP Tracker Client
//!
//! One announce round trip to obtain the list of candidate peers.
//!
//! The request is a GET on the announce URL with:
//!
//! - `info_hash`, `peer_id`: raw 20-byte values, percent-encoded byte by byte
//! - `port`: port we claim to listen on
//! - `uploaded=0`, `downloaded=0`, `left=<bytes remaining>`
//! - `compact=1`: ask for 6-byte peer entries
//!
//! The bencoded reply carries `interval` and `peers`, or a `failure reason`.

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::peer::{parse_compact_peers, Peer, PeerId};
use crate::torrent::Torrent;

use serde::Deserialize;
use serde_bencode::de;
use serde_bytes::ByteBuf;
use url::Url;

use std::collections::HashSet;

#[derive(Debug, Deserialize)]
struct BencodeTracker {
    #[serde(rename = "failure reason", default)]
    failure_reason: Option<String>,
    // Interval time to refresh the list of peers in seconds
    #[serde(default)]
    interval: u32,
    #[serde(default)]
    peers: ByteBuf,
}

/// Each byte is encoded as %XX where XX is its hexadecimal value.
fn percent_encode_binary(data: &[u8]) -> String {
    const HEX_DIGITS: &[u8] = b"0123456789ABCDEF";
    let mut encoded = String::with_capacity(data.len() * 3);

    for &byte in data {
        encoded.push('%');
        encoded.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        encoded.push(HEX_DIGITS[(byte & 0x0F) as usize] as char);
    }

    encoded
}

/// Builds the announce URL, keeping any query the tracker URL already has.
pub fn build_tracker_url(
    announce: &str,
    info_hash: &[u8; 20],
    peer_id: &PeerId,
    port: u16,
    left: u64,
) -> Result<String> {
    // Validate the URL, but build the query by hand: binary values must not
    // go through form encoding
    let base_url = Url::parse(announce)?;

    let query = format!(
        "info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&compact=1&left={}",
        percent_encode_binary(info_hash),
        percent_encode_binary(peer_id),
        port,
        left
    );

    let mut url = base_url.to_string();
    if base_url.query().is_some() {
        url.push('&');
    } else {
        url.push('?');
    }
    url.push_str(&query);

    Ok(url)
}

/// Decodes a tracker reply into deduplicated peers numbered from 0.
pub fn parse_tracker_response(body: &[u8]) -> Result<Vec<Peer>> {
    let response = de::from_bytes::<BencodeTracker>(body)?;

    if let Some(reason) = response.failure_reason {
        return Err(Error::Tracker(reason));
    }

    debug!(
        "Tracker returned {} bytes of peers, refresh interval {}s",
        response.peers.len(),
        response.interval
    );

    let mut seen = HashSet::new();
    let mut peers: Vec<Peer> = parse_compact_peers(&response.peers)?
        .into_iter()
        .filter(|peer| seen.insert((peer.ip, peer.port)))
        .collect();

    for (i, peer) in peers.iter_mut().enumerate() {
        peer.id = i as u32;
    }

    Ok(peers)
}

/// Announces to the torrent's tracker and returns the peers it lists.
pub fn request_peers(
    torrent: &Torrent,
    peer_id: &PeerId,
    config: &DownloadConfig,
) -> Result<Vec<Peer>> {
    let url = build_tracker_url(
        torrent.announce(),
        torrent.info_hash(),
        peer_id,
        config.port,
        torrent.length(),
    )?;

    info!("Announcing to tracker {}", torrent.announce());

    let client = reqwest::blocking::Client::builder()
        .timeout(config.tracker_timeout)
        .build()?;
    let body = client.get(&url).send()?.error_for_status()?.bytes()?;

    let peers = parse_tracker_response(&body)?;
    if peers.is_empty() {
        return Err(Error::Tracker("tracker returned no peers".to_string()));
    }

    info!("Tracker returned {} peers", peers.len());

    Ok(peers)
}
