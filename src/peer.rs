//! # BitTorrent Peer Information
//!
//! Remote peer endpoints as returned by the tracker, and the identifier this
//! client presents to them.
//!
//! ## Compact Peer Format
//!
//! Trackers answer with 6-byte entries:
//!
//! ```text
//! <IP: 4 bytes><Port: 2 bytes>
//! ```
//!
//! Both fields are in network byte order.

use crate::error::{Error, Result};

use byteorder::{BigEndian, ByteOrder};
use rand::Rng;

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

const PEER_SIZE: usize = 6;

// Azureus-style client tag placed at the start of our peer id
const PEER_ID_PREFIX: &[u8; 8] = b"-PW0100-";

/// 20-byte identifier exchanged in the handshake.
pub type PeerId = [u8; 20];

/// A remote peer in the swarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Sequential number used to tell peers apart in logs
    pub id: u32,
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Peer {
    pub fn new(id: u32, ip: Ipv4Addr, port: u16) -> Peer {
        Peer { id, ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.ip), self.port)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Generates a fresh peer id: the client tag followed by random bytes.
pub fn generate_peer_id() -> PeerId {
    let mut peer_id: PeerId = [0; 20];
    peer_id[..PEER_ID_PREFIX.len()].copy_from_slice(PEER_ID_PREFIX);
    rand::thread_rng().fill(&mut peer_id[PEER_ID_PREFIX.len()..]);
    peer_id
}

/// Parses a compact peer list into peers numbered from 0.
///
/// # Errors
///
/// Returns a protocol error if the list length is not a multiple of 6 bytes.
///
/// # Example
///
/// ```rust
/// use piecewise::peer::parse_compact_peers;
///
/// let peer_data = vec![192, 168, 1, 1, 0, 80, 192, 168, 1, 2, 0x1a, 0xe1];
/// let peers = parse_compact_peers(&peer_data).unwrap();
/// assert_eq!(peers.len(), 2);
/// assert_eq!(peers[1].port, 6881);
/// ```
pub fn parse_compact_peers(tracker_peers: &[u8]) -> Result<Vec<Peer>> {
    if tracker_peers.len() % PEER_SIZE != 0 {
        return Err(Error::Protocol(format!(
            "received malformed peer list of {} bytes",
            tracker_peers.len()
        )));
    }

    let peers = tracker_peers
        .chunks_exact(PEER_SIZE)
        .enumerate()
        .map(|(i, entry)| {
            let ip = Ipv4Addr::new(entry[0], entry[1], entry[2], entry[3]);
            let port = BigEndian::read_u16(&entry[4..6]);
            Peer::new(i as u32, ip, port)
        })
        .collect();

    Ok(peers)
}
