//! # BitTorrent Handshake Protocol
//!
//! The handshake is the first thing exchanged on a fresh connection. It
//! confirms both ends speak the same protocol and want the same torrent.
//!
//! ## Message Format
//!
//! ```text
//! <pstrlen><pstr><reserved><info_hash><peer_id>
//! ```
//!
//! - **pstrlen**: 1 byte - Length of protocol string (19 for "BitTorrent protocol")
//! - **pstr**: Variable - Protocol identifier
//! - **reserved**: 8 bytes - All zeros, no extensions are negotiated
//! - **info_hash**: 20 bytes - SHA-1 hash of the torrent info dictionary
//! - **peer_id**: 20 bytes - Identifier of the sending peer
//!
//! The total size is always `49 + pstrlen` bytes.

use crate::error::{Error, Result};

use std::io::Read;

pub const PROTOCOL_ID: &str = "BitTorrent protocol";

const RESERVED_LEN: usize = 8;
const HASH_LEN: usize = 20;

/// A decoded or outgoing handshake.
///
/// The reserved bytes are not kept: they are always sent as zeros and
/// ignored on receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Protocol identifier bytes, 1 to 255 of them
    pstr: Vec<u8>,
    /// 20-byte SHA-1 hash of the torrent's info dictionary
    pub info_hash: [u8; 20],
    /// 20-byte identifier of the peer that sent this handshake
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Creates a handshake announcing the standard protocol identifier.
    pub fn new(peer_id: [u8; 20], info_hash: [u8; 20]) -> Self {
        Handshake {
            pstr: PROTOCOL_ID.as_bytes().to_vec(),
            info_hash,
            peer_id,
        }
    }

    /// Creates a handshake announcing a custom protocol identifier.
    ///
    /// The identifier must fit behind the one-byte length prefix, so it
    /// has to be between 1 and 255 bytes long.
    pub fn with_protocol(pstr: &[u8], peer_id: [u8; 20], info_hash: [u8; 20]) -> Result<Self> {
        if pstr.is_empty() || pstr.len() > u8::MAX as usize {
            return Err(Error::Handshake(format!(
                "protocol identifier of {} bytes does not fit the length prefix",
                pstr.len()
            )));
        }

        Ok(Handshake {
            pstr: pstr.to_vec(),
            info_hash,
            peer_id,
        })
    }

    pub fn pstr(&self) -> &[u8] {
        &self.pstr
    }

    /// Serializes the handshake for network transmission.
    ///
    /// ```rust
    /// use piecewise::handshake::Handshake;
    ///
    /// let handshake = Handshake::new([1; 20], [2; 20]);
    /// assert_eq!(handshake.serialize().len(), 68);
    /// ```
    pub fn serialize(&self) -> Vec<u8> {
        let mut serialized: Vec<u8> = Vec::with_capacity(49 + self.pstr.len());

        serialized.push(self.pstr.len() as u8);
        serialized.extend_from_slice(&self.pstr);
        serialized.extend_from_slice(&[0; RESERVED_LEN]);
        serialized.extend_from_slice(&self.info_hash);
        serialized.extend_from_slice(&self.peer_id);

        serialized
    }
}

/// Deserializes the part of a handshake that follows the length byte.
///
/// `buf` must hold exactly `48 + pstrlen` bytes:
/// - pstr: bytes 0..pstrlen
/// - reserved: bytes pstrlen..pstrlen+8
/// - info_hash: bytes pstrlen+8..pstrlen+28
/// - peer_id: bytes pstrlen+28..pstrlen+48
pub fn deserialize_handshake(buf: &[u8], pstrlen: usize) -> Result<Handshake> {
    if pstrlen == 0 {
        return Err(Error::Handshake(
            "zero-length protocol identifier".to_string(),
        ));
    }
    if buf.len() != pstrlen + RESERVED_LEN + 2 * HASH_LEN {
        return Err(Error::Handshake(format!(
            "expected {} handshake bytes but got {}",
            pstrlen + RESERVED_LEN + 2 * HASH_LEN,
            buf.len()
        )));
    }

    let hash_start = pstrlen + RESERVED_LEN;

    let mut info_hash = [0; HASH_LEN];
    info_hash.copy_from_slice(&buf[hash_start..hash_start + HASH_LEN]);

    let mut peer_id = [0; HASH_LEN];
    peer_id.copy_from_slice(&buf[hash_start + HASH_LEN..]);

    Ok(Handshake {
        pstr: buf[0..pstrlen].to_vec(),
        info_hash,
        peer_id,
    })
}

/// Reads one handshake from a stream.
///
/// The length byte is read first; a zero length is rejected before any
/// further bytes are consumed.
pub fn read_handshake<R: Read>(reader: &mut R) -> Result<Handshake> {
    let mut len_buf = [0; 1];
    reader.read_exact(&mut len_buf)?;

    let pstrlen = len_buf[0] as usize;
    if pstrlen == 0 {
        return Err(Error::Handshake(
            "zero-length protocol identifier".to_string(),
        ));
    }

    let mut handshake_buf = vec![0; pstrlen + RESERVED_LEN + 2 * HASH_LEN];
    reader.read_exact(&mut handshake_buf)?;

    deserialize_handshake(&handshake_buf, pstrlen)
}
