//! # BitTorrent Piece Management
//!
//! A piece is the unit of verification: its SHA-1 hash is listed in the
//! torrent and checked once every block of it has arrived.
//!
//! - **PieceWork**: a piece still to be fetched, as held in the worklist
//! - **PieceResult**: a verified piece on its way to the output buffer

use crate::error::{Error, Result};

use sha1::{Digest, Sha1};

/// A piece waiting to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceWork {
    /// Zero-based index of this piece in the torrent
    pub index: u32,
    /// Expected SHA-1 hash of the piece
    pub hash: [u8; 20],
    /// Length in bytes; shorter than the nominal piece length only for the
    /// last piece
    pub length: u32,
}

/// A downloaded piece whose hash matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceResult {
    pub index: u32,
    pub data: Vec<u8>,
}

impl PieceWork {
    pub fn new(index: u32, hash: [u8; 20], length: u32) -> PieceWork {
        PieceWork {
            index,
            hash,
            length,
        }
    }

    /// Checks the fully assembled piece against its expected hash.
    ///
    /// Any difference, including a wrong length, is an integrity error.
    pub fn verify(&self, data: &[u8]) -> Result<()> {
        let hash = Sha1::digest(data);

        if data.len() != self.length as usize || hash.as_slice() != &self.hash[..] {
            return Err(Error::Integrity(self.index));
        }

        trace!("Successfully verified integrity of piece {}", self.index);

        Ok(())
    }
}

impl PieceResult {
    pub fn new(index: u32, data: Vec<u8>) -> PieceResult {
        PieceResult { index, data }
    }
}
