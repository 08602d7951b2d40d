//! # BitTorrent Torrent Metadata
//!
//! Parses a single-file `.torrent` document.
//!
//! ## Torrent File Format
//!
//! Torrent files contain metadata in bencoded format:
//!
//! - **announce**: Tracker URL for peer discovery
//! - **announce-list**: Optional tiers of tracker URLs
//! - **info**: Dictionary with file information and piece hashes
//!   - **pieces**: Concatenated SHA-1 hashes, 20 bytes each
//!   - **piece length**: Size of each piece (the last may be shorter)
//!   - **length**: Total file size
//!   - **name**: Suggested filename
//!
//! The info hash that identifies the torrent to trackers and peers is the
//! SHA-1 of the bencoded `info` dictionary.

use crate::error::{Error, Result};
use crate::piece::PieceWork;

use serde::{Deserialize, Serialize};
use serde_bencode::{de, ser, value::Value};
use serde_bytes::ByteBuf;
use sha1::{Digest, Sha1};

use std::fs;
use std::path::Path;

// Size of SHA-1 hash in bytes
const SHA1_HASH_SIZE: usize = 20;

/// Immutable description of the file being downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Torrent {
    /// Tracker URL
    announce: String,
    /// 20-byte SHA-1 hash of the bencoded info dictionary
    info_hash: [u8; 20],
    /// One 20-byte SHA-1 hash per piece
    piece_hashes: Vec<[u8; 20]>,
    /// Size of each piece in bytes (except possibly the last)
    piece_length: u32,
    /// Total size of the file in bytes
    length: u64,
    /// Suggested filename from torrent metadata
    name: String,
}

#[derive(Deserialize, Serialize)]
struct BencodeInfo {
    // Concatenation of all pieces 20-byte SHA-1 hashes
    pieces: ByteBuf,
    #[serde(rename = "piece length")]
    piece_length: u32,
    length: u64,
    name: String,
}

#[derive(Deserialize)]
struct BencodeTorrent {
    #[serde(default)]
    announce: String,
    #[serde(rename = "announce-list", default)]
    announce_list: Vec<Vec<String>>,
    info: BencodeInfo,
}

/// Same document, with the info dictionary kept as a generic value so
/// keys we do not model still count toward the info hash.
#[derive(Deserialize)]
struct RawTorrent {
    info: Value,
}

impl BencodeInfo {
    /// Split bencoded pieces into SHA-1 hashes.
    fn split_pieces_hashes(&self) -> Result<Vec<[u8; 20]>> {
        if self.pieces.len() % SHA1_HASH_SIZE != 0 {
            return Err(Error::Metainfo(format!(
                "pieces field of {} bytes is not a multiple of {}",
                self.pieces.len(),
                SHA1_HASH_SIZE
            )));
        }

        let hashes = self
            .pieces
            .chunks_exact(SHA1_HASH_SIZE)
            .map(|chunk| {
                let mut hash = [0; SHA1_HASH_SIZE];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect();

        Ok(hashes)
    }
}

/// SHA-1 of the re-encoded info dictionary.
fn hash_info(info: &Value) -> Result<[u8; 20]> {
    let buf: Vec<u8> = ser::to_bytes(info)?;
    Ok(Sha1::digest(&buf).into())
}

impl Torrent {
    /// Reads and parses a torrent file.
    pub fn open<P: AsRef<Path>>(filepath: P) -> Result<Torrent> {
        let filepath = filepath.as_ref();
        let buf = fs::read(filepath).map_err(|e| {
            Error::Metainfo(format!("could not read {}: {}", filepath.display(), e))
        })?;

        Torrent::from_bytes(&buf)
    }

    /// Parses a bencoded torrent document.
    pub fn from_bytes(buf: &[u8]) -> Result<Torrent> {
        let bencode = de::from_bytes::<BencodeTorrent>(buf)?;
        let raw = de::from_bytes::<RawTorrent>(buf)?;

        let announce = if !bencode.announce.is_empty() {
            bencode.announce
        } else {
            match bencode.announce_list.into_iter().flatten().next() {
                Some(url) => url,
                None => {
                    return Err(Error::Metainfo(
                        "torrent has no announce or announce-list".to_string(),
                    ))
                }
            }
        };

        let info = bencode.info;
        if info.piece_length == 0 {
            return Err(Error::Metainfo("piece length is zero".to_string()));
        }

        let piece_hashes = info.split_pieces_hashes()?;
        let expected = info.length.div_ceil(info.piece_length as u64);
        if piece_hashes.len() as u64 != expected {
            return Err(Error::Metainfo(format!(
                "{} piece hashes for {} bytes in pieces of {}",
                piece_hashes.len(),
                info.length,
                info.piece_length
            )));
        }

        Ok(Torrent {
            announce,
            info_hash: hash_info(&raw.info)?,
            piece_hashes,
            piece_length: info.piece_length,
            length: info.length,
            name: info.name,
        })
    }

    pub fn announce(&self) -> &str {
        &self.announce
    }

    pub fn info_hash(&self) -> &[u8; 20] {
        &self.info_hash
    }

    /// Returns the suggested filename from the torrent metadata.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total size of the file in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn piece_length(&self) -> u32 {
        self.piece_length
    }

    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

    /// Byte range `[begin, end)` of a piece inside the file, clipped to the
    /// total length.
    pub fn piece_bounds(&self, index: u32) -> Result<(usize, usize)> {
        if index as usize >= self.piece_count() {
            return Err(Error::Protocol(format!(
                "piece index {} out of range ({} pieces)",
                index,
                self.piece_count()
            )));
        }

        let begin = index as u64 * self.piece_length as u64;
        let end = (begin + self.piece_length as u64).min(self.length);

        Ok((begin as usize, end as usize))
    }

    /// Size of a piece in bytes.
    pub fn piece_size(&self, index: u32) -> Result<u32> {
        let (begin, end) = self.piece_bounds(index)?;
        Ok((end - begin) as u32)
    }

    /// One work item per piece, in index order.
    pub fn piece_works(&self) -> Result<Vec<PieceWork>> {
        self.piece_hashes
            .iter()
            .enumerate()
            .map(|(index, hash)| {
                let index = index as u32;
                Ok(PieceWork::new(index, *hash, self.piece_size(index)?))
            })
            .collect()
    }
}
