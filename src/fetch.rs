//! # Piece Fetch State Machine
//!
//! Retrieves one piece over one connection that has already completed its
//! handshake.
//!
//! ## Loop
//!
//! Until every byte of the piece has arrived:
//!
//! 1. **Pipeline**: while the peer has not choked us, fewer than
//!    `max_backlog` requests are unanswered, and part of the piece is still
//!    unrequested, request the next block (at most `block_size` bytes)
//! 2. **Receive**: read one message and apply it
//!    - CHOKE / UNCHOKE: pause or resume requests
//!    - HAVE: record the announced piece in the peer's bitfield
//!    - PIECE: copy the block into the buffer
//!    - anything else, including keep-alives, is ignored
//!
//! The whole attempt must finish within `piece_timeout` of its start;
//! keep-alives and choke/unchoke cycles do not push the deadline back. Any
//! error abandons the attempt and its partially filled buffer.

use crate::client::Client;
use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::message::*;
use crate::piece::PieceWork;

use std::time::Instant;

/// Progress of one attempt at one piece.
#[derive(Debug)]
pub struct FetchState {
    index: u32,
    buf: Vec<u8>,
    /// Bytes received and copied into `buf`
    downloaded: u32,
    /// Bytes covered by requests sent so far
    requested: u32,
    /// Requests sent but not yet answered
    backlog: u32,
}

impl FetchState {
    pub fn new(index: u32, length: u32) -> FetchState {
        FetchState {
            index,
            buf: vec![0; length as usize],
            downloaded: 0,
            requested: 0,
            backlog: 0,
        }
    }

    fn length(&self) -> u32 {
        self.buf.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.downloaded >= self.length()
    }

    pub fn downloaded(&self) -> u32 {
        self.downloaded
    }

    pub fn backlog(&self) -> u32 {
        self.backlog
    }

    /// Next block to request as `(begin, length)`, or `None` if the backlog
    /// is full or the whole piece has been requested. Does not account for
    /// choking; the caller checks that.
    pub fn next_block(&self, max_backlog: u32, block_size: u32) -> Option<(u32, u32)> {
        if self.backlog >= max_backlog || self.requested >= self.length() {
            return None;
        }

        let block_len = block_size.min(self.length() - self.requested);
        Some((self.requested, block_len))
    }

    /// Records a request as sent.
    pub fn record_request(&mut self, block_len: u32) {
        self.backlog += 1;
        self.requested += block_len;
    }

    /// Sends requests until the pipeline is full or the peer chokes us.
    fn send_requests(&mut self, client: &mut Client, config: &DownloadConfig) -> Result<()> {
        while !client.is_choked() {
            let (begin, block_len) = match self.next_block(config.max_backlog, config.block_size)
            {
                Some(block) => block,
                None => break,
            };

            client.send_request(self.index, begin, block_len)?;
            self.record_request(block_len);
        }

        Ok(())
    }

    /// Reads one message from the peer and applies it.
    fn read_message(&mut self, client: &mut Client) -> Result<()> {
        let message = match client.read_message()? {
            Some(message) => message,
            None => return Ok(()),
        };

        match message.id {
            MESSAGE_CHOKE => client.read_choke(),
            MESSAGE_UNCHOKE => client.read_unchoke(),
            MESSAGE_HAVE => client.read_have(&message)?,
            MESSAGE_PIECE => self.read_block(&message)?,
            id => trace!("Ignoring message {} from peer {}", id, client.peer()),
        }

        Ok(())
    }

    /// Copies a PIECE block into the buffer.
    pub fn read_block(&mut self, message: &Message) -> Result<()> {
        let n = parse_piece(self.index, &mut self.buf, message)? as u32;

        // A repeated block would count twice toward completion
        if self.downloaded + n > self.length() {
            return Err(Error::Protocol(format!(
                "peer sent more than the {} bytes of piece {}",
                self.length(),
                self.index
            )));
        }

        self.downloaded += n;
        self.backlog = self.backlog.saturating_sub(1);

        Ok(())
    }

    pub fn into_buffer(self) -> Vec<u8> {
        self.buf
    }
}

/// Downloads the full byte range of `piece` from `client`.
///
/// The returned buffer has not been verified yet.
pub fn attempt_download_piece(
    client: &mut Client,
    piece: &PieceWork,
    config: &DownloadConfig,
) -> Result<Vec<u8>> {
    client.set_deadline(Some(Instant::now() + config.piece_timeout))?;

    let mut state = FetchState::new(piece.index, piece.length);
    let outcome = run(&mut state, client, config);

    // Clear the deadline before surfacing the outcome
    let cleared = client.set_deadline(None);
    outcome?;
    cleared?;

    debug!(
        "Downloaded piece {} from peer {}",
        piece.index,
        client.peer()
    );

    Ok(state.into_buffer())
}

fn run(state: &mut FetchState, client: &mut Client, config: &DownloadConfig) -> Result<()> {
    while !state.is_complete() {
        state.send_requests(client, config)?;
        state.read_message(client)?;
    }
    Ok(())
}
