//! # BitTorrent Peer Client
//!
//! One TCP connection to one remote peer, owned by a single worker for its
//! whole life.
//!
//! ## Connection Setup
//!
//! 1. **Dial** the peer under `connect_timeout`
//! 2. **Handshake**: send ours, read theirs, compare info hashes
//! 3. **Bitfield**: the very next message must be the peer's BITFIELD
//!
//! Steps 2 and 3 together must finish within `handshake_timeout`; the
//! deadline is cleared once setup succeeds.
//!
//! ## Deadlines
//!
//! A deadline is an absolute instant. Every read and write re-arms the
//! socket timeout with the time left until it, so a peer trickling bytes or
//! keep-alives cannot stretch a bounded phase.
//!
//! ## Connection State
//!
//! - **Choked**: starts `true`, flipped by CHOKE/UNCHOKE from the peer
//! - **Bitfield**: pieces the peer holds, extended by HAVE messages
//!
//! None of the send operations retry; a failed write is reported to the
//! caller, which decides whether the connection is still worth keeping.

use crate::bitfield::Bitfield;
use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::handshake::*;
use crate::message::*;
use crate::peer::{Peer, PeerId};

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::{Duration, Instant};

/// Connection to a remote peer, past the handshake.
pub struct Client {
    /// Remote endpoint
    peer: Peer,
    /// TCP stream connection to the peer
    conn: TcpStream,
    /// Pieces the peer claims to have
    bitfield: Bitfield,
    /// Whether the peer has choked this client
    choked: bool,
    /// Instant by which the current bounded phase must be over
    deadline: Option<Instant>,
}

impl Client {
    /// Dials a peer, exchanges handshakes and reads its bitfield.
    ///
    /// # Errors
    ///
    /// - `Error::Connect` if the dial fails or times out
    /// - `Error::Handshake` if the peer answers for another torrent
    /// - `Error::Protocol` if the first message is not a BITFIELD
    /// - `Error::Io` if the peer stops answering mid-setup
    pub fn connect(
        peer: Peer,
        peer_id: &PeerId,
        info_hash: &[u8; 20],
        config: &DownloadConfig,
    ) -> Result<Client> {
        let addr = peer.socket_addr();
        let conn = TcpStream::connect_timeout(&addr, config.connect_timeout)
            .map_err(|source| Error::Connect { addr, source })?;

        debug!("Connected to peer {}", peer);

        let mut client = Client {
            peer,
            conn,
            bitfield: Bitfield::default(),
            choked: true,
            deadline: None,
        };

        if let Err(e) = client.setup(peer_id, info_hash, config.handshake_timeout) {
            client.shutdown();
            return Err(e);
        }

        Ok(client)
    }

    fn setup(&mut self, peer_id: &PeerId, info_hash: &[u8; 20], timeout: Duration) -> Result<()> {
        self.set_deadline(Some(Instant::now() + timeout))?;

        self.handshake_with_peer(peer_id, info_hash)?;
        self.read_bitfield()?;

        self.set_deadline(None)
    }

    /// Sends our handshake and checks the one the peer sends back.
    fn handshake_with_peer(&mut self, peer_id: &PeerId, info_hash: &[u8; 20]) -> Result<()> {
        let handshake = Handshake::new(*peer_id, *info_hash);
        self.stream().write_all(&handshake.serialize())?;

        let remote = read_handshake(&mut self.stream())?;
        if remote.info_hash != *info_hash {
            return Err(Error::Handshake(format!(
                "peer {} answered for another info hash",
                self.peer
            )));
        }

        debug!("Completed handshake with peer {}", self.peer);

        Ok(())
    }

    /// Reads the BITFIELD message that must follow the handshake.
    fn read_bitfield(&mut self) -> Result<()> {
        match self.read_message()? {
            Some(message) if message.id == MESSAGE_BITFIELD => {
                debug!("Receive MESSAGE_BITFIELD from peer {}", self.peer);
                self.bitfield = Bitfield::from_bytes(message.payload);
                Ok(())
            }
            Some(message) => Err(Error::Protocol(format!(
                "expected bitfield from peer {} but got id {}",
                self.peer, message.id
            ))),
            None => Err(Error::Protocol(format!(
                "expected bitfield from peer {} but got keep-alive",
                self.peer
            ))),
        }
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Returns whether the peer currently refuses our requests.
    pub fn is_choked(&self) -> bool {
        self.choked
    }

    /// Processes a CHOKE message from the peer.
    pub fn read_choke(&mut self) {
        debug!("Receive MESSAGE_CHOKE from peer {}", self.peer);
        self.choked = true
    }

    /// Processes an UNCHOKE message from the peer.
    pub fn read_unchoke(&mut self) {
        debug!("Receive MESSAGE_UNCHOKE from peer {}", self.peer);
        self.choked = false
    }

    /// Processes a HAVE message: the peer announces a new piece.
    pub fn read_have(&mut self, message: &Message) -> Result<()> {
        let index = parse_have(message)?;
        debug!("Receive MESSAGE_HAVE {} from peer {}", index, self.peer);
        self.bitfield.set_piece(index);
        Ok(())
    }

    pub fn has_piece(&self, index: u32) -> bool {
        self.bitfield.has_piece(index)
    }

    /// Bounds every following read and write by `deadline`, or with `None`
    /// removes the bound. Once the deadline has passed, IO fails with
    /// `io::ErrorKind::TimedOut`.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) -> Result<()> {
        self.deadline = deadline;
        if deadline.is_none() {
            self.conn.set_read_timeout(None)?;
            self.conn.set_write_timeout(None)?;
        }
        Ok(())
    }

    fn stream(&self) -> DeadlineStream<'_> {
        DeadlineStream {
            conn: &self.conn,
            deadline: self.deadline,
        }
    }

    /// Blocks until one message is read. `None` is a keep-alive.
    pub fn read_message(&mut self) -> Result<Option<Message>> {
        let message = read_message(&mut self.stream())?;
        if message.is_none() {
            trace!("Receive KEEP_ALIVE from peer {}", self.peer);
        }
        Ok(message)
    }

    fn send(&mut self, message: Message, name: &str) -> Result<()> {
        trace!("Send {} to peer {}", name, self.peer);
        self.stream().write_all(&message.serialize())?;
        Ok(())
    }

    pub fn send_choke(&mut self) -> Result<()> {
        self.send(Message::new(MESSAGE_CHOKE), "MESSAGE_CHOKE")
    }

    pub fn send_unchoke(&mut self) -> Result<()> {
        self.send(Message::new(MESSAGE_UNCHOKE), "MESSAGE_UNCHOKE")
    }

    pub fn send_interested(&mut self) -> Result<()> {
        self.send(Message::new(MESSAGE_INTERESTED), "MESSAGE_INTERESTED")
    }

    pub fn send_not_interested(&mut self) -> Result<()> {
        self.send(Message::new(MESSAGE_NOT_INTERESTED), "MESSAGE_NOT_INTERESTED")
    }

    /// Tells the peer we now hold a verified piece.
    pub fn send_have(&mut self, index: u32) -> Result<()> {
        self.send(Message::have(index), "MESSAGE_HAVE")
    }

    /// Requests `length` bytes at offset `begin` of piece `index`.
    ///
    /// ```text
    /// <len=0013><id=6><index: u32><begin: u32><length: u32>
    /// ```
    pub fn send_request(&mut self, index: u32, begin: u32, length: u32) -> Result<()> {
        trace!(
            "Request piece {} [{}:{}] from peer {}",
            index,
            begin,
            begin + length,
            self.peer
        );
        self.stream()
            .write_all(&Message::request(index, begin, length).serialize())?;
        Ok(())
    }

    /// Closes both directions of the stream. Errors are only logged.
    pub fn shutdown(&self) {
        if let Err(e) = self.conn.shutdown(Shutdown::Both) {
            trace!("Error shutting down connection to peer {}: {}", self.peer, e);
        }
    }
}

/// View of the socket that re-arms its timeout before every read and write.
struct DeadlineStream<'a> {
    conn: &'a TcpStream,
    deadline: Option<Instant>,
}

impl DeadlineStream<'_> {
    fn time_left(&self) -> io::Result<Option<Duration>> {
        let deadline = match self.deadline {
            Some(deadline) => deadline,
            None => return Ok(None),
        };

        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(deadline_exceeded());
        }
        Ok(Some(left))
    }
}

fn deadline_exceeded() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded")
}

// Unix reports an expired socket timeout as WouldBlock
fn map_timeout(e: io::Error) -> io::Error {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => deadline_exceeded(),
        _ => e,
    }
}

impl Read for DeadlineStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(left) = self.time_left()? {
            self.conn.set_read_timeout(Some(left))?;
        }
        let mut conn = self.conn;
        conn.read(buf).map_err(map_timeout)
    }
}

impl Write for DeadlineStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(left) = self.time_left()? {
            self.conn.set_write_timeout(Some(left))?;
        }
        let mut conn = self.conn;
        conn.write(buf).map_err(map_timeout)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut conn = self.conn;
        conn.flush()
    }
}
