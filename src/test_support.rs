//! In-process fake peers for exercising the engine over real sockets.

use crate::config::DownloadConfig;
use crate::error::Result;
use crate::handshake::{read_handshake, Handshake};
use crate::message::*;
use crate::peer::{Peer, PeerId};

use byteorder::{BigEndian, ByteOrder};
use sha1::{Digest, Sha1};

use std::io::Write;
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const LOCAL_PEER_ID: PeerId = *b"-PW0100-testtesttest";

const REMOTE_PEER_ID: PeerId = *b"-FK0001-fakefakefake";

pub fn fake_info_hash() -> [u8; 20] {
    [0x11; 20]
}

pub fn sha1(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

/// Short deadlines so a broken test fails instead of hanging.
pub fn test_config() -> DownloadConfig {
    DownloadConfig {
        connect_timeout: Duration::from_secs(2),
        handshake_timeout: Duration::from_secs(2),
        piece_timeout: Duration::from_secs(5),
        idle_backoff: Duration::from_millis(5),
        show_progress: false,
        ..DownloadConfig::default()
    }
}

/// A peer address nothing is listening on.
pub fn closed_port_peer() -> Peer {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Peer::new(99, Ipv4Addr::LOCALHOST, port)
}

/// Builds a bitfield advertising every one of `piece_count` pieces.
pub fn full_bitfield(piece_count: usize) -> Vec<u8> {
    let mut bits = vec![0u8; piece_count.div_ceil(8)];
    for index in 0..piece_count {
        bits[index / 8] |= 1 << (7 - index % 8);
    }
    bits
}

/// PIECE message carrying `block` at offset `begin` of piece `index`.
pub fn piece_message(index: u32, begin: u32, block: &[u8]) -> Message {
    let mut payload = vec![0; 8 + block.len()];
    BigEndian::write_u32(&mut payload[0..4], index);
    BigEndian::write_u32(&mut payload[4..8], begin);
    payload[8..].copy_from_slice(block);
    Message::new_with_payload(MESSAGE_PIECE, payload)
}

/// What the fake saw from the client.
#[derive(Debug, Default)]
pub struct FakeReport {
    pub bitfield_sent: bool,
    pub interested: bool,
    pub not_interested: bool,
    pub unchoked: bool,
    /// (index, begin, length) of every REQUEST, in arrival order
    pub requests: Vec<(u32, u32, u32)>,
    pub haves: Vec<u32>,
}

/// Scripted remote peer that serves one connection.
pub struct FakePeer {
    pieces: Vec<Vec<u8>>,
    info_hash: [u8; 20],
    bitfield: Option<Vec<u8>>,
    corrupt: bool,
    have: Option<u32>,
    choke_after_first_block: bool,
    hang_up_on_request: bool,
    /// Delay between single bytes of the bitfield frame
    bitfield_trickle: Option<Duration>,
    /// Keep-alive period of a peer that never unchokes
    keep_alive_only: Option<Duration>,
}

impl FakePeer {
    /// A well-behaved peer holding `pieces`, indexed from 0.
    pub fn new(pieces: Vec<Vec<u8>>) -> Self {
        let bitfield = full_bitfield(pieces.len());
        FakePeer {
            pieces,
            info_hash: fake_info_hash(),
            bitfield: Some(bitfield),
            corrupt: false,
            have: None,
            choke_after_first_block: false,
            hang_up_on_request: false,
            bitfield_trickle: None,
            keep_alive_only: None,
        }
    }

    pub fn with_info_hash(mut self, info_hash: [u8; 20]) -> Self {
        self.info_hash = info_hash;
        self
    }

    pub fn with_bitfield(mut self, bitfield: Vec<u8>) -> Self {
        self.bitfield = Some(bitfield);
        self
    }

    /// Send UNCHOKE where the bitfield should be.
    pub fn without_bitfield(mut self) -> Self {
        self.bitfield = None;
        self
    }

    /// Serve every block with its bytes inverted.
    pub fn corrupt(mut self) -> Self {
        self.corrupt = true;
        self
    }

    /// Announce `index` with a HAVE right after unchoking.
    pub fn announce_have(mut self, index: u32) -> Self {
        self.have = Some(index);
        self
    }

    /// Choke and unchoke again after serving the first block.
    pub fn choke_after_first_block(mut self) -> Self {
        self.choke_after_first_block = true;
        self
    }

    /// Drop the connection instead of answering the first REQUEST.
    pub fn hang_up_on_request(mut self) -> Self {
        self.hang_up_on_request = true;
        self
    }

    /// Send the bitfield frame one byte at a time, `delay` apart.
    pub fn trickle_bitfield(mut self, delay: Duration) -> Self {
        self.bitfield_trickle = Some(delay);
        self
    }

    /// Answer INTERESTED with nothing but keep-alives, every `period`,
    /// until the client hangs up.
    pub fn keep_alive_only(mut self, period: Duration) -> Self {
        self.keep_alive_only = Some(period);
        self
    }

    /// Starts listening and serves the first connection on a thread.
    pub fn spawn(self) -> (Peer, JoinHandle<FakeReport>) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let mut report = FakeReport::default();
            if let Ok((mut conn, _)) = listener.accept() {
                // The client hanging up ends the session
                let _ = self.serve(&mut conn, &mut report);
            }
            report
        });

        (Peer::new(port as u32, Ipv4Addr::LOCALHOST, port), handle)
    }

    fn serve(&self, conn: &mut TcpStream, report: &mut FakeReport) -> Result<()> {
        let theirs = read_handshake(conn)?;
        conn.write_all(&Handshake::new(REMOTE_PEER_ID, self.info_hash).serialize())?;

        if theirs.info_hash != self.info_hash {
            // Wait for the client to hang up
            while read_message(conn).is_ok() {}
            return Ok(());
        }

        match &self.bitfield {
            Some(bits) => {
                let frame = Message::new_with_payload(MESSAGE_BITFIELD, bits.clone()).serialize();
                match self.bitfield_trickle {
                    Some(delay) => {
                        for byte in frame {
                            thread::sleep(delay);
                            conn.write_all(&[byte])?;
                        }
                    }
                    None => conn.write_all(&frame)?,
                }
                report.bitfield_sent = true;
            }
            None => {
                conn.write_all(&Message::new(MESSAGE_UNCHOKE).serialize())?;
            }
        }

        let mut blocks_served = 0;
        loop {
            let message = match read_message(conn)? {
                Some(message) => message,
                None => continue,
            };

            match message.id {
                MESSAGE_INTERESTED if self.keep_alive_only.is_some() => {
                    report.interested = true;
                    let period = self.keep_alive_only.unwrap_or_default();
                    loop {
                        thread::sleep(period);
                        conn.write_all(&serialize_keep_alive())?;
                    }
                }
                MESSAGE_INTERESTED => {
                    report.interested = true;
                    conn.write_all(&serialize_keep_alive())?;
                    conn.write_all(&Message::new(MESSAGE_UNCHOKE).serialize())?;
                    if let Some(index) = self.have {
                        conn.write_all(&Message::have(index).serialize())?;
                    }
                }
                MESSAGE_NOT_INTERESTED => report.not_interested = true,
                MESSAGE_UNCHOKE => report.unchoked = true,
                MESSAGE_HAVE => report.haves.push(BigEndian::read_u32(&message.payload)),
                MESSAGE_REQUEST => {
                    let index = BigEndian::read_u32(&message.payload[0..4]);
                    let begin = BigEndian::read_u32(&message.payload[4..8]);
                    let length = BigEndian::read_u32(&message.payload[8..12]);
                    report.requests.push((index, begin, length));
                    if self.hang_up_on_request {
                        return Ok(());
                    }

                    let data = &self.pieces[index as usize];
                    let mut block = data[begin as usize..(begin + length) as usize].to_vec();
                    if self.corrupt {
                        block.iter_mut().for_each(|b| *b = !*b);
                    }
                    conn.write_all(&piece_message(index, begin, &block).serialize())?;

                    blocks_served += 1;
                    if self.choke_after_first_block && blocks_served == 1 {
                        conn.write_all(&Message::new(MESSAGE_CHOKE).serialize())?;
                        thread::sleep(Duration::from_millis(20));
                        conn.write_all(&Message::new(MESSAGE_UNCHOKE).serialize())?;
                    }
                }
                _ => {}
            }
        }
    }
}
