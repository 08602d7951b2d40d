//! # BitTorrent Peer Wire Messages
//!
//! Message types and framing for the peer wire protocol. Every message
//! after the handshake uses the same frame:
//!
//! ```text
//! <length prefix><message ID><payload>
//! ```
//!
//! - **Length Prefix**: 4 bytes (big-endian u32) - Length of message ID + payload
//! - **Message ID**: 1 byte - Identifies the message type
//! - **Payload**: Variable length - Message-specific data
//!
//! ## Message Types
//!
//! | ID | Name | Payload |
//! |----|------|---------|
//! | 0 | CHOKE | none |
//! | 1 | UNCHOKE | none |
//! | 2 | INTERESTED | none |
//! | 3 | NOT INTERESTED | none |
//! | 4 | HAVE | piece index |
//! | 5 | BITFIELD | availability bitfield |
//! | 6 | REQUEST | index, begin, length |
//! | 7 | PIECE | index, begin, block data |
//! | 8 | CANCEL | index, begin, length |
//!
//! ## Keep-Alive Messages
//!
//! A frame with length 0 carries no ID and no payload. It decodes to `None`
//! rather than to a message.

use crate::error::{Error, Result};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};

use std::io::Read;

pub type MessageId = u8;

pub const MESSAGE_CHOKE: MessageId = 0;
pub const MESSAGE_UNCHOKE: MessageId = 1;
pub const MESSAGE_INTERESTED: MessageId = 2;
pub const MESSAGE_NOT_INTERESTED: MessageId = 3;
pub const MESSAGE_HAVE: MessageId = 4;
pub const MESSAGE_BITFIELD: MessageId = 5;
pub const MESSAGE_REQUEST: MessageId = 6;
pub const MESSAGE_PIECE: MessageId = 7;
pub const MESSAGE_CANCEL: MessageId = 8;

// Upper bound on a frame body. A PIECE carrying a 128KB block or a bitfield
// for a million pieces both fit.
const MESSAGE_LEN_MAX: usize = 1 << 20;

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message type identifier
    pub id: MessageId,
    /// Message payload data
    pub payload: Vec<u8>,
}

impl Message {
    /// Build a message without payload.
    pub fn new(id: MessageId) -> Self {
        Message {
            id,
            payload: vec![],
        }
    }

    /// Build a message with a payload.
    pub fn new_with_payload(id: MessageId, payload: Vec<u8>) -> Self {
        Message { id, payload }
    }

    /// Build a HAVE message.
    pub fn have(index: u32) -> Self {
        let mut payload = vec![0; 4];
        BigEndian::write_u32(&mut payload, index);
        Message::new_with_payload(MESSAGE_HAVE, payload)
    }

    /// Build a REQUEST message for `length` bytes at `begin` in piece `index`.
    pub fn request(index: u32, begin: u32, length: u32) -> Self {
        Message::new_with_payload(MESSAGE_REQUEST, block_payload(index, begin, length))
    }

    /// Build a CANCEL message, laid out like REQUEST.
    pub fn cancel(index: u32, begin: u32, length: u32) -> Self {
        Message::new_with_payload(MESSAGE_CANCEL, block_payload(index, begin, length))
    }

    /// Serialize the message into a length-prefixed frame.
    pub fn serialize(&self) -> Vec<u8> {
        let message_len = 1 + self.payload.len();

        let mut serialized: Vec<u8> = Vec::with_capacity(4 + message_len);
        serialized.extend_from_slice(&(message_len as u32).to_be_bytes());
        serialized.push(self.id);
        serialized.extend_from_slice(&self.payload);

        serialized
    }
}

/// Frame of a keep-alive message.
pub fn serialize_keep_alive() -> Vec<u8> {
    vec![0; 4]
}

fn block_payload(index: u32, begin: u32, length: u32) -> Vec<u8> {
    let mut payload = vec![0; 12];
    BigEndian::write_u32(&mut payload[0..4], index);
    BigEndian::write_u32(&mut payload[4..8], begin);
    BigEndian::write_u32(&mut payload[8..12], length);
    payload
}

/// Deserialize one complete frame, length prefix included.
///
/// Returns `Ok(None)` for a keep-alive.
pub fn deserialize_message(frame: &[u8]) -> Result<Option<Message>> {
    if frame.len() < 4 {
        return Err(Error::Protocol(format!(
            "frame of {} bytes has no length prefix",
            frame.len()
        )));
    }

    let message_len = BigEndian::read_u32(&frame[0..4]) as usize;
    if frame.len() - 4 != message_len {
        return Err(Error::Protocol(format!(
            "length prefix says {} bytes but frame holds {}",
            message_len,
            frame.len() - 4
        )));
    }

    if message_len == 0 {
        return Ok(None);
    }

    Ok(Some(Message::new_with_payload(
        frame[4],
        frame[5..].to_vec(),
    )))
}

/// Read one frame from a stream.
///
/// Blocks until a full frame is available. Returns `Ok(None)` for a
/// keep-alive.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Option<Message>> {
    let message_len = reader.read_u32::<BigEndian>()? as usize;

    if message_len == 0 {
        return Ok(None);
    }
    if message_len > MESSAGE_LEN_MAX {
        return Err(Error::Protocol(format!(
            "message of {} bytes exceeds limit of {}",
            message_len, MESSAGE_LEN_MAX
        )));
    }

    let mut message_buf: Vec<u8> = vec![0; message_len];
    reader.read_exact(&mut message_buf)?;

    let id = message_buf[0];
    message_buf.remove(0);

    Ok(Some(Message::new_with_payload(id, message_buf)))
}

/// Parse the piece index out of a HAVE message.
pub fn parse_have(message: &Message) -> Result<u32> {
    if message.id != MESSAGE_HAVE {
        return Err(Error::Protocol(format!(
            "expected HAVE message but got id {}",
            message.id
        )));
    }
    if message.payload.len() != 4 {
        return Err(Error::Protocol(format!(
            "expected 4 bytes HAVE payload but got {}",
            message.payload.len()
        )));
    }

    Ok(BigEndian::read_u32(&message.payload))
}

/// Validate a PIECE message and copy its block into `buf`.
///
/// The block must belong to piece `index` and lie entirely inside `buf`.
/// On success returns the number of bytes written; on failure `buf` is left
/// untouched.
pub fn parse_piece(index: u32, buf: &mut [u8], message: &Message) -> Result<usize> {
    if message.id != MESSAGE_PIECE {
        return Err(Error::Protocol(format!(
            "expected PIECE message but got id {}",
            message.id
        )));
    }
    if message.payload.len() < 8 {
        return Err(Error::Protocol(format!(
            "expected at least 8 bytes PIECE payload but got {}",
            message.payload.len()
        )));
    }

    let mut header = &message.payload[0..8];
    let parsed_index = header.read_u32::<BigEndian>()?;
    if parsed_index != index {
        return Err(Error::Protocol(format!(
            "expected piece {} but got {}",
            index, parsed_index
        )));
    }

    let begin = header.read_u32::<BigEndian>()? as usize;
    if begin >= buf.len() {
        return Err(Error::Protocol(format!(
            "begin offset too high ({} >= {})",
            begin,
            buf.len()
        )));
    }

    let block = &message.payload[8..];
    if begin + block.len() > buf.len() {
        return Err(Error::Protocol(format!(
            "block too long ({} + {} > {})",
            begin,
            block.len(),
            buf.len()
        )));
    }

    buf[begin..begin + block.len()].copy_from_slice(block);

    Ok(block.len())
}
