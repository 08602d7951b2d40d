//! # Piece Availability Bitfield
//!
//! Compact record of which pieces a remote peer claims to hold. Each byte
//! covers 8 pieces, most significant bit first:
//!
//! ```text
//! Byte 0: [piece 0, 1, 2, 3, 4, 5, 6, 7]
//! Byte 1: [piece 8, 9, 10, 11, 12, 13, 14, 15]
//! ```
//!
//! The size is fixed by the peer's initial BITFIELD message. Later HAVE
//! messages only flip bits inside that range.

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bits: Vec<u8>,
}

impl Bitfield {
    /// Builds an empty bitfield able to hold `piece_count` pieces.
    pub fn new(piece_count: usize) -> Self {
        Bitfield {
            bits: vec![0; piece_count.div_ceil(8)],
        }
    }

    /// Wraps the raw payload of a BITFIELD message.
    pub fn from_bytes(bits: Vec<u8>) -> Self {
        Bitfield { bits }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Returns `true` if the piece is marked available. Indices past the
    /// end of the bitfield are never available.
    pub fn has_piece(&self, index: u32) -> bool {
        let byte_index = (index / 8) as usize;
        let offset = index % 8;

        match self.bits.get(byte_index) {
            Some(&byte) => byte >> (7 - offset) & 1 != 0,
            None => false,
        }
    }

    /// Marks a piece as available. Out of range indices are ignored.
    pub fn set_piece(&mut self, index: u32) {
        let byte_index = (index / 8) as usize;
        let offset = index % 8;

        if let Some(byte) = self.bits.get_mut(byte_index) {
            *byte |= 1 << (7 - offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_has() {
        let mut bitfield = Bitfield::new(20);
        for index in [0, 7, 8, 13, 19] {
            assert!(!bitfield.has_piece(index));
            bitfield.set_piece(index);
            assert!(bitfield.has_piece(index));
        }
        assert!(!bitfield.has_piece(1));
        assert!(!bitfield.has_piece(18));
    }

    #[test]
    fn high_bit_is_first_piece() {
        let bitfield = Bitfield::from_bytes(vec![0b1000_0001, 0b0100_0000]);
        assert!(bitfield.has_piece(0));
        assert!(bitfield.has_piece(7));
        assert!(bitfield.has_piece(9));
        assert!(!bitfield.has_piece(1));
        assert!(!bitfield.has_piece(8));
    }

    #[test]
    fn out_of_range_is_ignored() {
        let mut bitfield = Bitfield::new(8);
        bitfield.set_piece(64);
        assert_eq!(bitfield.as_bytes(), &[0]);
        assert!(!bitfield.has_piece(64));
    }
}
