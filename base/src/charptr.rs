//! The packed character pointer used by the PDP-1D character
//! instructions (LCH and DCH).
//!
//! A character pointer is an ordinary 18-bit word: the top two bits
//! hold a character position (1, 2 or 3; 0 is not a valid position)
//! and the low 16 bits hold the address of the word containing the
//! character.  Characters are six bits wide and three of them pack
//! into one machine word; the position selects which six bits via
//! [`CHAR_SHIFTS`].
//!
//! Auto-increment advances the position 1 → 2 → 3 and then wraps back
//! to 1, carrying into the address.  In ring mode the carry is
//! confined to the current 4096-word field, so a character string in
//! a ring buffer rolls over at the field boundary instead of crossing
//! into the next field.

use serde::Serialize;

use super::onescomp::Word;
use super::types::Address;

/// Shift amount for each character position.  Position 0 is invalid
/// and shares the shift of position 1.
pub const CHAR_SHIFTS: [u32; 4] = [0, 0, 6, 12];

#[derive(Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BytePointer {
    bits: u32,
}

impl BytePointer {
    pub const fn position(&self) -> usize {
        ((self.bits >> 16) & 0o3) as usize
    }

    pub const fn address(&self) -> Address {
        Address::from_truncated(self.bits)
    }

    /// The bit shift selecting this pointer's character within its
    /// word.
    pub const fn shift(&self) -> u32 {
        CHAR_SHIFTS[self.position()]
    }

    /// The pointer advanced by one character position.  The second
    /// element of the returned pair reports whether the advance
    /// carried the address across a field boundary; in ring mode the
    /// carry stays within the field and a cross cannot occur.
    pub fn advanced(&self, ring_mode: bool) -> (BytePointer, bool) {
        let pos = self.position() + 1;
        let addr = self.bits & 0o177_777;
        if pos <= 3 {
            return (
                BytePointer {
                    bits: ((pos as u32) << 16) | addr,
                },
                false,
            );
        }
        // Wrap to position 1 and carry into the address.
        let (next_addr, crossed) = if ring_mode {
            (
                (addr & Address::FIELD_SELECT) | ((addr + 1) & Address::WITHIN_FIELD),
                false,
            )
        } else {
            let next = (addr + 1) & 0o177_777;
            (
                next,
                next & Address::FIELD_SELECT != addr & Address::FIELD_SELECT,
            )
        };
        (
            BytePointer {
                bits: (1 << 16) | next_addr,
            },
            crossed,
        )
    }
}

impl From<Word> for BytePointer {
    fn from(w: Word) -> BytePointer {
        BytePointer { bits: w.bits() }
    }
}

impl From<BytePointer> for Word {
    fn from(bp: BytePointer) -> Word {
        Word::from_truncated(bp.bits)
    }
}

impl std::fmt::Debug for BytePointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BytePointer{{{}:{}}}", self.position(), self.address())
    }
}
