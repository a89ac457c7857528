//! This module emulates the PDP-1's core memory.
//!
//! The full address space is 65536 words: sixteen fields of 4096
//! words each.  A real installation usually had less; the configured
//! extent can be any whole number of fields.  Reads beyond the
//! configured extent return zero and writes beyond it are ignored,
//! which is how the hardware's non-existent-memory behaviour is
//! usually modelled.
//!
//! The accessors here are the *raw* path: no protection checks of any
//! kind.  Devices performing block transfers (drum, tape) use this
//! path directly, which is why restrict-mode protection does not
//! apply to DMA-style transfers.  CPU-issued references go through
//! the protected read/write helpers on the CPU itself, which layer
//! the restrict-mode check (and the MA/MB latches) on top of this
//! module.
//!
//! Memory contents persist across a CPU reset.

use std::fmt::{self, Debug, Formatter};

use base::prelude::*;

/// The size of a memory field in words.
pub const FIELD_WORDS: usize = 4096;

/// The largest supported memory: sixteen fields.
pub const MAX_MEMORY_WORDS: usize = 16 * FIELD_WORDS;

pub struct MemoryConfiguration {
    /// Number of 4096-word fields of memory present.
    pub fields: usize,
}

impl Default for MemoryConfiguration {
    fn default() -> MemoryConfiguration {
        MemoryConfiguration { fields: 16 }
    }
}

pub struct MemoryUnit {
    words: Vec<Word>,
}

impl MemoryUnit {
    pub fn new(config: &MemoryConfiguration) -> MemoryUnit {
        let fields = config.fields.clamp(1, 16);
        MemoryUnit {
            words: vec![Word::ZERO; fields * FIELD_WORDS],
        }
    }

    /// The configured extent in words.
    pub fn size(&self) -> usize {
        self.words.len()
    }

    pub fn is_mapped(&self, addr: Address) -> bool {
        addr.index() < self.words.len()
    }

    /// Read a word.  Non-existent memory reads as zero.
    pub fn read_raw(&self, addr: Address) -> Word {
        match self.words.get(addr.index()) {
            Some(w) => *w,
            None => Word::ZERO,
        }
    }

    /// Write a word.  Writes to non-existent memory are ignored.
    pub fn write_raw(&mut self, addr: Address, value: Word) {
        if let Some(w) = self.words.get_mut(addr.index()) {
            *w = value;
        }
    }
}

impl Debug for MemoryUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "MemoryUnit of {} words", self.words.len())
    }
}
