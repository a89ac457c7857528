//! The PDP-1D restrict-mode memory protection unit.
//!
//! When restrict mode is on, every CPU-issued memory reference is
//! checked against a per-bank permission mask before it is performed.
//! A reference to a denied bank does not stop the machine: the
//! violation is recorded in the trap buffer and redirected into the
//! sequence-break system on a reserved high-priority channel, so the
//! same admissibility rules that govern device breaks govern the
//! trap.  A monitor learns what happened by reading the trap buffer
//! back with a dedicated IOT.
//!
//! Protection is suspended while any sequence break is active, which
//! lets break handlers reach protected memory.  Device DMA transfers
//! never come through this unit at all.

use serde::Serialize;

use base::prelude::*;

/// The reserved channel on which restrict-mode traps are delivered.
pub const TRAP_CHANNEL: Channel = Channel::new_truncated(14);

/// How bank numbers are derived from an address.  The two variants
/// correspond to the two restrict-option wirings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BankVariant {
    /// Four 16384-word banks; bank number in address bits 14-15.  The
    /// bank rename table applies in this variant.
    Wide,
    /// Sixteen 4096-word banks; bank number in address bits 12-15.
    Narrow,
}

/// Trap causes, recorded in the high bits of the trap buffer.  A
/// plain memory-access violation records no cause bit at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrapCause {
    MemoryReference,
    IllegalInstruction,
    IotWhileRestricted,
    HaltWhileRestricted,
    CharPageCross,
}

impl TrapCause {
    pub const fn code(self) -> u32 {
        match self {
            TrapCause::MemoryReference => 0,
            TrapCause::IllegalInstruction => 0o200_000,
            TrapCause::IotWhileRestricted => 0o400_000,
            TrapCause::HaltWhileRestricted => 0o100_000,
            TrapCause::CharPageCross => 0o040_000,
        }
    }
}

/// The low bits of the memory-buffer latch which are recorded beside
/// the cause code.
const TRAP_MB_MASK: u32 = 0o037_777;

#[derive(Debug, Serialize)]
pub struct RestrictMode {
    enabled: bool,
    /// One permission bit per bank: bit 17 denies bank 0, bit 16
    /// bank 1, and so on.  Wider banks use fewer effective bits.
    mask: Word,
    trap_buffer: Word,
    /// Bank rename table, identity by default (Wide variant only).
    rename: [u8; 4],
    variant: BankVariant,
}

impl RestrictMode {
    pub fn new(variant: BankVariant) -> RestrictMode {
        RestrictMode {
            enabled: false,
            mask: Word::ZERO,
            trap_buffer: Word::ZERO,
            rename: [0, 1, 2, 3],
            variant,
        }
    }

    /// Reset to the architectural defaults: mode off, rename table
    /// identity.  The permission mask persists like memory does.
    pub fn reset(&mut self) {
        self.enabled = false;
        self.trap_buffer = Word::ZERO;
        self.rename = [0, 1, 2, 3];
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn variant(&self) -> BankVariant {
        self.variant
    }

    pub fn mask(&self) -> Word {
        self.mask
    }

    pub fn set_mask(&mut self, mask: Word) {
        self.mask = mask;
    }

    /// Install a rename-table entry (Wide variant).
    pub fn set_rename(&mut self, slot: usize, bank: u8) {
        self.rename[slot & 3] = bank & 3;
    }

    /// Apply the bank rename table to an address.  In the Narrow
    /// variant this is the identity.
    pub fn relocate(&self, addr: Address) -> Address {
        match self.variant {
            BankVariant::Narrow => addr,
            BankVariant::Wide => {
                let bank = (addr.bits() >> 14) & 3;
                let renamed = u32::from(self.rename[bank as usize]);
                Address::from_truncated((renamed << 14) | (addr.bits() & 0o037_777))
            }
        }
    }

    fn bank_of(&self, addr: Address) -> u32 {
        match self.variant {
            BankVariant::Wide => (addr.bits() >> 14) & 0o3,
            BankVariant::Narrow => (addr.bits() >> 12) & 0o17,
        }
    }

    /// True when the permission mask denies the bank containing
    /// `addr`.  The test is the sign bit of the mask shifted left by
    /// the bank number.
    pub fn denies(&self, addr: Address) -> bool {
        let bank = self.bank_of(addr);
        self.mask.bits() & (Word::SIGN_BIT >> bank) != 0
    }

    /// Record a violation.  Must be complete before the trap request
    /// is posted, since the trap handler's only way to learn the
    /// cause is to read the buffer back.
    pub fn record(&mut self, cause: TrapCause, mb: Word) {
        self.trap_buffer = Word::from_truncated(cause.code() | (mb.bits() & TRAP_MB_MASK));
    }

    /// The trap buffer, as read back by the dedicated IOT.
    pub fn trap_buffer(&self) -> Word {
        self.trap_buffer
    }
}
