//! Address and small-integer types for the PDP-1.
//!
//! The PDP-1 address space is 16 bits wide: sixteen 4096-word fields.
//! An instruction's direct address field is only 12 bits, so direct
//! addressing always stays within the field selected by the program
//! counter's high bits.  The program counter itself increments within
//! its field: a carry out of the low 12 bits is discarded rather than
//! propagated into the field-select bits.  [`Address::page_successor`]
//! and [`Address::page_predecessor`] implement that wraparound.

use std::fmt::{self, Debug, Display, Formatter, Octal};

use serde::Serialize;

#[cfg(test)]
use test_strategy::Arbitrary;

use super::onescomp::{ConversionFailed, Word};

/// A 16-bit physical memory address.
#[cfg_attr(test, derive(Arbitrary))]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Address(#[cfg_attr(test, strategy(0u32..0o200_000u32))] u32);

impl Address {
    pub const BITS: u32 = 16;
    const MODULUS: u32 = 1 << Self::BITS;
    const VALUE_BITS: u32 = Self::MODULUS - 1;

    pub const ZERO: Address = Address(0);
    pub const MAX: Address = Address(Self::VALUE_BITS);

    /// The position-within-field part of an address (the low 12 bits).
    pub const WITHIN_FIELD: u32 = 0o007_777;

    /// The field-select part of an address (the high 4 bits).
    pub const FIELD_SELECT: u32 = 0o170_000;

    /// Form an address from the low 16 bits of `bits`, discarding any
    /// higher bits.
    pub const fn from_truncated(bits: u32) -> Address {
        Address(bits & Self::VALUE_BITS)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// The address as a vector index.
    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    /// The field-select bits of this address, in place.
    pub const fn field_bits(&self) -> u32 {
        self.0 & Self::FIELD_SELECT
    }

    /// Combine this address's field-select bits with a 12-bit
    /// position.  This is how every direct and multi-level indirect
    /// address is formed: the field comes from the program counter.
    pub const fn in_same_field(&self, position: u32) -> Address {
        Address(self.field_bits() | (position & Self::WITHIN_FIELD))
    }

    /// The next address within the current field.  The carry out of
    /// bit 11 is discarded, so `0o007777` in field 0 is followed by
    /// `0o000000`, not `0o010000`.
    pub const fn page_successor(&self) -> Address {
        Address(self.field_bits() | ((self.0 + 1) & Self::WITHIN_FIELD))
    }

    /// The previous address within the current field; the inverse of
    /// [`Address::page_successor`].
    pub const fn page_predecessor(&self) -> Address {
        Address(self.field_bits() | (self.0.wrapping_sub(1) & Self::WITHIN_FIELD))
    }
}

impl From<u16> for Address {
    fn from(n: u16) -> Address {
        Address(n.into())
    }
}

impl TryFrom<u32> for Address {
    type Error = ConversionFailed;
    fn try_from(n: u32) -> Result<Address, ConversionFailed> {
        if n > Address::VALUE_BITS {
            Err(ConversionFailed::TooLarge)
        } else {
            Ok(Address(n))
        }
    }
}

impl From<Address> for u32 {
    fn from(a: Address) -> u32 {
        a.0
    }
}

impl From<Address> for usize {
    fn from(a: Address) -> usize {
        a.0 as usize
    }
}

impl From<Address> for Word {
    fn from(a: Address) -> Word {
        Word::from_truncated(a.0)
    }
}

impl Default for Address {
    fn default() -> Address {
        Address::ZERO
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        // Always display as octal.
        write!(f, "{:>06o}", self.0)
    }
}

impl Octal for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        Octal::fmt(&self.0, f)
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:>06o}", self.0)
    }
}

/// A sequence-break channel (priority level).  Channel 0 is the highest priority;
/// the 16-channel break system has channels 0 through 15.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Channel(u8);

impl Channel {
    pub const COUNT: u8 = 16;
    pub const ZERO: Channel = Channel(0);

    pub const fn new_truncated(n: u8) -> Channel {
        Channel(n & (Self::COUNT - 1))
    }

    pub const fn number(&self) -> u8 {
        self.0
    }

    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    /// The bit representing this level in a request/enable/active
    /// mask.  Bit 0 is level 0, the highest priority.
    pub const fn bit(&self) -> u16 {
        1 << self.0
    }
}

impl TryFrom<u8> for Channel {
    type Error = ConversionFailed;
    fn try_from(n: u8) -> Result<Channel, ConversionFailed> {
        if n >= Channel::COUNT {
            Err(ConversionFailed::TooLarge)
        } else {
            Ok(Channel(n))
        }
    }
}

impl TryFrom<u32> for Channel {
    type Error = ConversionFailed;
    fn try_from(n: u32) -> Result<Channel, ConversionFailed> {
        match u8::try_from(n) {
            Ok(b) => Channel::try_from(b),
            Err(_) => Err(ConversionFailed::TooLarge),
        }
    }
}

impl From<Channel> for u8 {
    fn from(lvl: Channel) -> u8 {
        lvl.0
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:o}", self.0)
    }
}

impl Debug for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "level {:o}", self.0)
    }
}

/// A 6-bit IOT device address (codes 0 through 0o77).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DeviceCode(u8);

impl DeviceCode {
    pub const fn new_truncated(n: u8) -> DeviceCode {
        DeviceCode(n & 0o77)
    }

    pub const fn number(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for DeviceCode {
    type Error = ConversionFailed;
    fn try_from(n: u8) -> Result<DeviceCode, ConversionFailed> {
        if n > 0o77 {
            Err(ConversionFailed::TooLarge)
        } else {
            Ok(DeviceCode(n))
        }
    }
}

impl From<DeviceCode> for u8 {
    fn from(d: DeviceCode) -> u8 {
        d.0
    }
}

impl Display for DeviceCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:>02o}", self.0)
    }
}

impl Debug for DeviceCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "device {:>02o}", self.0)
    }
}
