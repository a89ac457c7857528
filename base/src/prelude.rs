//! The prelude exports the structs used to represent PDP-1 machine
//! words, addresses and instructions.  Providing this prelude is the
//! main purpose of the base crate.
pub use super::charptr::{BytePointer, CHAR_SHIFTS};
pub use super::instruction::{encode, Instruction, Opcode, ADDRESS_FIELD, INDIRECT_BIT};
pub use super::onescomp::{ConversionFailed, Word};
pub use super::types::{Address, Channel, DeviceCode};
pub use super::w18;
