//! Binary and symbolic representations of PDP-1 instructions.
//!
//! A PDP-1 instruction occupies one 18-bit word.  The bits look like
//! this (least significant bit on the right, bits numbered 0 to 17):
//!
//! |Opcode |Indirect|Operand Memory Address|
//! |-------|--------|----------------------|
//! |5 bits |1 bit   |      12 bits         |
//! |(13-17)|(12)    |       (0-11)         |
//!
//! The 12-bit address field reaches only the 4096-word field selected
//! by the program counter; the indirect bit extends the reach through
//! indirection (see the effective-address logic in the cpu crate).
//!
//! Several opcode families reinterpret the low 13 bits:
//!
//! - the shift group (opcode 33) uses bits 9-12 to select one of
//!   twelve shift/rotate forms and the number of ones in bits 0-8 as
//!   the shift count;
//! - the skip group (opcode 32) treats the low bits as independently
//!   OR-combined test conditions, with the indirect bit inverting the
//!   combined result;
//! - the operate groups (opcodes 36 and 37) treat the low bits as
//!   micro-operation selectors;
//! - IOT (opcode 35) takes a 6-bit device code from bits 0-5 and uses
//!   the indirect-bit position as the "wait for completion" flag.

use std::fmt::{self, Debug, Display, Formatter};

use serde::Serialize;

use super::onescomp::Word;
use super::types::DeviceCode;

/// The position of the indirect ("defer") bit.
pub const INDIRECT_BIT: u32 = 0o010_000;

/// The 12-bit direct address field.
pub const ADDRESS_FIELD: u32 = 0o007_777;

/// A PDP-1 instruction.
#[derive(Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Instruction(Word);

impl Instruction {
    pub const fn bits(&self) -> u32 {
        self.0.bits()
    }

    pub const fn word(&self) -> Word {
        self.0
    }

    /// The primary operation code: the top five bits.
    pub const fn opcode_number(&self) -> u32 {
        (self.0.bits() >> 13) & 0o37
    }

    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::try_from(self.opcode_number()).ok()
    }

    pub const fn is_indirect(&self) -> bool {
        self.0.bits() & INDIRECT_BIT != 0
    }

    /// The 12-bit direct address field, Y.
    pub const fn address_field(&self) -> u32 {
        self.0.bits() & ADDRESS_FIELD
    }

    /// For IOT instructions, the device the instruction addresses.
    pub const fn device_code(&self) -> DeviceCode {
        DeviceCode::new_truncated((self.0.bits() & 0o77) as u8)
    }

    /// For IOT instructions, the wait-for-completion bit (which
    /// shares the indirect bit's position).
    pub const fn io_wait(&self) -> bool {
        self.is_indirect()
    }

    /// For IOT control-pulse instructions, the channel select in bits
    /// 6-9.
    pub const fn channel_field(&self) -> u32 {
        (self.0.bits() >> 6) & 0o17
    }

    /// For shift-group instructions, the form selector in bits 9-12.
    pub const fn shift_form(&self) -> u32 {
        (self.0.bits() >> 9) & 0o17
    }

    /// For shift-group instructions, the 9-bit encoded count field.
    pub const fn shift_count_field(&self) -> usize {
        (self.0.bits() & 0o777) as usize
    }
}

impl From<Word> for Instruction {
    fn from(w: Word) -> Instruction {
        Instruction(w)
    }
}

impl From<Instruction> for Word {
    fn from(inst: Instruction) -> Word {
        inst.0
    }
}

impl Debug for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.opcode() {
            Some(op) => write!(
                f,
                "{}{} {:>04o} [{:>06o}]",
                op,
                if self.is_indirect() { " i" } else { "" },
                self.address_field(),
                self.bits()
            ),
            None => write!(f, "?? [{:>06o}]", self.bits()),
        }
    }
}

/// The PDP-1 primary operation codes.  The enumerator values are the
/// top five bits of the instruction word.  Mnemonics follow the PDP-1
/// Handbook; opcodes 05, 06, 17 and 36 exist only on the PDP-1D.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Opcode {
    And = 0o01,
    Ior = 0o02,
    Xor = 0o03,
    Xct = 0o04,
    Lch = 0o05,
    Dch = 0o06,
    Cal = 0o07, // CAL when direct, JDA when the indirect bit is set
    Lac = 0o10,
    Lio = 0o11,
    Dac = 0o12,
    Dap = 0o13,
    Dip = 0o14,
    Dio = 0o15,
    Dzm = 0o16,
    Tad = 0o17,
    Add = 0o20,
    Sub = 0o21,
    Idx = 0o22,
    Isp = 0o23,
    Sad = 0o24,
    Sas = 0o25,
    Mul = 0o26,
    Div = 0o27,
    Jmp = 0o30,
    Jsp = 0o31,
    Skp = 0o32,
    Sft = 0o33,
    Law = 0o34,
    Iot = 0o35,
    Ops = 0o36, // PDP-1D special operate group
    Opr = 0o37,
}

/// The error produced when decoding a reserved operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedOpcode(pub u32);

impl Display for ReservedOpcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "operation code {:>02o} is reserved", self.0)
    }
}

impl std::error::Error for ReservedOpcode {}

impl TryFrom<u32> for Opcode {
    type Error = ReservedOpcode;
    fn try_from(n: u32) -> Result<Opcode, ReservedOpcode> {
        use Opcode::*;
        match n {
            0o01 => Ok(And),
            0o02 => Ok(Ior),
            0o03 => Ok(Xor),
            0o04 => Ok(Xct),
            0o05 => Ok(Lch),
            0o06 => Ok(Dch),
            0o07 => Ok(Cal),
            0o10 => Ok(Lac),
            0o11 => Ok(Lio),
            0o12 => Ok(Dac),
            0o13 => Ok(Dap),
            0o14 => Ok(Dip),
            0o15 => Ok(Dio),
            0o16 => Ok(Dzm),
            0o17 => Ok(Tad),
            0o20 => Ok(Add),
            0o21 => Ok(Sub),
            0o22 => Ok(Idx),
            0o23 => Ok(Isp),
            0o24 => Ok(Sad),
            0o25 => Ok(Sas),
            0o26 => Ok(Mul),
            0o27 => Ok(Div),
            0o30 => Ok(Jmp),
            0o31 => Ok(Jsp),
            0o32 => Ok(Skp),
            0o33 => Ok(Sft),
            0o34 => Ok(Law),
            0o35 => Ok(Iot),
            0o36 => Ok(Ops),
            0o37 => Ok(Opr),
            _ => Err(ReservedOpcode(n)),
        }
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            Opcode::And => "and",
            Opcode::Ior => "ior",
            Opcode::Xor => "xor",
            Opcode::Xct => "xct",
            Opcode::Lch => "lch",
            Opcode::Dch => "dch",
            Opcode::Cal => "cal",
            Opcode::Lac => "lac",
            Opcode::Lio => "lio",
            Opcode::Dac => "dac",
            Opcode::Dap => "dap",
            Opcode::Dip => "dip",
            Opcode::Dio => "dio",
            Opcode::Dzm => "dzm",
            Opcode::Tad => "tad",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Idx => "idx",
            Opcode::Isp => "isp",
            Opcode::Sad => "sad",
            Opcode::Sas => "sas",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Jmp => "jmp",
            Opcode::Jsp => "jsp",
            Opcode::Skp => "skp",
            Opcode::Sft => "sft",
            Opcode::Law => "law",
            Opcode::Iot => "iot",
            Opcode::Ops => "ops",
            Opcode::Opr => "opr",
        })
    }
}

/// Assemble an instruction word from an opcode, indirect bit and
/// 12-bit address field.  Mostly useful for building test programs.
pub fn encode(op: Opcode, indirect: bool, y: u32) -> Word {
    let bits =
        ((op as u32) << 13) | (if indirect { INDIRECT_BIT } else { 0 }) | (y & ADDRESS_FIELD);
    Word::from_truncated(bits)
}
