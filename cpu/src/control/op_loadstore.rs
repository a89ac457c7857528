//! ## Load and store opcodes
//!
//! - LAC, LIO: load AC / IO
//! - DAC, DIO: deposit AC / IO
//! - DAP, DIP: deposit the address part (low 12 bits) / instruction
//!   part (high 6 bits).  Both are read-modify-write: the rest of the
//!   target word is preserved, so the two halves can be stored
//!   independently.
//! - DZM: deposit zero
//! - LCH, DCH: load/deposit a six-bit character through a byte
//!   pointer (PDP-1D)

use base::prelude::*;

use crate::control::Cpu;
use crate::memory::MemoryUnit;
use crate::stop::ExecFault;

/// The address part of an instruction word.
const ADDRESS_PART: u32 = 0o007_777;

/// The instruction part: opcode and indirect bit.
const INSTRUCTION_PART: u32 = 0o770_000;

impl Cpu {
    pub(crate) fn op_lac(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        self.resolve_address(inst, mem)?;
        self.read_mem(mem)?;
        self.regs.ac = self.regs.mb;
        Ok(())
    }

    pub(crate) fn op_lio(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        self.resolve_address(inst, mem)?;
        self.read_mem(mem)?;
        self.regs.io = self.regs.mb;
        Ok(())
    }

    pub(crate) fn op_dac(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        self.resolve_address(inst, mem)?;
        self.regs.mb = self.regs.ac;
        self.write_mem(mem)
    }

    pub(crate) fn op_dio(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        self.resolve_address(inst, mem)?;
        self.regs.mb = self.regs.io;
        self.write_mem(mem)
    }

    pub(crate) fn op_dap(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        self.resolve_address(inst, mem)?;
        self.read_mem(mem)?;
        self.regs.mb = Word::from_truncated(
            (self.regs.mb.bits() & INSTRUCTION_PART) | (self.regs.ac.bits() & ADDRESS_PART),
        );
        self.write_mem(mem)
    }

    pub(crate) fn op_dip(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        self.resolve_address(inst, mem)?;
        self.read_mem(mem)?;
        self.regs.mb = Word::from_truncated(
            (self.regs.ac.bits() & INSTRUCTION_PART) | (self.regs.mb.bits() & ADDRESS_PART),
        );
        self.write_mem(mem)
    }

    pub(crate) fn op_dzm(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        self.resolve_address(inst, mem)?;
        self.regs.mb = Word::ZERO;
        self.write_mem(mem)
    }

    /// LCH: load the addressed character into the low six bits of AC.
    pub(crate) fn op_lch(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        let pointer = self.resolve_char_address(inst, mem)?;
        self.read_mem(mem)?;
        self.regs.ac = Word::from_truncated((self.regs.mb.bits() >> pointer.shift()) & 0o77);
        Ok(())
    }

    /// DCH: deposit the low six bits of AC into the addressed
    /// character position, preserving the other two characters.
    pub(crate) fn op_dch(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        let pointer = self.resolve_char_address(inst, mem)?;
        self.read_mem(mem)?;
        let shift = pointer.shift();
        self.regs.mb = Word::from_truncated(
            (self.regs.mb.bits() & !(0o77 << shift)) | ((self.regs.ac.bits() & 0o77) << shift),
        );
        self.write_mem(mem)
    }
}
