//! Effective-address resolution.
//!
//! A memory-reference instruction's 12-bit address field reaches only
//! the field the program counter is in; the field-select bits always
//! come from PC.  The indirect bit changes meaning with extend mode:
//!
//! - extend mode **on**: exactly one indirect read, and the fetched
//!   word's full 16-bit address reaches anywhere in memory.  There is
//!   no chain; extend mode removes multi-level indirection entirely.
//! - extend mode **off**: the fetched word's own indirect bit can
//!   call for another level, each level confined to the current
//!   field.  The chain is bounded by the configured `ind_max`; a
//!   chain which fails to terminate within the bound is the
//!   "nested indirect addresses" stop, a loop guard rather than a
//!   hardware limit.
//!
//! The character instructions resolve through the same chain walk,
//! but the word in the final cell is a packed byte pointer (see
//! [`base::BytePointer`]) rather than an address, and the
//! instruction's indirect-bit position asks for the pointer to be
//! auto-incremented in place before use.

use base::prelude::*;

use crate::control::restrict::TrapCause;
use crate::control::Cpu;
use crate::memory::MemoryUnit;
use crate::stop::{ExecFault, StopCondition};

impl Cpu {
    /// Resolve the operand address of `inst`, leaving it in MA.
    pub(crate) fn resolve_address(
        &mut self,
        inst: Instruction,
        mem: &MemoryUnit,
    ) -> Result<(), ExecFault> {
        self.regs.ma = self.regs.pc.in_same_field(inst.address_field());
        if !inst.is_indirect() {
            return Ok(());
        }
        if self.regs.extend {
            // One level, full address width.
            self.read_mem(mem)?;
            self.regs.ma = Address::from_truncated(self.regs.mb.bits());
            return Ok(());
        }
        for _ in 0..self.config.ind_max {
            self.read_mem(mem)?;
            self.regs.ma = self.regs.pc.in_same_field(self.regs.mb.bits());
            if self.regs.mb.bits() & INDIRECT_BIT == 0 {
                return Ok(());
            }
        }
        Err(ExecFault::Stop(StopCondition::NestedIndirect {
            address: self.regs.ma,
        }))
    }

    /// Resolve the byte pointer of a character instruction (LCH/DCH).
    ///
    /// On return MA addresses the word holding the character and the
    /// returned pointer selects the character within it.  When the
    /// instruction requests auto-increment, the advanced pointer is
    /// written back to its cell first; a field cross during the
    /// advance is a protection violation in restrict mode and traps
    /// before the increment is committed.
    pub(crate) fn resolve_char_address(
        &mut self,
        inst: Instruction,
        mem: &mut MemoryUnit,
    ) -> Result<BytePointer, ExecFault> {
        // Walk to the cell holding the byte pointer.  The chain is
        // driven by the indirect bits of the *fetched* words; the
        // instruction's own indirect bit means auto-increment here.
        self.regs.ma = self.regs.pc.in_same_field(inst.address_field());
        if self.regs.extend {
            self.read_mem(mem)?;
        } else {
            self.read_mem(mem)?;
            let mut levels = 0;
            while self.regs.mb.bits() & INDIRECT_BIT != 0 {
                levels += 1;
                if levels > self.config.ind_max {
                    return Err(ExecFault::Stop(StopCondition::NestedIndirect {
                        address: self.regs.ma,
                    }));
                }
                self.regs.ma = self.regs.pc.in_same_field(self.regs.mb.bits());
                self.read_mem(mem)?;
            }
        }

        if inst.is_indirect() {
            let (advanced, crossed) = BytePointer::from(self.regs.mb).advanced(self.regs.ring_mode());
            if crossed && self.restrict.is_enabled() && !self.sbs.any_active() {
                self.restrict.record(TrapCause::CharPageCross, self.regs.mb);
                return Err(ExecFault::Restricted);
            }
            self.regs.mb = Word::from(advanced);
            self.write_mem(mem)?;
        }

        let pointer = BytePointer::from(self.regs.mb);
        self.regs.ma = pointer.address();
        Ok(pointer)
    }
}
