//! ## Logical and arithmetic opcodes
//!
//! - AND, IOR, XOR: bitwise on AC
//! - ADD, SUB: one's-complement add/subtract
//! - TAD: add with link (PDP-1D)
//! - IDX, ISP: index memory (and skip on positive)
//! - SAD, SAS: compare and skip
//! - MUL, DIV: multiply/divide, or the MUS/DIS steps on machines
//!   without the automatic option
//!
//! The numeric subtleties live here.  ADD performs, in order: the raw
//! add, the end-around carry, overflow detection from the operand and
//! result signs, and then the minus-zero cleanup.  That ordering is
//! architectural: overflow is judged before the cleanup rewrites the
//! all-ones pattern.  SUB is complement-add-complement and performs
//! no cleanup; adding a number to its own complement therefore leaves
//! minus zero visible after SUB sequences, exactly as on the
//! hardware.

use base::prelude::*;

use crate::control::{Cpu, MulDivMode};
use crate::memory::MemoryUnit;
use crate::stop::ExecFault;

const DMASK: u32 = 0o777_777;
const SIGN: u32 = Word::SIGN_BIT;

/// End-around-carry add over raw 18-bit values.
const fn ones_add_raw(a: u32, b: u32) -> u32 {
    let raw = a + b;
    if raw > DMASK {
        (raw + 1) & DMASK
    } else {
        raw
    }
}

impl Cpu {
    fn fetch_operand(&mut self, inst: Instruction, mem: &MemoryUnit) -> Result<(), ExecFault> {
        self.resolve_address(inst, mem)?;
        self.read_mem(mem)
    }

    pub(crate) fn op_and(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        self.fetch_operand(inst, mem)?;
        self.regs.ac = self.regs.ac & self.regs.mb;
        Ok(())
    }

    pub(crate) fn op_ior(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        self.fetch_operand(inst, mem)?;
        self.regs.ac = self.regs.ac | self.regs.mb;
        Ok(())
    }

    pub(crate) fn op_xor(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        self.fetch_operand(inst, mem)?;
        self.regs.ac = self.regs.ac ^ self.regs.mb;
        Ok(())
    }

    pub(crate) fn op_add(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        self.fetch_operand(inst, mem)?;
        let a = self.regs.ac.bits();
        let b = self.regs.mb.bits();
        let mut sum = ones_add_raw(a, b);
        if (!(a ^ b) & (a ^ sum)) & SIGN != 0 {
            self.regs.ov = true;
        }
        if sum == DMASK {
            sum = 0; // minus-zero cleanup
        }
        self.regs.ac = Word::from_truncated(sum);
        Ok(())
    }

    pub(crate) fn op_sub(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        self.fetch_operand(inst, mem)?;
        // Complement, add, complement.  No minus-zero cleanup.
        let a = (!self.regs.ac).bits();
        let b = self.regs.mb.bits();
        let diff = ones_add_raw(a, b);
        if (!(a ^ b) & (a ^ diff)) & SIGN != 0 {
            self.regs.ov = true;
        }
        self.regs.ac = !Word::from_truncated(diff);
        Ok(())
    }

    /// TAD: add with link, for multiple-precision arithmetic.  The
    /// link takes the carry out of bit 17 instead of an end-around
    /// propagation, and no minus-zero cleanup is performed.
    pub(crate) fn op_tad(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        self.fetch_operand(inst, mem)?;
        let carry_in = u32::from(self.regs.link());
        let raw = self.regs.ac.bits() + self.regs.mb.bits() + carry_in;
        self.regs.set_link(raw > DMASK);
        self.regs.ac = Word::from_truncated(raw);
        Ok(())
    }

    /// IDX and ISP: increment the memory word (through the same
    /// end-around rule as ADD, so incrementing minus zero skips
    /// through to +1), leave the result in AC, and for ISP skip when
    /// the result is positive.
    pub(crate) fn op_idx(
        &mut self,
        inst: Instruction,
        mem: &mut MemoryUnit,
        skip_on_positive: bool,
    ) -> Result<(), ExecFault> {
        self.fetch_operand(inst, mem)?;
        let incremented = Word::from_truncated(ones_add_raw(self.regs.mb.bits(), 1));
        self.regs.mb = incremented;
        self.write_mem(mem)?;
        self.regs.ac = incremented;
        if skip_on_positive && incremented.is_positive() {
            self.regs.pc = self.regs.pc.page_successor();
        }
        Ok(())
    }

    /// SAD skips when AC and the operand differ; SAS when they are
    /// the same.  The comparison is on raw bits.
    pub(crate) fn op_sad_sas(
        &mut self,
        inst: Instruction,
        mem: &mut MemoryUnit,
        skip_on_same: bool,
    ) -> Result<(), ExecFault> {
        self.fetch_operand(inst, mem)?;
        if (self.regs.ac == self.regs.mb) == skip_on_same {
            self.regs.pc = self.regs.pc.page_successor();
        }
        Ok(())
    }

    pub(crate) fn op_mul(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        self.fetch_operand(inst, mem)?;
        match self.config.muldiv {
            MulDivMode::Hardware => self.mul_hardware(),
            MulDivMode::Step => self.mul_step(),
        }
        Ok(())
    }

    /// The automatic multiply: AC times the operand leaves a 34-bit
    /// product in AC:IO, the high half in AC, with both halves
    /// carrying the product sign.  Seventeen add-and-shift steps over
    /// the magnitudes, one aligning shift, then the sign restoration.
    fn mul_hardware(&mut self) {
        let sign_negative = (self.regs.ac.bits() ^ self.regs.mb.bits()) & SIGN != 0;
        let multiplicand = self.regs.mb.magnitude().bits();
        let mut ac: u32 = 0;
        let mut io: u32 = self.regs.ac.magnitude().bits();
        for _ in 0..17 {
            if io & 1 != 0 {
                ac += multiplicand;
            }
            io = (io >> 1) | ((ac & 1) << 17);
            ac >>= 1;
        }
        // The multiplier occupied seventeen bits, so one more shift
        // brings the product down into alignment.
        io = (io >> 1) | ((ac & 1) << 17);
        ac >>= 1;
        if sign_negative && (ac | io) != 0 {
            ac = !ac & DMASK;
            io = !io & DMASK;
        }
        self.regs.ac = Word::from_truncated(ac);
        self.regs.io = Word::from_truncated(io);
    }

    /// MUS: one multiply step.  If IO bit 0 is set, the operand is
    /// added to AC (end-around); then AC:IO shifts right one place.
    /// Software issues a loop of these; the registers hold
    /// intermediate state between issues.
    fn mul_step(&mut self) {
        let mut ac = self.regs.ac.bits();
        let mut io = self.regs.io.bits();
        if io & 1 != 0 {
            ac = ones_add_raw(ac, self.regs.mb.bits());
        }
        io = (io >> 1) | ((ac & 1) << 17);
        ac >>= 1;
        self.regs.ac = Word::from_truncated(ac);
        self.regs.io = Word::from_truncated(io);
    }

    pub(crate) fn op_div(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        self.fetch_operand(inst, mem)?;
        match self.config.muldiv {
            MulDivMode::Hardware => self.div_hardware(),
            MulDivMode::Step => self.div_step(),
        }
        Ok(())
    }

    /// The automatic divide: the 34-bit dividend in AC:IO divided by
    /// the operand leaves the quotient in AC and the remainder in IO,
    /// and skips the next instruction.  On overflow (quotient would
    /// not fit) the registers are left unchanged and no skip occurs.
    fn div_hardware(&mut self) {
        let dividend_negative = self.regs.ac.is_negative();
        let quotient_negative = (self.regs.ac.bits() ^ self.regs.mb.bits()) & SIGN != 0;
        let divisor = u64::from(self.regs.mb.magnitude().bits());

        let (ac_mag, io_mag) = if dividend_negative {
            ((!self.regs.ac).bits(), (!self.regs.io).bits())
        } else {
            (self.regs.ac.bits(), self.regs.io.bits())
        };
        // The 34-bit dividend magnitude: seventeen bits from each
        // half; the halves' sign positions are not data.
        let dividend = (u64::from(ac_mag & (DMASK >> 1)) << 17) | u64::from(io_mag & (DMASK >> 1));

        if divisor == 0 {
            return; // divide overflow: no skip, nothing changes
        }
        let quotient = dividend / divisor;
        let remainder = dividend % divisor;
        if quotient > u64::from(DMASK >> 1) {
            return; // quotient will not fit: overflow, no skip
        }

        let mut q = quotient as u32;
        let mut r = remainder as u32;
        if quotient_negative {
            q = !q & DMASK;
        }
        // The remainder takes the dividend's sign.
        if dividend_negative {
            r = !r & DMASK;
        }
        self.regs.ac = Word::from_truncated(q);
        self.regs.io = Word::from_truncated(r);
        self.regs.pc = self.regs.pc.page_successor();
    }

    /// DIS: one non-restoring divide step.  AC:IO rotates left one
    /// place with the complement of the old AC sign entering IO bit
    /// 0; then the operand is subtracted from AC (if that bit is one)
    /// or added back with a correction (if zero).  Like MUS this
    /// leaves intermediate state for the next issue of the loop.
    fn div_step(&mut self) {
        let ac = self.regs.ac.bits();
        let io = self.regs.io.bits();
        let not_sign = (!ac >> 17) & 1;
        let new_ac = ((ac << 1) | (io >> 17)) & DMASK;
        let new_io = ((io << 1) & DMASK) | not_sign;
        let mb = self.regs.mb.bits();
        let adjusted = if new_io & 1 != 0 {
            ones_add_raw(new_ac, !mb & DMASK) // subtract
        } else {
            ones_add_raw(ones_add_raw(new_ac, mb), 1) // add back
        };
        self.regs.ac = Word::from_truncated(adjusted);
        self.regs.io = Word::from_truncated(new_io);
    }

    pub(crate) fn op_law(&mut self, inst: Instruction) -> Result<(), ExecFault> {
        let literal = Word::from_truncated(inst.address_field());
        self.regs.ac = if inst.is_indirect() { !literal } else { literal };
        Ok(())
    }
}
