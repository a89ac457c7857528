//! ## The operate groups (opcodes 37 and, on the PDP-1D, 36)
//!
//! Each operate instruction is a bundle of independently selectable
//! micro-operations applied in one fixed order.  The order is part of
//! the architecture: a later micro-operation sees the results of an
//! earlier one within the same instruction, so `cla` followed by
//! `lat` loads the test-word switches while the reverse order would
//! OR them into the old accumulator.
//!
//! The halt micro-operation consults restrict mode before actually
//! halting: a halt attempted while restricted (and no break active)
//! is a trap, not a stop.

use base::prelude::*;

use crate::control::restrict::TrapCause;
use crate::control::{Cpu, PF_FLAGS, PF_RING};
use crate::stop::{ExecFault, StopCondition};

impl Cpu {
    /// Opcode 37.  Micro-operation order: clear IO, clear AC, OR in
    /// the test word, OR in the status word, complement AC, halt,
    /// set/clear program flags.
    pub(crate) fn op_operate(&mut self, inst: Instruction) -> Result<(), ExecFault> {
        let bits = inst.bits();
        let mut halt = false;
        if bits & 0o4000 != 0 {
            self.regs.io = Word::ZERO; // cli
        }
        if bits & 0o0200 != 0 {
            self.regs.ac = Word::ZERO; // cla
        }
        if bits & 0o2000 != 0 {
            self.regs.ac = self.regs.ac | self.regs.tw; // lat
        }
        if bits & 0o0100 != 0 {
            self.regs.ac = self.regs.ac | self.regs.status_word(); // lap
        }
        if bits & 0o1000 != 0 {
            self.regs.ac = !self.regs.ac; // cma
        }
        if bits & 0o0400 != 0 {
            halt = true; // hlt, applied after the flag micro-ops
        }
        let flag = bits & 0o7;
        if flag != 0 {
            let set = bits & 0o10 != 0; // stf vs clf
            let mask = if flag == 7 {
                PF_FLAGS
            } else {
                1 << (flag - 1)
            };
            if set {
                self.regs.pf |= mask;
            } else {
                self.regs.pf &= !mask;
            }
        }
        if halt {
            if self.restrict.is_enabled() && !self.sbs.any_active() {
                self.restrict
                    .record(TrapCause::HaltWhileRestricted, self.regs.mb);
                return Err(ExecFault::Restricted);
            }
            return Err(ExecFault::Stop(StopCondition::Halt { pc: self.regs.pc }));
        }
        Ok(())
    }

    /// Opcode 36, the PDP-1D special operate group.  Micro-operation
    /// order: clear link, complement link, set ring mode, clear ring
    /// mode, swap AC and IO.
    pub(crate) fn op_special_operate(&mut self, inst: Instruction) -> Result<(), ExecFault> {
        let bits = inst.bits();
        if bits & 0o4000 != 0 {
            self.regs.set_link(false); // cll
        }
        if bits & 0o2000 != 0 {
            let link = self.regs.link();
            self.regs.set_link(!link); // cml
        }
        if bits & 0o1000 != 0 {
            self.regs.pf |= PF_RING; // srm
        }
        if bits & 0o0400 != 0 {
            self.regs.pf &= !PF_RING; // crm
        }
        if bits & 0o0200 != 0 {
            std::mem::swap(&mut self.regs.ac, &mut self.regs.io); // swp
        }
        Ok(())
    }
}
