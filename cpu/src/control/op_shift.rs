//! ## The shift group (opcode 33)
//!
//! Twelve forms: rotate, and arithmetic (sign-preserving) shift, each
//! left or right, over AC, IO, or the 36-bit combined AC:IO register.
//! The shift count is the number of ones in the instruction's 9-bit
//! count field; the mapping goes through the table built at CPU
//! construction, the way the hardware's counting network was wired.
//!
//! Arithmetic shifts keep the sign bit in place and, because this is
//! a one's-complement machine, fill the vacated position with a copy
//! of the sign: doubling a negative number shifts a one in at the
//! bottom, halving shifts the sign in below the sign bit.

use base::prelude::*;

use crate::control::Cpu;
use crate::stop::ExecFault;

const DMASK: u32 = 0o777_777;
const SIGN: u32 = Word::SIGN_BIT;

const fn rotate_left(w: u32) -> u32 {
    ((w << 1) | (w >> 17)) & DMASK
}

const fn rotate_right(w: u32) -> u32 {
    ((w >> 1) | ((w & 1) << 17)) & DMASK
}

const fn shift_left_arith(w: u32) -> u32 {
    let sign = w & SIGN;
    sign | ((w << 1) & (DMASK >> 1) & !1) | (sign >> 17)
}

const fn shift_right_arith(w: u32) -> u32 {
    (w >> 1) | (w & SIGN)
}

impl Cpu {
    pub(crate) fn op_sft(&mut self, inst: Instruction) -> Result<(), ExecFault> {
        let count = self.shift_count(inst.shift_count_field());
        let mut ac = self.regs.ac.bits();
        let mut io = self.regs.io.bits();
        for _ in 0..count {
            match inst.shift_form() {
                0o01 => ac = rotate_left(ac),             // ral
                0o02 => io = rotate_left(io),             // ril
                0o03 => {
                    // rcl: AC:IO rotate left as 36 bits
                    let top = (ac >> 17) & 1;
                    ac = ((ac << 1) | (io >> 17)) & DMASK;
                    io = ((io << 1) | top) & DMASK;
                }
                0o05 => ac = shift_left_arith(ac),        // sal
                0o06 => io = shift_left_arith(io),        // sil
                0o07 => {
                    // scl: the 35 magnitude bits shift left under AC's sign
                    let sign = ac & SIGN;
                    ac = sign | (((ac << 1) | (io >> 17)) & (DMASK >> 1));
                    io = ((io << 1) & DMASK & !1) | (sign >> 17);
                }
                0o11 => ac = rotate_right(ac),            // rar
                0o12 => io = rotate_right(io),            // rir
                0o13 => {
                    // rcr: AC:IO rotate right as 36 bits
                    let bottom = ac & 1;
                    ac = ((ac >> 1) | ((io & 1) << 17)) & DMASK;
                    io = ((io >> 1) | (bottom << 17)) & DMASK;
                }
                0o15 => ac = shift_right_arith(ac),       // sar
                0o16 => io = shift_right_arith(io),       // sir
                0o17 => {
                    // scr: the magnitude shifts right under AC's sign
                    let sign = ac & SIGN;
                    io = ((io >> 1) | ((ac & 1) << 17)) & DMASK;
                    ac = (ac >> 1) | sign;
                }
                _ => {
                    // The unassigned forms decode as reserved.
                    self.regs.ac = Word::from_truncated(ac);
                    self.regs.io = Word::from_truncated(io);
                    return self.reserved(inst);
                }
            }
        }
        self.regs.ac = Word::from_truncated(ac);
        self.regs.io = Word::from_truncated(io);
        Ok(())
    }
}
