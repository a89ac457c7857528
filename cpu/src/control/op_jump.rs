//! ## Jump, call and skip opcodes
//!
//! - JMP, including the dismiss-and-restore encodings
//! - JSP: jump and save program counter
//! - CAL/JDA: the bifurcated call opcode
//! - SKP: the skip group
//!
//! The sequence-break dismissal is *data*, not an opcode of its own:
//! a `jmp i` whose target lies in register bank 0 with the low two
//! address bits 01 is the return-from-break sequence.  The guard here
//! must run before the ordinary jump path, because the same bit
//! pattern is otherwise a perfectly legal indirect jump; software
//! compiled for the real machine depends on this exact decoding.

use tracing::{event, Level};

use base::prelude::*;

use crate::control::Cpu;
use crate::memory::MemoryUnit;
use crate::sbs::SbsMode;
use crate::stop::ExecFault;

impl Cpu {
    pub(crate) fn op_jmp(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        if self.sbs.is_on() && inst.is_indirect() {
            let y = inst.address_field();
            match self.sbs.mode() {
                SbsMode::OneChannel if y == 0o0001 => {
                    return self.dismiss_and_restore(Channel::ZERO, y, mem);
                }
                SbsMode::SixteenChannel if y & 0o7703 == 0o0001 => {
                    let channel = Channel::new_truncated(((y >> 2) & 0o17) as u8);
                    return self.dismiss_and_restore(channel, y, mem);
                }
                _ => {}
            }
        }
        self.resolve_address(inst, mem)?;
        self.record_transfer(self.regs.pc);
        self.regs.pc = self.regs.ma;
        Ok(())
    }

    /// Return from a sequence break: drop the channel's active flag,
    /// then reload PC, overflow and extend mode from the saved status
    /// word at the jump target.
    fn dismiss_and_restore(
        &mut self,
        channel: Channel,
        y: u32,
        mem: &MemoryUnit,
    ) -> Result<(), ExecFault> {
        event!(Level::INFO, "dismissing sequence break on channel {}", channel);
        self.sbs.dismiss(channel);
        // The status blocks live in register bank 0 regardless of the
        // handler's field.
        self.regs.ma = Address::from_truncated(y);
        self.read_mem(mem)?;
        let saved = self.regs.mb.bits();
        self.record_transfer(self.regs.pc);
        self.regs.pc = Address::from_truncated(saved);
        self.regs.ov = saved & (1 << 17) != 0;
        self.regs.extend = saved & (1 << 16) != 0;
        Ok(())
    }

    /// JSP: the status word (overflow, extend mode, return address)
    /// goes to AC, then control transfers.
    pub(crate) fn op_jsp(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        self.resolve_address(inst, mem)?;
        self.regs.ac = self.regs.status_word();
        self.record_transfer(self.regs.pc);
        self.regs.pc = self.regs.ma;
        Ok(())
    }

    /// CAL and JDA share opcode 07 and bifurcate on the indirect bit.
    /// CAL (bit clear) is the trap-like form: the save location is
    /// fixed at 100 in the current field.  JDA (bit set) saves at the
    /// instruction's own address field.  Either way AC is deposited
    /// at the save location, the status word replaces AC, and control
    /// transfers to the following word.
    pub(crate) fn op_cal_jda(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        let target = if inst.is_indirect() {
            self.regs.pc.in_same_field(inst.address_field())
        } else {
            self.regs.pc.in_same_field(0o100)
        };
        self.regs.ma = target;
        self.regs.mb = self.regs.ac;
        self.write_mem(mem)?;
        self.regs.ac = self.regs.status_word();
        self.record_transfer(self.regs.pc);
        self.regs.pc = target.page_successor();
        Ok(())
    }

    /// The skip group: up to eight test conditions, each selected by
    /// its own bit and OR-combined (a multi-condition skip fires when
    /// *any* selected test is satisfied), with the indirect bit
    /// inverting the combined result.  Testing the overflow flip-flop
    /// clears it as a side effect.
    pub(crate) fn op_skp(&mut self, inst: Instruction) -> Result<(), ExecFault> {
        let bits = inst.bits();
        let mut condition = false;
        if bits & 0o2000 != 0 {
            condition |= self.regs.ac.is_plus_zero(); // sza
        }
        if bits & 0o1000 != 0 {
            condition |= self.regs.ac.is_positive(); // spa
        }
        if bits & 0o0400 != 0 {
            condition |= self.regs.ac.is_negative(); // sma
        }
        if bits & 0o0200 != 0 {
            condition |= !self.regs.ov; // szo
        }
        if bits & 0o0100 != 0 {
            condition |= self.regs.io.is_positive(); // spi
        }
        if bits & 0o4000 != 0 && self.config.d_extensions {
            condition |= self.regs.io.bits() != 0; // sni
        }
        let switch = (bits >> 3) & 0o7; // szs
        if switch != 0 {
            condition |= if switch == 7 {
                self.regs.ss & 0o77 == 0
            } else {
                self.regs.ss & (1 << (switch - 1)) == 0
            };
        }
        let flag = bits & 0o7; // szf
        if flag != 0 {
            condition |= if flag == 7 {
                self.regs.pf & 0o77 == 0
            } else {
                self.regs.pf & (1 << (flag - 1)) == 0
            };
        }
        if inst.is_indirect() {
            condition = !condition;
        }
        if condition {
            self.regs.pc = self.regs.pc.page_successor();
        }
        if bits & 0o0200 != 0 {
            self.regs.ov = false; // szo tested it, so clear it
        }
        Ok(())
    }
}
