//! Emulates the PDP-1's central processor.
//!
//! Within this emulator the control unit performs the following
//! functions:
//!
//! - Instruction fetch and decoding
//! - Effective-address resolution (see `ea.rs`)
//! - Sequence-break entry and dismissal
//! - The restrict-mode protection check on every memory reference
//! - Dispatch to the opcode handlers in the `op_*.rs` submodules
//!
//! The original machine kept its registers in free-standing
//! flip-flop banks; here they are fields of [`Registers`], owned by
//! [`Cpu`].  The MA and MB latches are architectural state, not an
//! implementation convenience: several instructions read MB back
//! after a write, and the restrict-mode trap buffer records the low
//! bits of MB at the moment of a violation.

use serde::Serialize;
use tracing::{event, span, Level};

mod ea;
mod op_arith;
mod op_iot;
mod op_jump;
mod op_loadstore;
mod op_operate;
mod op_shift;
pub mod restrict;

use base::prelude::*;

use crate::context::Context;
use crate::io::DeviceManager;
use crate::memory::MemoryUnit;
use crate::sbs::{SbsMode, SequenceBreaks};
use crate::stop::{ExecFault, StopCondition};

use restrict::{BankVariant, RestrictMode, TrapCause, TRAP_CHANNEL};

/// Program-flag register bit assignments.  Flags 1-6 are the
/// program-controlled flags; the PDP-1D keeps the link and the
/// ring-mode switch in the same register.
pub const PF_FLAGS: u8 = 0o077;
pub const PF_LINK: u8 = 0o100;
pub const PF_RING: u8 = 0o200;

/// The visible register file.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Registers {
    /// The accumulator.
    pub ac: Word,
    /// The in-out register.
    pub io: Word,
    /// The program counter.  Increments within the current field.
    pub pc: Address,
    /// The memory-address latch.
    pub ma: Address,
    /// The memory-buffer latch.
    pub mb: Word,
    /// The overflow flip-flop.
    pub ov: bool,
    /// Program flags, link and ring-mode bit; see the `PF_*` masks.
    pub pf: u8,
    /// The six sense switches.
    pub ss: u8,
    /// The console test-word switches.
    pub tw: Word,
    /// The extend-mode flip-flop.
    pub extend: bool,
}

impl Registers {
    fn new(extend: bool) -> Registers {
        Registers {
            ac: Word::ZERO,
            io: Word::ZERO,
            pc: Address::ZERO,
            ma: Address::ZERO,
            mb: Word::ZERO,
            ov: false,
            pf: 0,
            ss: 0,
            tw: Word::ZERO,
            extend,
        }
    }

    /// The packed word pushed on sequence-break entry and loaded by
    /// JSP/CAL/JDA: overflow in bit 17, extend mode in bit 16, the
    /// program counter below.
    pub fn status_word(&self) -> Word {
        Word::from_truncated(
            (u32::from(self.ov) << 17) | (u32::from(self.extend) << 16) | self.pc.bits(),
        )
    }

    pub fn link(&self) -> bool {
        self.pf & PF_LINK != 0
    }

    pub fn set_link(&mut self, value: bool) {
        if value {
            self.pf |= PF_LINK;
        } else {
            self.pf &= !PF_LINK;
        }
    }

    pub fn ring_mode(&self) -> bool {
        self.pf & PF_RING != 0
    }
}

const PC_HISTORY_DEPTH: usize = 64;

/// A ring of the program-counter values captured before each control
/// transfer (jumps, calls, sequence-break entry and dismissal).
/// Diagnostic only; nothing in the machine reads it.
#[derive(Debug)]
struct PcHistory {
    entries: [Address; PC_HISTORY_DEPTH],
    next: usize,
    filled: usize,
}

impl PcHistory {
    fn new() -> PcHistory {
        PcHistory {
            entries: [Address::ZERO; PC_HISTORY_DEPTH],
            next: 0,
            filled: 0,
        }
    }

    fn record(&mut self, pc: Address) {
        self.entries[self.next] = pc;
        self.next = (self.next + 1) % PC_HISTORY_DEPTH;
        if self.filled < PC_HISTORY_DEPTH {
            self.filled += 1;
        }
    }

    /// The recorded values, most recent first.
    fn snapshot(&self) -> Vec<Address> {
        (1..=self.filled)
            .map(|back| self.entries[(self.next + PC_HISTORY_DEPTH - back) % PC_HISTORY_DEPTH])
            .collect()
    }
}

/// Which multiply/divide hardware the machine has.  This is a
/// property of the installation (which option was wired in), not of
/// any one instruction, so it is fixed when the CPU is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MulDivMode {
    /// The automatic multiply/divide option: MUL and DIV complete in
    /// one instruction.
    Hardware,
    /// The basic machine: opcodes 26 and 27 are the MUS/DIS single
    /// steps, issued repeatedly by software loops.
    Step,
}

#[derive(Debug, Clone, Copy)]
pub struct CpuConfiguration {
    pub sbs_mode: SbsMode,
    pub muldiv: MulDivMode,
    /// The PDP-1D instruction-set extensions (LCH/DCH, TAD, the
    /// special operate group, restrict mode).
    pub d_extensions: bool,
    pub restrict_banks: BankVariant,
    /// Persistent reset defaults for the sequence-break system and
    /// extend mode.
    pub sbs_on_at_reset: bool,
    pub extend_on_at_reset: bool,
    /// Indirect-chain bound.  A policy guard against runaway chains,
    /// not a hardware limit.
    pub ind_max: u32,
    /// XCT nesting bound, likewise.
    pub xct_max: u32,
    /// Whether decoding a reserved operation code stops the machine
    /// (when restrict mode is not redirecting it into the trap path).
    pub stop_on_reserved: bool,
}

impl Default for CpuConfiguration {
    fn default() -> CpuConfiguration {
        CpuConfiguration {
            sbs_mode: SbsMode::SixteenChannel,
            muldiv: MulDivMode::Hardware,
            d_extensions: true,
            restrict_banks: BankVariant::Narrow,
            sbs_on_at_reset: false,
            extend_on_at_reset: false,
            ind_max: 16,
            xct_max: 16,
            stop_on_reserved: true,
        }
    }
}

/// How instruction execution proceeds after one dispatch.
pub(crate) enum Flow {
    Next,
    /// XCT: execute this word in place of fetching.
    Xct(Instruction),
}

/// Cpu simulates the operation of the PDP-1's central processor.
#[derive(Debug)]
pub struct Cpu {
    pub(crate) regs: Registers,
    pub(crate) sbs: SequenceBreaks,
    pub(crate) restrict: RestrictMode,
    pub(crate) config: CpuConfiguration,
    /// Maps the shift group's 9-bit count field to a shift count.
    /// The encoding is the number of ones in the field; the table is
    /// filled once here, the way the hardware's count network was
    /// wired once.
    shift_counts: [u8; 512],
    history: PcHistory,
    /// The I/O halt latch: an IOT with the wait bit set is re-fetched
    /// until its completion pulse arrives.
    pub(crate) ioh: bool,
    /// The I/O synchronizer: set when a device completion pulse has
    /// been delivered and not yet consumed.
    pub(crate) ios: bool,
}

impl Cpu {
    pub fn new(config: CpuConfiguration) -> Cpu {
        let mut shift_counts = [0u8; 512];
        for (encoded, count) in shift_counts.iter_mut().enumerate() {
            *count = encoded.count_ones() as u8;
        }
        Cpu {
            regs: Registers::new(config.extend_on_at_reset),
            sbs: SequenceBreaks::new(config.sbs_mode, config.sbs_on_at_reset),
            restrict: RestrictMode::new(config.restrict_banks),
            config,
            shift_counts,
            history: PcHistory::new(),
            ioh: false,
            ios: false,
        }
    }

    /// Reset to architectural defaults.  AC, IO and PC survive so
    /// that state can be inspected and execution resumed; the
    /// sequence-break system and extend mode return to their
    /// configured persistent defaults; memory is untouched.
    pub fn reset(&mut self) {
        self.sbs.reset();
        self.restrict.reset();
        self.regs.extend = self.config.extend_on_at_reset;
        self.regs.ov = false;
        self.ioh = false;
        self.ios = false;
    }

    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    pub fn sequence_breaks(&mut self) -> &mut SequenceBreaks {
        &mut self.sbs
    }

    pub fn restrict_unit(&mut self) -> &mut RestrictMode {
        &mut self.restrict
    }

    pub fn configuration(&self) -> &CpuConfiguration {
        &self.config
    }

    /// The program-counter history, most recent control transfer
    /// first.
    pub fn pc_history(&self) -> Vec<Address> {
        self.history.snapshot()
    }

    /// The raise primitive for devices: post a sequence-break request
    /// on `channel`.  In the sixteen-channel system the request is
    /// gated by the channel's enable bit.
    pub fn raise_break(&mut self, channel: Channel) {
        self.sbs.raise(channel);
    }

    /// Deliver a device completion pulse: sets the I/O synchronizer
    /// which releases a waiting IOT.
    pub fn deliver_completion(&mut self) {
        self.ios = true;
    }

    /// True when a sequence break would be entered instead of the
    /// next fetch.
    pub fn break_pending(&self) -> bool {
        self.sbs.eval().is_some()
    }

    pub(crate) fn shift_count(&self, encoded: usize) -> u32 {
        u32::from(self.shift_counts[encoded & 0o777])
    }

    /// Read the word addressed by MA into MB, through the
    /// restrict-mode check.
    pub(crate) fn read_mem(&mut self, mem: &MemoryUnit) -> Result<(), ExecFault> {
        let addr = self.protected_address()?;
        self.regs.mb = mem.read_raw(addr);
        Ok(())
    }

    /// Write MB to the word addressed by MA, through the
    /// restrict-mode check.
    pub(crate) fn write_mem(&mut self, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        let addr = self.protected_address()?;
        mem.write_raw(addr, self.regs.mb);
        Ok(())
    }

    /// The physical address for a CPU-issued reference to MA:
    /// relocated through the bank rename table and checked against
    /// the restrict mask.  Protection is suspended while a sequence
    /// break is active.
    fn protected_address(&mut self) -> Result<Address, ExecFault> {
        if !self.restrict.is_enabled() || self.sbs.any_active() {
            return Ok(self.regs.ma);
        }
        let addr = self.restrict.relocate(self.regs.ma);
        if self.restrict.denies(addr) {
            self.restrict.record(TrapCause::MemoryReference, self.regs.mb);
            return Err(ExecFault::Restricted);
        }
        Ok(addr)
    }

    /// Convert a restrict-mode violation into a sequence-break
    /// request on the reserved trap channel.  The cause was already
    /// recorded at the point of detection.
    fn redirect_violation(&mut self) {
        event!(Level::DEBUG, "restrict violation redirected to channel {}", TRAP_CHANNEL);
        self.sbs.force_request(TRAP_CHANNEL);
    }

    /// One iteration of the machine: either enter an admissible
    /// sequence break, or fetch and execute one instruction (with any
    /// XCT chain it starts).
    pub fn step(
        &mut self,
        ctx: &Context,
        mem: &mut MemoryUnit,
        devices: &mut DeviceManager,
    ) -> Result<(), StopCondition> {
        if let Some(channel) = self.sbs.eval() {
            let break_span = span!(Level::INFO, "break", ch = u8::from(channel));
            let _enter = break_span.enter();
            return match self.enter_break(channel, mem) {
                Ok(()) => Ok(()),
                Err(ExecFault::Restricted) => {
                    self.redirect_violation();
                    Ok(())
                }
                Err(ExecFault::Stop(stop)) => Err(stop),
            };
        }

        // Fetch.
        self.regs.ma = self.regs.pc;
        match self.read_mem(mem) {
            Ok(()) => {}
            Err(ExecFault::Restricted) => {
                self.redirect_violation();
                return Ok(());
            }
            Err(ExecFault::Stop(stop)) => return Err(stop),
        }
        let inst = Instruction::from(self.regs.mb);
        self.regs.pc = self.regs.pc.page_successor();

        let exec_span = span!(
            Level::DEBUG,
            "xop",
            pc = %self.regs.ma,
            op = inst.opcode_number()
        );
        let _enter = exec_span.enter();

        let mut executing = inst;
        let mut xct_nesting = 0;
        loop {
            match self.execute(executing, ctx, mem, devices) {
                Ok(Flow::Next) => break,
                Ok(Flow::Xct(next)) => {
                    xct_nesting += 1;
                    if xct_nesting > self.config.xct_max {
                        return Err(StopCondition::NestedXct {
                            address: self.regs.ma,
                        });
                    }
                    executing = next;
                }
                Err(ExecFault::Restricted) => {
                    self.redirect_violation();
                    break;
                }
                Err(ExecFault::Stop(stop)) => return Err(stop),
            }
        }
        Ok(())
    }

    /// Execute one instruction word.  Re-entered (without a fetch)
    /// for each link of an XCT chain.
    fn execute(
        &mut self,
        inst: Instruction,
        ctx: &Context,
        mem: &mut MemoryUnit,
        devices: &mut DeviceManager,
    ) -> Result<Flow, ExecFault> {
        let opcode = match inst.opcode() {
            Some(op) => op,
            None => {
                self.reserved(inst)?;
                return Ok(Flow::Next);
            }
        };
        match opcode {
            Opcode::Lch | Opcode::Dch | Opcode::Tad | Opcode::Ops
                if !self.config.d_extensions =>
            {
                self.reserved(inst)?;
                return Ok(Flow::Next);
            }
            _ => {}
        }
        match opcode {
            Opcode::And => self.op_and(inst, mem)?,
            Opcode::Ior => self.op_ior(inst, mem)?,
            Opcode::Xor => self.op_xor(inst, mem)?,
            Opcode::Xct => return self.op_xct(inst, mem),
            Opcode::Lch => self.op_lch(inst, mem)?,
            Opcode::Dch => self.op_dch(inst, mem)?,
            Opcode::Cal => self.op_cal_jda(inst, mem)?,
            Opcode::Lac => self.op_lac(inst, mem)?,
            Opcode::Lio => self.op_lio(inst, mem)?,
            Opcode::Dac => self.op_dac(inst, mem)?,
            Opcode::Dap => self.op_dap(inst, mem)?,
            Opcode::Dip => self.op_dip(inst, mem)?,
            Opcode::Dio => self.op_dio(inst, mem)?,
            Opcode::Dzm => self.op_dzm(inst, mem)?,
            Opcode::Tad => self.op_tad(inst, mem)?,
            Opcode::Add => self.op_add(inst, mem)?,
            Opcode::Sub => self.op_sub(inst, mem)?,
            Opcode::Idx => self.op_idx(inst, mem, false)?,
            Opcode::Isp => self.op_idx(inst, mem, true)?,
            Opcode::Sad => self.op_sad_sas(inst, mem, false)?,
            Opcode::Sas => self.op_sad_sas(inst, mem, true)?,
            Opcode::Mul => self.op_mul(inst, mem)?,
            Opcode::Div => self.op_div(inst, mem)?,
            Opcode::Jmp => self.op_jmp(inst, mem)?,
            Opcode::Jsp => self.op_jsp(inst, mem)?,
            Opcode::Skp => self.op_skp(inst)?,
            Opcode::Sft => self.op_sft(inst)?,
            Opcode::Law => self.op_law(inst)?,
            Opcode::Iot => self.op_iot(inst, ctx, devices)?,
            Opcode::Ops => self.op_special_operate(inst)?,
            Opcode::Opr => self.op_operate(inst)?,
        }
        Ok(Flow::Next)
    }

    fn op_xct(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<Flow, ExecFault> {
        self.resolve_address(inst, mem)?;
        self.read_mem(mem)?;
        Ok(Flow::Xct(Instruction::from(self.regs.mb)))
    }

    /// Sequence-break entry: push AC, the status word and IO to the
    /// channel's status block and continue in the handler.  The
    /// pushes use the protected write path; a restrict violation
    /// during entry is redirected like any other (though with a break
    /// active the protection check is normally already suspended).
    fn enter_break(&mut self, channel: Channel, mem: &mut MemoryUnit) -> Result<(), ExecFault> {
        event!(Level::INFO, "entering sequence break on channel {}", channel);
        self.history.record(self.regs.pc);
        self.sbs.begin(channel);
        let block = Address::from_truncated(u32::from(channel.number()) << 2);

        self.regs.ma = block;
        self.regs.mb = self.regs.ac;
        self.write_mem(mem)?;

        self.regs.ma = Address::from_truncated(block.bits() + 1);
        self.regs.mb = self.regs.status_word();
        self.write_mem(mem)?;

        self.regs.ma = Address::from_truncated(block.bits() + 2);
        self.regs.mb = self.regs.io;
        self.write_mem(mem)?;

        self.regs.pc = Address::from_truncated(block.bits() + 3);
        self.regs.extend = false;
        self.regs.ov = false;
        Ok(())
    }

    /// Handle a reserved instruction per configuration: a trap when
    /// restrict mode is watching, a stop when configured to stop,
    /// otherwise a no-op.
    fn reserved(&mut self, inst: Instruction) -> Result<(), ExecFault> {
        if self.restrict.is_enabled() && !self.sbs.any_active() {
            self.restrict
                .record(TrapCause::IllegalInstruction, self.regs.mb);
            return Err(ExecFault::Restricted);
        }
        if self.config.stop_on_reserved {
            return Err(ExecFault::Stop(StopCondition::ReservedInstruction {
                word: inst.word(),
                address: self.regs.pc.page_predecessor(),
            }));
        }
        event!(Level::WARN, "ignoring reserved instruction {:?}", inst);
        Ok(())
    }

    pub(crate) fn record_transfer(&mut self, pc: Address) {
        self.history.record(pc);
    }
}

#[cfg(test)]
mod tests;
