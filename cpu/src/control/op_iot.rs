//! ## IOT: the in-out transfer group (opcode 35)
//!
//! The low six bits select a device.  A handful of codes are wired
//! into the processor itself (the sequence-break control pulses, the
//! extend-mode and ring-mode pulses, the status and trap-buffer
//! readouts, the restrict-mode pulses); everything else dispatches
//! through the device table.
//!
//! The wait protocol: an IOT with the wait bit set is issued, the I/O
//! halt latch goes up, and the program counter is backed up so the
//! same instruction is fetched again.  The re-issues continue until
//! the device returns a completion pulse or the synchronizer
//! flip-flop has been set by a poll-time completion, at which point
//! the latch drops and execution proceeds.  If no completion pulse is
//! pending anywhere in the I/O system the wait can never end, and the
//! machine stops with the distinct I/O-wait condition instead of
//! spinning silently.

use base::prelude::*;

use crate::context::Context;
use crate::control::restrict::TrapCause;
use crate::control::{Cpu, PF_RING};
use crate::io::DeviceManager;
use crate::stop::{ExecFault, StopCondition};

impl Cpu {
    pub(crate) fn op_iot(
        &mut self,
        inst: Instruction,
        ctx: &Context,
        devices: &mut DeviceManager,
    ) -> Result<(), ExecFault> {
        if self.restrict.is_enabled() && !self.sbs.any_active() {
            self.restrict
                .record(TrapCause::IotWhileRestricted, self.regs.mb);
            return Err(ExecFault::Restricted);
        }

        let code = u8::from(inst.device_code());
        let mut completion = false;
        match code {
            // Sequence-break control pulses.  The channel select for
            // dsc/asc/isb rides in bits 6-9.
            0o50 => {
                let channel = Channel::new_truncated(inst.channel_field() as u8);
                self.sbs.disable_channel(channel); // dsc
            }
            0o51 => {
                let channel = Channel::new_truncated(inst.channel_field() as u8);
                self.sbs.enable_channel(channel); // asc
            }
            0o52 => {
                let channel = Channel::new_truncated(inst.channel_field() as u8);
                self.sbs.force_request(channel); // isb
            }
            0o53 => self.sbs.clear_all_active(), // cac
            0o54 => self.sbs.set_on(false),      // lsm
            0o55 => self.sbs.set_on(true),       // esm
            0o56 => self.sbs.clear_system(),     // cbs

            // Check status: a simplified readout with the
            // completion-pending mask in the low bits and the I/O
            // halt latch in the sign bit.
            0o33 => {
                let mut status = devices.status_word();
                if self.ioh {
                    status = status | Word::SIGN_BIT;
                }
                self.regs.io = status;
            }

            // Extend mode enter/leave, selected by bit 11.
            0o74 => {
                self.regs.extend = inst.bits() & 0o4000 != 0;
            }

            // Ring mode set/clear (PDP-1D).
            0o10 if self.config.d_extensions => self.regs.pf |= PF_RING,
            0o11 if self.config.d_extensions => self.regs.pf &= !PF_RING,

            // Trap-buffer readout (PDP-1D): the break handler's only
            // way to learn what caused a restrict trap.
            0o35 if self.config.d_extensions => {
                self.regs.io = self.restrict.trap_buffer();
            }

            // Restrict-mode control pulses (PDP-1D).
            0o61 if self.config.d_extensions => self.restrict.set_enabled(true),
            0o62 if self.config.d_extensions => self.restrict.set_enabled(false),
            0o63 if self.config.d_extensions => self.restrict.set_mask(self.regs.io),
            0o64 if self.config.d_extensions => {
                // Load the rename table, packed two bits per entry in
                // the low byte of IO.
                let packed = self.regs.io.bits();
                for slot in 0..4 {
                    self.restrict
                        .set_rename(slot, ((packed >> (2 * slot)) & 3) as u8);
                }
            }

            // Everything else belongs to an attached device.
            _ => match devices.dispatch(ctx, inst, self.regs.io) {
                Some(result) => {
                    self.regs.io = result.io;
                    completion = result.completion;
                    if let Some(stop) = result.stop {
                        return Err(stop.into());
                    }
                    if result.skip {
                        self.regs.pc = self.regs.pc.page_successor();
                    }
                }
                None => return self.reserved(inst),
            },
        }

        if inst.io_wait() {
            if completion || self.ios {
                self.ioh = false;
                self.ios = false;
            } else if !self.ioh {
                // First issuance: raise the halt latch and re-fetch
                // this same instruction.
                self.ioh = true;
                self.regs.pc = self.regs.pc.page_predecessor();
            } else if devices.completion_pending() {
                self.regs.pc = self.regs.pc.page_predecessor();
            } else {
                self.ioh = false;
                return Err(ExecFault::Stop(StopCondition::IoWait {
                    device: inst.device_code(),
                }));
            }
        }
        Ok(())
    }
}
