//! The sequence-break system: the PDP-1's interrupt mechanism.
//!
//! Two mutually exclusive configurations exist, selected when the CPU
//! is built:
//!
//! - the basic **one-channel** system: three flip-flops.  `ON` is the
//!   global enable, `RQ` a pending request, `IP` records that a break
//!   is in progress.  There is no priority concept; the admissibility
//!   test is just `ON && RQ`, and re-entry is prevented by the
//!   servicing code (which is expected to turn the system off or
//!   dismiss promptly), not by `IP`.
//!
//! - the **type 120 sixteen-channel** system: three 16-bit masks,
//!   `req`, `enb` and `act`, one bit per channel, bit 0 = channel 0 =
//!   highest priority.  A device's raise is gated by `enb` *at
//!   request time*: once a request has been posted, disabling the
//!   channel does not cancel it.  (The Maintenance Manual says
//!   requests also accumulate while the whole system is off, so the
//!   global enable gates evaluation only.)  A pending request is
//!   admissible when no channel of equal or higher priority is
//!   active, so a break can pre-empt a lower-priority handler but
//!   never an equal-or-higher one.
//!
//! Admissibility is re-evaluated between instructions only; a request
//! raised by a device becomes visible at the next evaluation point
//! and is never dropped while it waits.

use serde::Serialize;
use tracing::{event, Level};

use base::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SbsMode {
    OneChannel,
    SixteenChannel,
}

#[derive(Debug, Serialize)]
pub struct SequenceBreaks {
    mode: SbsMode,
    /// Global enable, both models.
    on: bool,
    /// One-channel request and break-in-progress flip-flops.
    rq: bool,
    ip: bool,
    /// Sixteen-channel request, enable and active masks.
    req: u16,
    enb: u16,
    act: u16,
    /// The persistent default restored by [`SequenceBreaks::reset`].
    on_at_reset: bool,
}

impl SequenceBreaks {
    pub fn new(mode: SbsMode, on_at_reset: bool) -> SequenceBreaks {
        SequenceBreaks {
            mode,
            on: on_at_reset,
            rq: false,
            ip: false,
            req: 0,
            enb: 0,
            act: 0,
            on_at_reset,
        }
    }

    pub fn mode(&self) -> SbsMode {
        self.mode
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// The esm/lsm control pulses: turn the whole system on or off.
    /// Turning it off touches neither `req` nor `enb`; outstanding
    /// requests survive an off/on cycle.
    pub fn set_on(&mut self, on: bool) {
        self.on = on;
    }

    /// Reset to the architectural defaults.  The global enable
    /// returns to its configured persistent default.
    pub fn reset(&mut self) {
        self.on = self.on_at_reset;
        self.rq = false;
        self.ip = false;
        self.req = 0;
        self.enb = 0;
        self.act = 0;
    }

    /// The cbs control pulse: drop every request and active flag.
    pub fn clear_system(&mut self) {
        self.rq = false;
        self.ip = false;
        self.req = 0;
        self.act = 0;
    }

    /// The raise primitive used by devices.  In the sixteen-channel
    /// system the raise is gated through the channel's enable bit; in
    /// the one-channel system it sets the global request flip-flop
    /// unconditionally.
    pub fn raise(&mut self, channel: Channel) {
        match self.mode {
            SbsMode::OneChannel => {
                self.rq = true;
            }
            SbsMode::SixteenChannel => {
                if self.enb & channel.bit() != 0 {
                    event!(Level::DEBUG, "raising sequence break channel {}", channel);
                    self.req |= channel.bit();
                }
            }
        }
    }

    /// Post a request without consulting the enable mask.  Used for
    /// the isb control pulse and for the restrict-mode trap, neither
    /// of which a program can mask out with dsc.
    pub fn force_request(&mut self, channel: Channel) {
        match self.mode {
            SbsMode::OneChannel => {
                self.rq = true;
            }
            SbsMode::SixteenChannel => {
                self.req |= channel.bit();
            }
        }
    }

    /// The asc/dsc control pulses.
    pub fn enable_channel(&mut self, channel: Channel) {
        self.enb |= channel.bit();
    }

    pub fn disable_channel(&mut self, channel: Channel) {
        // Deliberately leaves any posted request in place.
        self.enb &= !channel.bit();
    }

    /// The cac control pulse: every active flag is dropped, as if all
    /// in-progress breaks had been dismissed at once.
    pub fn clear_all_active(&mut self) {
        self.act = 0;
        self.ip = false;
    }

    /// True when a request is outstanding on `channel` (or, in the
    /// one-channel system, at all).
    pub fn request_pending(&self, channel: Channel) -> bool {
        match self.mode {
            SbsMode::OneChannel => self.rq,
            SbsMode::SixteenChannel => self.req & channel.bit() != 0,
        }
    }

    /// True while any break is being serviced.  Restrict-mode
    /// protection is suspended in that state.
    pub fn any_active(&self) -> bool {
        match self.mode {
            SbsMode::OneChannel => self.ip,
            SbsMode::SixteenChannel => self.act != 0,
        }
    }

    /// Find the channel, if any, whose break should be started now.
    ///
    /// One-channel: `ON && RQ`.  Sixteen-channel: the highest
    /// priority (lowest numbered) requested channel, provided it
    /// outranks every active channel.
    pub fn eval(&self) -> Option<Channel> {
        if !self.on {
            return None;
        }
        match self.mode {
            SbsMode::OneChannel => {
                if self.rq {
                    Some(Channel::ZERO)
                } else {
                    None
                }
            }
            SbsMode::SixteenChannel => {
                let hi = self.req.trailing_zeros();
                if hi >= u32::from(Channel::COUNT) {
                    return None; // nothing requested
                }
                if hi < self.act.trailing_zeros() {
                    Some(Channel::new_truncated(hi as u8))
                } else {
                    None // an equal-or-higher-priority break is active
                }
            }
        }
    }

    /// Start the break on `channel`: the request becomes active.
    pub fn begin(&mut self, channel: Channel) {
        match self.mode {
            SbsMode::OneChannel => {
                self.rq = false;
                self.ip = true;
            }
            SbsMode::SixteenChannel => {
                self.req &= !channel.bit();
                self.act |= channel.bit();
            }
        }
    }

    /// Dismiss the break on `channel` (the debreak half of the
    /// dismiss-and-restore JMP encoding).
    pub fn dismiss(&mut self, channel: Channel) {
        match self.mode {
            SbsMode::OneChannel => {
                self.ip = false;
            }
            SbsMode::SixteenChannel => {
                self.act &= !channel.bit();
            }
        }
    }
}
