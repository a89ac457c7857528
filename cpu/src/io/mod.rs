//! The boundary between the processor and its peripheral devices.
//!
//! An IOT instruction reaching a device arrives through the
//! [`Device`] trait.  The device answers with an [`IotResult`]: the
//! new contents of the IO register, whether to skip the next
//! instruction, whether a completion pulse is being delivered right
//! now, whether an operation has been *started* whose completion will
//! arrive later, and optionally a forced stop.  The original
//! hardware's packed-integer return word carried the same facts in
//! magic bit positions; the struct keeps the contract without the bit
//! packing.
//!
//! Asynchronous completion is modelled by polling.  Each attached
//! device tells the manager when it next wants to be polled; the
//! machine's run loop services the poll queue between instructions.
//! A poll can raise a sequence-break channel and/or deliver a
//! completion pulse; that is the *only* path from a device back into
//! the processor, and the processor observes it at its next
//! evaluation point, never mid-instruction.
//!
//! Devices doing block transfers are handed the memory unit's raw
//! accessors by the machine; those transfers bypass the restrict-mode
//! check by design.

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

use tracing::{event, Level};

use base::collections::pq::KeyedReversePriorityQueue;
use base::prelude::*;

use crate::context::Context;
use crate::stop::StopCondition;

pub mod dev_clock;

/// What a device reports back from an IOT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IotResult {
    /// The new contents of the IO register.
    pub io: Word,
    /// Skip the next instruction.
    pub skip: bool,
    /// A completion pulse, delivered synchronously with this IOT.
    pub completion: bool,
    /// An operation was started whose completion pulse will arrive
    /// from a later poll.  Keeps the wait protocol's "any pulse
    /// pending?" test honest.
    pub start_pending: bool,
    /// Ask to be polled no later than this.  A parked device uses
    /// this to re-enter the poll queue when an IOT wakes it up.
    pub next_poll: Option<Duration>,
    /// Force the machine to stop with the given condition.
    pub stop: Option<StopCondition>,
}

impl IotResult {
    /// A result which leaves IO alone and signals nothing.
    pub fn unchanged(io: Word) -> IotResult {
        IotResult {
            io,
            skip: false,
            completion: false,
            start_pending: false,
            next_poll: None,
            stop: None,
        }
    }
}

/// What a device reports when polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevicePoll {
    /// Raise this sequence-break channel.
    pub raise: Option<Channel>,
    /// Deliver a completion pulse.
    pub completion: bool,
    /// When the device next wants to be polled; `None` parks it until
    /// the next IOT wakes it up.
    pub next_poll: Option<Duration>,
}

impl DevicePoll {
    pub fn idle() -> DevicePoll {
        DevicePoll {
            raise: None,
            completion: false,
            next_poll: None,
        }
    }
}

pub trait Device {
    fn name(&self) -> &str;

    /// Handle an IOT addressed to this device.  Called synchronously
    /// from instruction execution; must not block.
    fn iot(&mut self, ctx: &Context, inst: Instruction, io: Word) -> IotResult;

    /// Periodic service.  `ctx` carries the simulated time.
    fn poll(&mut self, ctx: &Context) -> DevicePoll;
}

/// Everything a round of polling produced.
#[derive(Debug, Default)]
pub struct PollOutcome {
    /// Channels to raise, in the order the polls reported them.
    pub raised: Vec<Channel>,
    /// At least one device delivered a completion pulse.
    pub completion: bool,
}

struct AttachedDevice {
    inner: Box<dyn Device>,
}

impl Debug for AttachedDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "<device: {}>", self.inner.name())
    }
}

/// Owns the device table and the poll queue.  Does not correspond to
/// a tangible piece of the original hardware; the real machine's
/// device selection was a wired-OR across the I/O bus.
#[derive(Debug)]
pub struct DeviceManager {
    devices: BTreeMap<DeviceCode, AttachedDevice>,
    poll_queue: KeyedReversePriorityQueue<DeviceCode, Duration>,
    /// Completion pulses outstanding, one bit per device code.
    pending: u64,
}

impl DeviceManager {
    pub fn new() -> DeviceManager {
        DeviceManager {
            devices: BTreeMap::new(),
            poll_queue: KeyedReversePriorityQueue::new(),
            pending: 0,
        }
    }

    pub fn attach(&mut self, ctx: &Context, code: DeviceCode, device: Box<dyn Device>) {
        event!(
            Level::INFO,
            "attaching device {} at code {}",
            device.name(),
            code
        );
        self.devices.insert(code, AttachedDevice { inner: device });
        // Poll the new device straight away so it can schedule itself.
        self.poll_queue.push(code, ctx.simulated_time);
    }

    pub fn is_attached(&self, code: DeviceCode) -> bool {
        self.devices.contains_key(&code)
    }

    /// Route an IOT to the addressed device.  Returns `None` when no
    /// device is attached at the code, which the processor treats as
    /// a reserved instruction.
    pub(crate) fn dispatch(
        &mut self,
        ctx: &Context,
        inst: Instruction,
        io: Word,
    ) -> Option<IotResult> {
        let code = inst.device_code();
        let attached = self.devices.get_mut(&code)?;
        let result = attached.inner.iot(ctx, inst, io);
        let bit = 1u64 << code.number();
        if result.start_pending {
            self.pending |= bit;
        }
        if result.completion {
            self.pending &= !bit;
        }
        if let Some(due) = result.next_poll {
            self.poll_queue.push(code, due);
        }
        Some(result)
    }

    /// True when some device owes a completion pulse.  The difference
    /// between "waiting" and "waiting forever".
    pub fn completion_pending(&self) -> bool {
        self.pending != 0
    }

    /// A simplified status word: the completion-pending mask,
    /// truncated to the register width.
    pub fn status_word(&self) -> Word {
        Word::from_truncated(self.pending as u32)
    }

    /// When the earliest poll is due, if any device wants one.
    pub fn next_poll_due(&self) -> Option<Duration> {
        self.poll_queue.peek().map(|(_, due)| *due)
    }

    /// Poll every device whose deadline has passed.
    pub fn poll_due(&mut self, ctx: &Context) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        while let Some((_, due)) = self.poll_queue.peek() {
            if *due > ctx.simulated_time {
                break;
            }
            let (code, _) = match self.poll_queue.pop() {
                Some(entry) => entry,
                None => break,
            };
            let attached = match self.devices.get_mut(&code) {
                Some(attached) => attached,
                None => continue,
            };
            let poll = attached.inner.poll(ctx);
            event!(Level::TRACE, "polled device {}: {:?}", code, poll);
            if let Some(channel) = poll.raise {
                outcome.raised.push(channel);
            }
            if poll.completion {
                outcome.completion = true;
                self.pending &= !(1u64 << code.number());
            }
            if let Some(next) = poll.next_poll {
                self.poll_queue.push(code, next);
            }
        }
        outcome
    }
}

impl Default for DeviceManager {
    fn default() -> DeviceManager {
        Self::new()
    }
}
