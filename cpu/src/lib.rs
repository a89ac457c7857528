//! This crate emulates the PDP-1's central processor: the
//! fetch/decode/execute loop, effective-address resolution, the
//! sequence-break (interrupt) system, the PDP-1D restrict-mode
//! protection, and the IOT boundary to peripheral devices.

mod clock;
mod context;
mod control;
mod io;
mod memory;
mod pdp1;
mod sbs;
mod stop;

pub use clock::{BasicClock, Clock};
pub use context::Context;
pub use control::restrict::{BankVariant, RestrictMode, TrapCause, TRAP_CHANNEL};
pub use control::{Cpu, CpuConfiguration, MulDivMode, Registers, PF_FLAGS, PF_LINK, PF_RING};
pub use io::dev_clock::IntervalClock;
pub use io::{Device, DeviceManager, DevicePoll, IotResult, PollOutcome};
pub use memory::{MemoryConfiguration, MemoryUnit, FIELD_WORDS, MAX_MEMORY_WORDS};
pub use pdp1::Pdp1;
pub use sbs::{SbsMode, SequenceBreaks};
pub use stop::StopCondition;
