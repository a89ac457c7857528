//! Stop conditions.
//!
//! Every way the simulated machine can stop running is described by a
//! [`StopCondition`], returned from the run loop with the register
//! file left exactly as it was at the point of stopping.  The stop
//! conditions fall into the categories the run loop cares about:
//!
//! - clean stops (a halt instruction, a breakpoint): fully resumable;
//! - guard-rail stops (XCT nesting, indirect-chain nesting): runaway
//!   software tripping a configurable bound, resumable after the
//!   bound is adjusted;
//! - protocol-violation stops (infinite I/O wait): a device/software
//!   interaction bug, recoverable only by external reset;
//! - reserved instruction: optionally a stop at all, depending on
//!   configuration (and redirected into the restrict-mode trap path
//!   when restrict mode is active, in which case it never appears
//!   here).
//!
//! Restrict-mode violations have no enumerator: they are internal to
//! the execution engine, which converts each one into a sequence-break
//! request and keeps running.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use base::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopCondition {
    /// The program executed a halt.
    Halt { pc: Address },

    /// Execution reached an address in the breakpoint set.
    Breakpoint { address: Address },

    /// A chain of XCT instructions exceeded the configured nesting
    /// bound.
    NestedXct { address: Address },

    /// An indirect-address chain exceeded the configured nesting
    /// bound.
    NestedIndirect { address: Address },

    /// An IOT with the wait bit set found no completion pulse pending
    /// anywhere in the I/O system: the wait could never end.
    IoWait { device: DeviceCode },

    /// A reserved operation code was decoded and the machine is
    /// configured to stop on those.
    ReservedInstruction { word: Word, address: Address },
}

impl Display for StopCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            StopCondition::Halt { pc } => write!(f, "halted at {pc}"),
            StopCondition::Breakpoint { address } => {
                write!(f, "breakpoint at {address}")
            }
            StopCondition::NestedXct { address } => {
                write!(f, "nested XCT's at {address}")
            }
            StopCondition::NestedIndirect { address } => {
                write!(f, "nested indirect addresses at {address}")
            }
            StopCondition::IoWait { device } => {
                write!(f, "infinite I/O wait on device {device}")
            }
            StopCondition::ReservedInstruction { word, address } => {
                write!(f, "reserved instruction {word:>06o} at {address}")
            }
        }
    }
}

impl Error for StopCondition {}

/// A fault raised inside instruction execution and resolved by the
/// main loop.  `Stop` surfaces to the caller; `Restricted` is the
/// internal restrict-mode violation code, converted into a
/// sequence-break request within the same dispatch cycle and never
/// surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecFault {
    Stop(StopCondition),
    Restricted,
}

impl From<StopCondition> for ExecFault {
    fn from(stop: StopCondition) -> ExecFault {
        ExecFault::Stop(stop)
    }
}

#[test]
fn test_stop_condition_display() {
    let s = StopCondition::NestedIndirect {
        address: Address::from_truncated(0o1234),
    };
    assert_eq!(s.to_string(), "nested indirect addresses at 001234");
    let s = StopCondition::IoWait {
        device: DeviceCode::new_truncated(0o30),
    };
    assert_eq!(s.to_string(), "infinite I/O wait on device 30");
}
