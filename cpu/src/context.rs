//! The context in which the emulator performs a single operation.
//!
//! The emulator mostly cares about how much time would have elapsed
//! for the PDP-1 it is emulating; that is what device poll deadlines
//! are measured against.  The caller may also track actual elapsed
//! wall-clock time (to pace the simulation against real time).  To
//! avoid confusing these related quantities of the same type, both
//! travel together in a struct with very clear names.
use core::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub simulated_time: Duration,
    pub real_elapsed_time: Duration,
}

impl Context {
    #[must_use]
    pub fn new(simulated_time: Duration, real_elapsed_time: Duration) -> Context {
        Context {
            simulated_time,
            real_elapsed_time,
        }
    }
}
