//! The assembled machine: processor, memory, devices, breakpoints
//! and the run loop.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{event, Level};

use base::prelude::*;

use crate::clock::Clock;
use crate::context::Context;
use crate::control::{Cpu, CpuConfiguration};
use crate::io::{Device, DeviceManager};
use crate::memory::{MemoryConfiguration, MemoryUnit};
use crate::stop::StopCondition;

/// How far the simulated clock advances per instruction.  The real
/// machine took one or more 5-microsecond memory cycles per
/// instruction; one cycle is close enough for device pacing, which is
/// all the simulated clock is for.
const INSTRUCTION_TIME: Duration = Duration::from_micros(5);

pub struct Pdp1 {
    cpu: Cpu,
    mem: MemoryUnit,
    devices: DeviceManager,
    breakpoints: HashSet<Address>,
}

impl Pdp1 {
    pub fn new(cpu_config: CpuConfiguration, mem_config: &MemoryConfiguration) -> Pdp1 {
        Pdp1 {
            cpu: Cpu::new(cpu_config),
            mem: MemoryUnit::new(mem_config),
            devices: DeviceManager::new(),
            breakpoints: HashSet::new(),
        }
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn memory(&self) -> &MemoryUnit {
        &self.mem
    }

    pub fn memory_mut(&mut self) -> &mut MemoryUnit {
        &mut self.mem
    }

    pub fn devices_mut(&mut self) -> &mut DeviceManager {
        &mut self.devices
    }

    pub fn attach_device(&mut self, ctx: &Context, code: DeviceCode, device: Box<dyn Device>) {
        self.devices.attach(ctx, code, device);
    }

    pub fn add_breakpoint(&mut self, address: Address) {
        self.breakpoints.insert(address);
    }

    pub fn remove_breakpoint(&mut self, address: Address) {
        self.breakpoints.remove(&address);
    }

    /// Reset the processor to its architectural defaults.  Memory
    /// persists.
    pub fn reset(&mut self) {
        self.cpu.reset();
    }

    /// Deposit consecutive words starting at `start`.  This is the
    /// path a loader uses before execution begins; it bypasses the
    /// protected access helpers like any other DMA-style transfer.
    pub fn load(&mut self, start: Address, words: &[Word]) {
        let mut addr = start;
        for word in words {
            self.mem.write_raw(addr, *word);
            addr = Address::from_truncated(addr.bits() + 1);
        }
    }

    /// Service the device poll queue and hand anything it produced to
    /// the processor.
    fn service_devices(&mut self, ctx: &Context) {
        match self.devices.next_poll_due() {
            Some(due) if due <= ctx.simulated_time => {
                let outcome = self.devices.poll_due(ctx);
                for channel in outcome.raised {
                    self.cpu.raise_break(channel);
                }
                if outcome.completion {
                    self.cpu.deliver_completion();
                }
            }
            _ => {}
        }
    }

    /// One machine iteration: service devices, then let the processor
    /// take a step (sequence-break entry or one instruction).
    /// Breakpoints are not consulted; single-stepping walks through
    /// them.
    pub fn step(&mut self, ctx: &Context) -> Result<(), StopCondition> {
        self.service_devices(ctx);
        self.cpu.step(ctx, &mut self.mem, &mut self.devices)
    }

    /// Run until something stops the machine, or until `limit`
    /// iterations have been executed (`None` is returned in that
    /// case).  A breakpoint at the starting address does not fire on
    /// the first iteration, so a stopped machine can be resumed.
    pub fn run(&mut self, clock: &mut dyn Clock, limit: Option<u64>) -> Option<StopCondition> {
        let mut first = true;
        let mut steps: u64 = 0;
        loop {
            if let Some(limit) = limit {
                if steps >= limit {
                    return None;
                }
            }
            let now = clock.now();
            let ctx = Context::new(now, now);
            if !first && !self.cpu.break_pending() {
                let pc = self.cpu.registers().pc;
                if self.breakpoints.contains(&pc) {
                    event!(Level::INFO, "breakpoint at {}", pc);
                    return Some(StopCondition::Breakpoint { address: pc });
                }
            }
            first = false;
            if let Err(stop) = self.step(&ctx) {
                event!(Level::INFO, "machine stopped: {}", stop);
                return Some(stop);
            }
            clock.consume(&INSTRUCTION_TIME);
            steps += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Pdp1;
    use crate::clock::BasicClock;
    use crate::context::Context;
    use crate::control::CpuConfiguration;
    use crate::io::dev_clock::IntervalClock;
    use crate::memory::MemoryConfiguration;
    use crate::stop::StopCondition;
    use base::prelude::*;
    use std::time::Duration;

    fn make_machine() -> Pdp1 {
        Pdp1::new(
            CpuConfiguration::default(),
            &MemoryConfiguration::default(),
        )
    }

    #[test]
    fn test_run_until_halt() {
        let mut machine = make_machine();
        machine.load(
            Address::from_truncated(0o100),
            &[
                encode(Opcode::Law, false, 0o42),
                encode(Opcode::Opr, false, 0o400), // hlt
            ],
        );
        machine.cpu_mut().registers_mut().pc = Address::from_truncated(0o100);
        let mut clock = BasicClock::new();
        let stop = machine.run(&mut clock, None);
        assert_eq!(
            stop,
            Some(StopCondition::Halt {
                pc: Address::from_truncated(0o102)
            })
        );
        assert_eq!(machine.cpu().registers().ac, Word::from_truncated(0o42));
    }

    #[test]
    fn test_breakpoint_fires_and_resumes() {
        let mut machine = make_machine();
        // A two-instruction loop; break on its second word.
        machine.load(
            Address::from_truncated(0o100),
            &[
                encode(Opcode::Idx, false, 0o200),
                encode(Opcode::Jmp, false, 0o100),
            ],
        );
        machine.cpu_mut().registers_mut().pc = Address::from_truncated(0o100);
        machine.add_breakpoint(Address::from_truncated(0o101));
        let mut clock = BasicClock::new();
        assert_eq!(
            machine.run(&mut clock, None),
            Some(StopCondition::Breakpoint {
                address: Address::from_truncated(0o101)
            })
        );
        // Resuming executes the breakpointed instruction and comes
        // round the loop to the same place.
        assert_eq!(
            machine.run(&mut clock, None),
            Some(StopCondition::Breakpoint {
                address: Address::from_truncated(0o101)
            })
        );
        assert_eq!(
            machine.memory().read_raw(Address::from_truncated(0o200)),
            Word::from_truncated(2)
        );
    }

    #[test]
    fn test_limit_returns_no_stop() {
        let mut machine = make_machine();
        machine.load(
            Address::from_truncated(0o100),
            &[encode(Opcode::Jmp, false, 0o100)],
        );
        machine.cpu_mut().registers_mut().pc = Address::from_truncated(0o100);
        let mut clock = BasicClock::new();
        assert_eq!(machine.run(&mut clock, Some(10)), None);
    }

    #[test]
    fn test_clock_interrupt_reaches_handler() {
        let mut machine = make_machine();
        let channel = Channel::new_truncated(5);
        machine.cpu_mut().sequence_breaks().set_on(true);
        machine.cpu_mut().sequence_breaks().enable_channel(channel);
        let ctx = Context::new(Duration::ZERO, Duration::ZERO);
        machine.attach_device(
            &ctx,
            DeviceCode::new_truncated(0o32),
            Box::new(IntervalClock::new(channel, Duration::from_micros(50))),
        );
        // Start the clock, then idle in a loop; the handler (at the
        // channel's status block + 3) halts.
        machine.load(
            Address::from_truncated(0o100),
            &[
                encode(Opcode::Iot, false, 0o4032), // start the clock
                encode(Opcode::Jmp, false, 0o101),  // idle loop
            ],
        );
        let handler = Address::from_truncated((5 << 2) + 3);
        machine.load(handler, &[encode(Opcode::Opr, false, 0o400)]);
        machine.cpu_mut().registers_mut().pc = Address::from_truncated(0o100);
        let mut clock = BasicClock::new();
        let stop = machine.run(&mut clock, Some(10_000));
        assert_eq!(
            stop,
            Some(StopCondition::Halt {
                pc: Address::from_truncated((5 << 2) + 4)
            })
        );
    }
}

