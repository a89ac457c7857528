//! An interval clock.
//!
//! This is the one peripheral carried in the simulator core itself:
//! the smallest device that exercises the whole interrupt contract
//! (IOT control, poll scheduling, sequence-break raise, completion
//! pulse).  Each time the programmed interval elapses the clock
//! counts a tick, raises its sequence-break channel and delivers a
//! completion pulse.
//!
//! IOT sub-commands, selected by instruction bits:
//!
//! - bit 11 (0o4000): start the clock
//! - bit 10 (0o2000): stop the clock
//! - in every case the tick count is returned in IO

use std::time::Duration;

use base::prelude::*;

use crate::context::Context;
use crate::io::{Device, DevicePoll, IotResult};

pub struct IntervalClock {
    channel: Channel,
    period: Duration,
    running: bool,
    next_fire: Duration,
    ticks: Word,
}

impl IntervalClock {
    pub fn new(channel: Channel, period: Duration) -> IntervalClock {
        IntervalClock {
            channel,
            period,
            running: false,
            next_fire: Duration::ZERO,
            ticks: Word::ZERO,
        }
    }

    pub fn ticks(&self) -> Word {
        self.ticks
    }
}

impl Device for IntervalClock {
    fn name(&self) -> &str {
        "interval clock"
    }

    fn iot(&mut self, ctx: &Context, inst: Instruction, _io: Word) -> IotResult {
        let bits = inst.bits();
        if bits & 0o4000 != 0 {
            self.running = true;
            self.next_fire = ctx.simulated_time + self.period;
        }
        if bits & 0o2000 != 0 {
            self.running = false;
        }
        IotResult {
            start_pending: self.running,
            next_poll: if self.running {
                Some(self.next_fire)
            } else {
                None
            },
            ..IotResult::unchanged(self.ticks)
        }
    }

    fn poll(&mut self, ctx: &Context) -> DevicePoll {
        if !self.running {
            return DevicePoll::idle();
        }
        if ctx.simulated_time < self.next_fire {
            return DevicePoll {
                raise: None,
                completion: false,
                next_poll: Some(self.next_fire),
            };
        }
        self.ticks = self.ticks.ones_add(Word::ONE);
        self.next_fire = ctx.simulated_time + self.period;
        DevicePoll {
            raise: Some(self.channel),
            completion: true,
            next_poll: Some(self.next_fire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IntervalClock;
    use crate::context::Context;
    use crate::io::Device;
    use base::prelude::*;
    use std::time::Duration;

    fn ctx_at(micros: u64) -> Context {
        Context::new(Duration::from_micros(micros), Duration::from_micros(micros))
    }

    #[test]
    fn test_clock_raises_channel_each_period() {
        let mut clock = IntervalClock::new(Channel::new_truncated(5), Duration::from_micros(100));
        let start = Instruction::from(encode(Opcode::Iot, false, 0o4032));
        clock.iot(&ctx_at(0), start, Word::ZERO);

        // Not due yet.
        let poll = clock.poll(&ctx_at(50));
        assert_eq!(poll.raise, None);

        // Due: tick, raise, completion.
        let poll = clock.poll(&ctx_at(100));
        assert_eq!(poll.raise, Some(Channel::new_truncated(5)));
        assert!(poll.completion);
        assert_eq!(clock.ticks(), Word::ONE);
    }

    #[test]
    fn test_stopped_clock_goes_idle() {
        let mut clock = IntervalClock::new(Channel::ZERO, Duration::from_micros(100));
        let stop = Instruction::from(encode(Opcode::Iot, false, 0o2032));
        let result = clock.iot(&ctx_at(0), stop, Word::ZERO);
        assert!(!result.start_pending);
        assert_eq!(clock.poll(&ctx_at(500)).next_poll, None);
    }
}
