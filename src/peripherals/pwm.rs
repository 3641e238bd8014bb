//! Pulse width modulation outputs (80C552)
//!
//! PWMP divides the machine-cycle clock by PWMP + 1 and the divided clock
//! drives an 8-bit counter running 0-254. Output n is high while the
//! counter is at or above PWMn, so PWMn / 255 is the fraction of the period
//! the output spends low.

use crate::memory::Memory;
use crate::sfr::addr;

/// Counter steps per PWM period
pub const PERIOD: u8 = 255;

#[derive(Debug, Clone, Default)]
pub struct Pwm {
    prescaler: u16,
    counter: u8,
}

impl Pwm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn counter(&self) -> u8 {
        self.counter
    }

    pub fn tick(&mut self, mem: &Memory) {
        self.prescaler += 1;
        if self.prescaler <= mem.sfr(addr::PWMP) as u16 {
            return;
        }
        self.prescaler = 0;
        self.counter = if self.counter + 1 >= PERIOD { 0 } else { self.counter + 1 };
    }

    /// Level of output `channel` (0 or 1)
    pub fn output(&self, mem: &Memory, channel: usize) -> bool {
        let duty = match channel {
            0 => mem.sfr(addr::PWM0),
            _ => mem.sfr(addr::PWM1),
        };
        self.counter >= duty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;
    use crate::sfr::RegisterMap;

    #[test]
    fn test_counter_wraps_at_period() {
        let mem = Memory::new(RegisterMap::for_variant(Variant::C552));
        let mut pwm = Pwm::new();
        for _ in 0..PERIOD as u32 - 1 {
            pwm.tick(&mem);
        }
        assert_eq!(pwm.counter(), 254);
        pwm.tick(&mem);
        assert_eq!(pwm.counter(), 0);
    }

    #[test]
    fn test_prescaler_divides() {
        let mut mem = Memory::new(RegisterMap::for_variant(Variant::C552));
        mem.set_sfr(addr::PWMP, 3);
        let mut pwm = Pwm::new();
        for _ in 0..8 {
            pwm.tick(&mem);
        }
        assert_eq!(pwm.counter(), 2);
    }

    #[test]
    fn test_duty_cycle() {
        let mut mem = Memory::new(RegisterMap::for_variant(Variant::C552));
        mem.set_sfr(addr::PWM0, 64);
        let mut pwm = Pwm::new();
        let low = (0..PERIOD)
            .filter(|_| {
                let level = pwm.output(&mem, 0);
                pwm.tick(&mem);
                !level
            })
            .count();
        assert_eq!(low, 64);
        assert!(pwm.output(&mem, 1), "PWM1 = 0 is always high");
    }
}
