//! On-chip peripherals
//!
//! Every unit keeps its architectural state in the SFRs and only private
//! counters (prescalers, countdowns, pin history) in its own struct:
//! - `interrupt`: source table and arbitration
//! - `timer`: Timer 0 / Timer 1
//! - `serial`: UART S0
//! - `timer2`: T2 capture/compare (80C552)
//! - `watchdog`: T3 watchdog (80C552)
//! - `adc`: A/D converter sequencer (80C552)
//! - `pwm`: PWM outputs (80C552)
//! - `i2c`: SIO1 I2C engine (80C552)

pub mod adc;
pub mod i2c;
pub mod interrupt;
pub mod pwm;
pub mod serial;
pub mod timer;
pub mod timer2;
pub mod watchdog;

pub use adc::Adc;
pub use i2c::{I2cCommand, I2cEngine, I2cStatus};
pub use interrupt::{InterruptController, InterruptSource};
pub use pwm::Pwm;
pub use serial::Serial;
pub use timer::Timers;
pub use timer2::Timer2;
pub use watchdog::Watchdog;

use crate::bus::ExternalBus;
use crate::config::{SimConfig, Variant};
use crate::error::ConfigError;
use crate::memory::Memory;
use crate::sfr::addr;
use interrupt::vectors;
use timer::tcon;

/// External interrupt pins on P3
const INT0_PIN: u8 = 1 << 2;
const INT1_PIN: u8 = 1 << 3;

/// What one machine cycle produced for the CPU
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Timer vectors whose flag was newly set while unmasked
    pub vectors: [Option<u16>; 2],
    /// Watchdog overflow
    pub reset: bool,
}

impl TickEvents {
    pub fn vectors(&self) -> impl Iterator<Item = u16> + '_ {
        self.vectors.iter().flatten().copied()
    }
}

/// All on-chip peripherals of one chip
#[derive(Debug, Clone)]
pub struct Peripherals {
    variant: Variant,
    pub interrupt: InterruptController,
    pub timers: Timers,
    pub serial: Serial,
    pub timer2: Timer2,
    pub watchdog: Watchdog,
    pub adc: Adc,
    pub pwm: Pwm,
    pub i2c: I2cEngine,
    /// P3 level on the previous cycle, for INT0/INT1 edges
    last_p3: u8,
}

impl Peripherals {
    pub fn new(config: &SimConfig, memory: &Memory) -> Result<Self, ConfigError> {
        Ok(Self {
            variant: config.variant,
            interrupt: InterruptController::for_map(memory.map())?,
            timers: Timers::new(),
            serial: Serial::new(config.serial_cycles_per_byte),
            timer2: Timer2::new(),
            watchdog: Watchdog::new(config.ew_pin),
            adc: Adc::new(),
            pwm: Pwm::new(),
            i2c: I2cEngine::new(),
            last_p3: 0xFF,
        })
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Reset private counters; SFRs are reset by the memory model
    pub fn reset(&mut self) {
        self.timers.reset();
        self.serial.reset();
        self.timer2.reset();
        self.watchdog.reset();
        self.adc.reset();
        self.pwm.reset();
        self.i2c.reset();
        self.last_p3 = 0xFF;
    }

    /// Advance every unit by one machine cycle
    pub fn tick(&mut self, mem: &mut Memory, external: &mut dyn ExternalBus) -> TickEvents {
        let mut events = TickEvents::default();

        self.sample_external_interrupts(mem);

        let overflow = self.timers.tick(mem);
        if overflow.timer0 && self.unmasked(vectors::TIMER0, mem) {
            events.vectors[0] = Some(vectors::TIMER0);
        }
        if overflow.timer1 && self.unmasked(vectors::TIMER1, mem) {
            events.vectors[1] = Some(vectors::TIMER1);
        }

        self.serial.tick(mem, external);

        if self.variant.has_extended_peripherals() {
            self.timer2.tick(mem);
            self.adc.tick(mem);
            self.pwm.tick(mem);
            self.i2c.tick(mem, external);
            events.reset = self.watchdog.tick(mem);
        }

        events
    }

    fn unmasked(&self, vector: u16, mem: &Memory) -> bool {
        self.interrupt.globally_enabled(mem) && self.interrupt.is_requesting(vector, mem)
    }

    /// Latch IE0/IE1 from the INT pins: falling edges with ITx set,
    /// otherwise the inverted pin level
    fn sample_external_interrupts(&mut self, mem: &mut Memory) {
        let p3 = mem.sfr(addr::P3);
        let falling = self.last_p3 & !p3;
        self.last_p3 = p3;

        let control = mem.sfr(addr::TCON);
        let mut next = control;
        for (pin, edge_mode, flag) in [
            (INT0_PIN, tcon::IT0, tcon::IE0),
            (INT1_PIN, tcon::IT1, tcon::IE1),
        ] {
            if control & edge_mode != 0 {
                if falling & pin != 0 {
                    next |= flag;
                }
            } else if p3 & pin == 0 {
                next |= flag;
            } else {
                next &= !flag;
            }
        }
        if next != control {
            mem.set_sfr(addr::TCON, next);
        }
    }

    /// Level of a PWM output pin
    pub fn pwm_output(&self, mem: &Memory, channel: usize) -> bool {
        self.pwm.output(mem, channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::FlatBus;
    use crate::sfr::RegisterMap;

    fn setup(variant: Variant) -> (Peripherals, Memory, FlatBus) {
        let config = SimConfig::for_variant(variant);
        let mem = Memory::new(RegisterMap::for_variant(variant));
        let peripherals = Peripherals::new(&config, &mem).unwrap();
        (peripherals, mem, FlatBus::new(Vec::new()))
    }

    #[test]
    fn test_timer_overflow_reports_vector_only_when_unmasked() {
        let (mut p, mut mem, mut ext) = setup(Variant::C552);
        mem.set_sfr(addr::TMOD, 0x02);
        mem.set_sfr(addr::TCON, tcon::TR0);
        mem.set_sfr(addr::TL0, 0xFF);
        let events = p.tick(&mut mem, &mut ext);
        assert_eq!(events.vectors().count(), 0);

        mem.set_sfr(addr::TCON, tcon::TR0);
        mem.set_sfr(addr::TL0, 0xFF);
        mem.set_sfr(addr::IEN0, 0x82);
        let events = p.tick(&mut mem, &mut ext);
        assert_eq!(events.vectors().collect::<Vec<_>>(), vec![vectors::TIMER0]);
    }

    #[test]
    fn test_external_interrupt_edge_and_level() {
        let (mut p, mut mem, mut ext) = setup(Variant::Mcs51);
        // level mode follows the pin
        mem.set_sfr(addr::P3, 0xFF & !INT0_PIN);
        p.tick(&mut mem, &mut ext);
        assert_ne!(mem.sfr(addr::TCON) & tcon::IE0, 0);
        mem.set_sfr(addr::P3, 0xFF);
        p.tick(&mut mem, &mut ext);
        assert_eq!(mem.sfr(addr::TCON) & tcon::IE0, 0);

        // edge mode latches
        mem.set_sfr(addr::TCON, tcon::IT1);
        mem.set_sfr(addr::P3, 0xFF & !INT1_PIN);
        p.tick(&mut mem, &mut ext);
        mem.set_sfr(addr::P3, 0xFF);
        p.tick(&mut mem, &mut ext);
        assert_ne!(mem.sfr(addr::TCON) & tcon::IE1, 0);
    }

    #[test]
    fn test_base_variant_skips_extended_units() {
        let (mut p, mut mem, mut ext) = setup(Variant::Mcs51);
        p.watchdog.set_ew_pin(false);
        for _ in 0..(watchdog::PRESCALER_PERIOD as u32 * 300) {
            assert!(!p.tick(&mut mem, &mut ext).reset);
        }
    }

    #[test]
    fn test_watchdog_reset_event() {
        let (mut p, mut mem, mut ext) = setup(Variant::C552);
        p.watchdog.set_ew_pin(false);
        mem.set_sfr(addr::T3, 0xFF);
        let resets = (0..watchdog::PRESCALER_PERIOD)
            .filter(|_| p.tick(&mut mem, &mut ext).reset)
            .count();
        assert_eq!(resets, 1);
    }
}
