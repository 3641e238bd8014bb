//! Watchdog timer T3 (80C552)
//!
//! An 11-bit prescaler divides the machine-cycle clock while the active-low
//! EW pin is low. Each prescaler overflow increments T3; T3 wrapping to zero
//! resets the chip.
//!
//! T3 can only be written while EW is high and PCON.WLE is set. A write
//! clears WLE and restarts the prescaler.

use tracing::{debug, info};

use crate::memory::Memory;
use crate::sfr::addr;

/// Machine cycles per T3 increment
pub const PRESCALER_PERIOD: u16 = 1 << 11;

/// PCON watchdog load enable
pub const WLE: u8 = 1 << 4;

#[derive(Debug, Clone)]
pub struct Watchdog {
    prescaler: u16,
    /// EW pin level, high holds the watchdog off
    ew: bool,
}

impl Watchdog {
    pub fn new(ew: bool) -> Self {
        Self { prescaler: 0, ew }
    }

    /// Chip reset restarts the prescaler; the EW pin is external
    pub fn reset(&mut self) {
        self.prescaler = 0;
    }

    pub fn ew_pin(&self) -> bool {
        self.ew
    }

    pub fn set_ew_pin(&mut self, level: bool) {
        self.ew = level;
    }

    pub fn is_running(&self) -> bool {
        !self.ew
    }

    pub fn prescaler(&self) -> u16 {
        self.prescaler
    }

    /// A T3 write is accepted only with the watchdog off and WLE set
    pub fn accepts_load(&self, mem: &Memory) -> bool {
        self.ew && mem.sfr(addr::PCON) & WLE != 0
    }

    /// Finish an accepted T3 write
    pub fn feed(&mut self, mem: &mut Memory) {
        self.prescaler = 0;
        mem.set_sfr(addr::PCON, mem.sfr(addr::PCON) & !WLE);
        debug!("watchdog fed");
    }

    /// Advance by one machine cycle, returning true when the chip must reset
    pub fn tick(&mut self, mem: &mut Memory) -> bool {
        if self.ew {
            return false;
        }
        self.prescaler += 1;
        if self.prescaler < PRESCALER_PERIOD {
            return false;
        }
        self.prescaler = 0;

        let t3 = mem.sfr(addr::T3).wrapping_add(1);
        mem.set_sfr(addr::T3, t3);
        if t3 == 0 {
            info!("watchdog overflow, resetting");
            return true;
        }
        false
    }
}
