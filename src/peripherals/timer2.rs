//! Timer 2 capture/compare unit (80C552)
//!
//! - TM2CON.T2MS1:T2MS0 selects the clock: 00 off, 01 machine cycle,
//!   11 falling edges on T2 (P1.4); T2P1:T2P0 divides by 1, 2, 4 or 8
//! - TMH2:TML2 overflow sets T2OV; every low-byte overflow sets T2B0
//! - each count is compared with CM0-CM2, a match sets CMIn. A CM0 match
//!   sets the P4 bits enabled in STE, a CM1 match clears those enabled in RTE
//! - CTCON picks rising (CTPn) and/or falling (CTNn) edges on CTnI (P1.0-P1.3)
//!   that copy the timer into CTn and set CTIn

use crate::memory::Memory;
use crate::sfr::addr;

mod tm2con {
    pub const T2B0: u8 = 1 << 4;
    pub const PRESCALE_SHIFT: u8 = 2;
    pub const CLOCK: u8 = 0x03;
    pub const CLOCK_INTERNAL: u8 = 0x01;
    pub const CLOCK_EXTERNAL: u8 = 0x03;
}

/// TM2IR bits
pub mod tm2ir {
    pub const T2OV: u8 = 1 << 7;
    pub const fn cmi(n: u8) -> u8 {
        1 << (4 + n)
    }
    pub const fn cti(n: u8) -> u8 {
        1 << n
    }
}

/// P1.4 is the external clock input
const T2_PIN: u8 = 1 << 4;
/// P4 outputs driven by compare matches
const COMPARE_OUTPUTS: u8 = 0x3F;

#[derive(Debug, Clone)]
pub struct Timer2 {
    prescale: u8,
    last_p1: u8,
}

impl Timer2 {
    pub fn new() -> Self {
        Self {
            prescale: 0,
            last_p1: 0xFF,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advance by one machine cycle
    pub fn tick(&mut self, mem: &mut Memory) {
        let p1 = mem.sfr(addr::P1);
        let rising = !self.last_p1 & p1;
        let falling = self.last_p1 & !p1;
        self.last_p1 = p1;

        self.capture(mem, rising, falling);

        let control = mem.sfr(addr::TM2CON);
        let clocked = match control & tm2con::CLOCK {
            tm2con::CLOCK_INTERNAL => true,
            tm2con::CLOCK_EXTERNAL => falling & T2_PIN != 0,
            _ => false,
        };
        if !clocked {
            return;
        }

        let divider = 1u8 << ((control >> tm2con::PRESCALE_SHIFT) & 0x03);
        self.prescale += 1;
        if self.prescale < divider {
            return;
        }
        self.prescale = 0;

        self.count(mem);
    }

    fn capture(&self, mem: &mut Memory, rising: u8, falling: u8) {
        let edges = mem.sfr(addr::CTCON);
        if edges == 0 {
            return;
        }
        for n in 0..4u8 {
            let on_rise = edges & (1 << (2 * n)) != 0 && rising & (1 << n) != 0;
            let on_fall = edges & (1 << (2 * n + 1)) != 0 && falling & (1 << n) != 0;
            if !(on_rise || on_fall) {
                continue;
            }
            mem.set_sfr(addr::CTH0 + n, mem.sfr(addr::TMH2));
            mem.set_sfr(addr::CTL0 + n, mem.sfr(addr::TML2));
            mem.set_sfr(addr::TM2IR, mem.sfr(addr::TM2IR) | tm2ir::cti(n));
        }
    }

    fn count(&self, mem: &mut Memory) {
        let value = u16::from_be_bytes([mem.sfr(addr::TMH2), mem.sfr(addr::TML2)]).wrapping_add(1);
        let [high, low] = value.to_be_bytes();
        mem.set_sfr(addr::TMH2, high);
        mem.set_sfr(addr::TML2, low);

        if low == 0 {
            mem.set_sfr(addr::TM2CON, mem.sfr(addr::TM2CON) | tm2con::T2B0);
        }
        let mut flags = mem.sfr(addr::TM2IR);
        if value == 0 {
            flags |= tm2ir::T2OV;
        }

        for n in 0..3u8 {
            let compare = u16::from_be_bytes([mem.sfr(addr::CMH0 + n), mem.sfr(addr::CML0 + n)]);
            if compare != value {
                continue;
            }
            flags |= tm2ir::cmi(n);
            let p4 = mem.sfr(addr::P4);
            match n {
                0 => {
                    mem.set_sfr(addr::P4, p4 | (mem.sfr(addr::STE) & COMPARE_OUTPUTS));
                }
                1 => {
                    mem.set_sfr(addr::P4, p4 & !(mem.sfr(addr::RTE) & COMPARE_OUTPUTS));
                }
                _ => {}
            }
        }
        mem.set_sfr(addr::TM2IR, flags);
    }
}

impl Default for Timer2 {
    fn default() -> Self {
        Self::new()
    }
}
