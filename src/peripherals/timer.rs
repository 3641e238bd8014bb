//! Timer 0 / Timer 1
//!
//! Counts live in TL0/TH0 and TL1/TH1; control comes from TMOD and TCON.
//!
//! TMOD layout (high nibble Timer 1, low nibble Timer 0):
//! - GATE: run only while the INTx pin is high
//! - C/T: count falling edges of the T0/T1 pin instead of machine cycles
//! - M1:M0: mode
//!
//! Modes:
//! - 0: 13-bit (TL bits 0-4 carry into TH)
//! - 1: 16-bit
//! - 2: 8-bit auto-reload of TL from TH
//! - 3: Timer 0 splits into TL0 (Timer 0 controls) and TH0 (TR1/TF1);
//!   Timer 1 keeps counting without raising TF1. Timer 1 in mode 3 holds.

use crate::memory::Memory;
use crate::sfr::addr;

/// TCON bits
pub mod tcon {
    pub const TF1: u8 = 1 << 7;
    pub const TR1: u8 = 1 << 6;
    pub const TF0: u8 = 1 << 5;
    pub const TR0: u8 = 1 << 4;
    pub const IE1: u8 = 1 << 3;
    pub const IT1: u8 = 1 << 2;
    pub const IE0: u8 = 1 << 1;
    pub const IT0: u8 = 1 << 0;
}

/// TMOD fields for one timer nibble
mod tmod {
    pub const GATE: u8 = 1 << 3;
    pub const COUNTER: u8 = 1 << 2;
    pub const MODE: u8 = 0x03;
}

/// P3 pins used by the timers
mod pins {
    pub const INT0: u8 = 1 << 2;
    pub const INT1: u8 = 1 << 3;
    pub const T0: u8 = 1 << 4;
    pub const T1: u8 = 1 << 5;
}

/// Overflow flags newly set during one machine cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerOverflow {
    pub timer0: bool,
    pub timer1: bool,
}

/// Timer 0 and Timer 1
#[derive(Debug, Clone)]
pub struct Timers {
    /// P3 level seen on the previous cycle, for counter-mode edges
    last_p3: u8,
}

impl Timers {
    pub fn new() -> Self {
        Self { last_p3: 0xFF }
    }

    pub fn reset(&mut self) {
        self.last_p3 = 0xFF;
    }

    /// Advance both timers by one machine cycle
    pub fn tick(&mut self, mem: &mut Memory) -> TimerOverflow {
        let tmod = mem.sfr(addr::TMOD);
        let tcon = mem.sfr(addr::TCON);
        let p3 = mem.sfr(addr::P3);
        let falling = self.last_p3 & !p3;
        self.last_p3 = p3;

        let t0 = tmod & 0x0F;
        let t1 = tmod >> 4;
        let clock0 = t0 & tmod::COUNTER == 0 || falling & pins::T0 != 0;
        let clock1 = t1 & tmod::COUNTER == 0 || falling & pins::T1 != 0;
        let run0 = tcon & tcon::TR0 != 0 && (t0 & tmod::GATE == 0 || p3 & pins::INT0 != 0);
        let run1 = tcon & tcon::TR1 != 0 && (t1 & tmod::GATE == 0 || p3 & pins::INT1 != 0);

        let mut overflow0 = false;
        let mut overflow1 = false;

        if t0 & tmod::MODE == 3 {
            if run0 && clock0 {
                overflow0 = count8(mem, addr::TL0);
            }
            // TH0 borrows TR1/TF1 and only sees machine cycles
            if tcon & tcon::TR1 != 0 {
                overflow1 = count8(mem, addr::TH0);
            }
            if t1 & tmod::MODE != 3 && clock1 {
                count(mem, addr::TL1, addr::TH1, t1 & tmod::MODE);
            }
        } else {
            if run0 && clock0 {
                overflow0 = count(mem, addr::TL0, addr::TH0, t0 & tmod::MODE);
            }
            if run1 && clock1 && t1 & tmod::MODE != 3 {
                overflow1 = count(mem, addr::TL1, addr::TH1, t1 & tmod::MODE);
            }
        }

        TimerOverflow {
            timer0: overflow0 && mem.write_bit(addr::TCON as u16, 5, true) != 0,
            timer1: overflow1 && mem.write_bit(addr::TCON as u16, 7, true) != 0,
        }
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new()
    }
}

/// Increment one 8-bit register, reporting wrap to zero
fn count8(mem: &mut Memory, reg: u8) -> bool {
    let value = mem.sfr(reg).wrapping_add(1);
    mem.set_sfr(reg, value);
    value == 0
}

/// Increment a TL/TH pair in mode 0, 1 or 2, reporting overflow
fn count(mem: &mut Memory, tl: u8, th: u8, mode: u8) -> bool {
    let low = mem.sfr(tl);
    let high = mem.sfr(th);
    match mode {
        0 => {
            let prescale = (low & 0x1F) + 1;
            if prescale <= 0x1F {
                mem.set_sfr(tl, (low & 0xE0) | prescale);
                return false;
            }
            mem.set_sfr(tl, low & 0xE0);
            count8(mem, th)
        }
        1 => {
            let value = u16::from_be_bytes([high, low]).wrapping_add(1);
            let [h, l] = value.to_be_bytes();
            mem.set_sfr(th, h);
            mem.set_sfr(tl, l);
            value == 0
        }
        _ => {
            let value = low.wrapping_add(1);
            if value == 0 {
                mem.set_sfr(tl, high);
                true
            } else {
                mem.set_sfr(tl, value);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;
    use crate::sfr::RegisterMap;

    fn setup(tmod_value: u8, tcon_value: u8) -> (Timers, Memory) {
        let mut mem = Memory::new(RegisterMap::for_variant(Variant::Mcs51));
        mem.set_sfr(addr::TMOD, tmod_value);
        mem.set_sfr(addr::TCON, tcon_value);
        (Timers::new(), mem)
    }

    #[test]
    fn test_stopped_timer_holds() {
        let (mut timers, mut mem) = setup(0x01, 0);
        for _ in 0..10 {
            timers.tick(&mut mem);
        }
        assert_eq!(mem.sfr(addr::TL0), 0);
    }

    #[test]
    fn test_mode0_thirteen_bit_carry() {
        let (mut timers, mut mem) = setup(0x00, tcon::TR0);
        mem.set_sfr(addr::TL0, 0x1F);
        mem.set_sfr(addr::TH0, 0x05);
        timers.tick(&mut mem);
        assert_eq!(mem.sfr(addr::TL0), 0x00);
        assert_eq!(mem.sfr(addr::TH0), 0x06);

        mem.set_sfr(addr::TL0, 0x1F);
        mem.set_sfr(addr::TH0, 0xFF);
        let overflow = timers.tick(&mut mem);
        assert!(overflow.timer0);
        assert_eq!(mem.sfr(addr::TCON) & tcon::TF0, tcon::TF0);
    }

    #[test]
    fn test_mode1_sixteen_bit() {
        let (mut timers, mut mem) = setup(0x01, tcon::TR0);
        mem.set_sfr(addr::TL0, 0xFF);
        mem.set_sfr(addr::TH0, 0x12);
        assert!(!timers.tick(&mut mem).timer0);
        assert_eq!(mem.read16("TIMER0").unwrap(), 0x1300);

        mem.set_sfr(addr::TL0, 0xFF);
        mem.set_sfr(addr::TH0, 0xFF);
        assert!(timers.tick(&mut mem).timer0);
        assert_eq!(mem.read16("TIMER0").unwrap(), 0x0000);
    }

    #[test]
    fn test_mode2_auto_reload() {
        let (mut timers, mut mem) = setup(0x20, tcon::TR1);
        mem.set_sfr(addr::TL1, 0xFE);
        mem.set_sfr(addr::TH1, 0x80);
        assert!(!timers.tick(&mut mem).timer1);
        assert!(timers.tick(&mut mem).timer1);
        assert_eq!(mem.sfr(addr::TL1), 0x80);
        assert_eq!(mem.sfr(addr::TH1), 0x80);
    }

    #[test]
    fn test_overflow_reported_only_when_newly_set() {
        let (mut timers, mut mem) = setup(0x02, tcon::TR0 | tcon::TF0);
        mem.set_sfr(addr::TL0, 0xFF);
        let overflow = timers.tick(&mut mem);
        assert!(!overflow.timer0);
        assert_ne!(mem.sfr(addr::TCON) & tcon::TF0, 0);
    }

    #[test]
    fn test_mode3_split() {
        // Timer 0 mode 3, Timer 1 mode 2 free running
        let (mut timers, mut mem) = setup(0x23, tcon::TR0 | tcon::TR1);
        mem.set_sfr(addr::TL0, 0xFF);
        mem.set_sfr(addr::TH0, 0xFF);
        mem.set_sfr(addr::TL1, 0xFF);
        mem.set_sfr(addr::TH1, 0x10);
        let overflow = timers.tick(&mut mem);
        assert!(overflow.timer0);
        assert!(overflow.timer1, "TH0 overflow raises TF1");
        assert_eq!(mem.sfr(addr::TL1), 0x10, "Timer 1 still reloads");

        // With TF1 owned by TH0, Timer 1 overflows stay silent
        mem.set_sfr(addr::TCON, tcon::TR0);
        mem.set_sfr(addr::TL1, 0xFF);
        let overflow = timers.tick(&mut mem);
        assert!(!overflow.timer1);
        assert_eq!(mem.sfr(addr::TCON) & tcon::TF1, 0);
    }

    #[test]
    fn test_gate_follows_int_pin() {
        let (mut timers, mut mem) = setup(0x09, tcon::TR0);
        mem.set_sfr(addr::P3, 0xFF & !pins::INT0);
        timers.tick(&mut mem);
        assert_eq!(mem.sfr(addr::TL0), 0);
        mem.set_sfr(addr::P3, 0xFF);
        timers.tick(&mut mem);
        assert_eq!(mem.sfr(addr::TL0), 1);
    }

    #[test]
    fn test_counter_mode_counts_falling_edges() {
        let (mut timers, mut mem) = setup(0x05, tcon::TR0);
        timers.tick(&mut mem);
        timers.tick(&mut mem);
        assert_eq!(mem.sfr(addr::TL0), 0);
        mem.set_sfr(addr::P3, 0xFF & !pins::T0);
        timers.tick(&mut mem);
        timers.tick(&mut mem);
        assert_eq!(mem.sfr(addr::TL0), 1);
    }
}
