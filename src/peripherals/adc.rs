//! A/D converter sequencer (80C552)
//!
//! Setting ADCON.ADCS starts a conversion of the channel in AADR2:AADR0.
//! After `CONVERSION_CYCLES` machine cycles the 10-bit sample is split into
//! ADCH (bits 9-2) and ADCON bits 7:6 (bits 1-0), ADCI is set and ADCS
//! cleared.

use tracing::debug;

use crate::memory::Memory;
use crate::sfr::addr;

pub const CONVERSION_CYCLES: u32 = 50;
pub const CHANNELS: usize = 8;

/// ADCON bits
pub mod adcon {
    pub const ADEX: u8 = 1 << 5;
    pub const ADCI: u8 = 1 << 4;
    pub const ADCS: u8 = 1 << 3;
    pub const CHANNEL: u8 = 0x07;
}

#[derive(Debug, Clone)]
pub struct Adc {
    /// Cycles left in the running conversion, 0 when idle
    remaining: u32,
    /// Host-supplied 10-bit samples
    inputs: [u16; CHANNELS],
}

impl Adc {
    pub fn new() -> Self {
        Self {
            remaining: 0,
            inputs: [0; CHANNELS],
        }
    }

    /// Abort any conversion; inputs are external and survive
    pub fn reset(&mut self) {
        self.remaining = 0;
    }

    pub fn set_input(&mut self, channel: usize, value: u16) {
        if let Some(slot) = self.inputs.get_mut(channel) {
            *slot = value & 0x3FF;
        }
    }

    pub fn input(&self, channel: usize) -> u16 {
        self.inputs.get(channel).copied().unwrap_or(0)
    }

    pub fn is_busy(&self) -> bool {
        self.remaining > 0
    }

    /// ADCS went from 0 to 1
    pub fn start(&mut self) {
        self.remaining = CONVERSION_CYCLES;
    }

    /// Advance by one machine cycle, returning true when a conversion completes
    pub fn tick(&mut self, mem: &mut Memory) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        if self.remaining > 0 {
            return false;
        }

        let control = mem.sfr(addr::ADCON);
        let channel = (control & adcon::CHANNEL) as usize;
        let sample = self.inputs[channel];
        mem.set_sfr(addr::ADCH, (sample >> 2) as u8);
        let low = ((sample & 0x03) as u8) << 6;
        mem.set_sfr(
            addr::ADCON,
            (control & (adcon::ADEX | adcon::CHANNEL)) | low | adcon::ADCI,
        );
        debug!(channel, sample, "ADC conversion complete");
        true
    }
}

impl Default for Adc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;
    use crate::sfr::RegisterMap;

    #[test]
    fn test_conversion_takes_fifty_cycles() {
        let mut mem = Memory::new(RegisterMap::for_variant(Variant::C552));
        let mut adc = Adc::new();
        adc.set_input(5, 0x2B7);
        mem.set_sfr(addr::ADCON, adcon::ADCS | 5);
        adc.start();

        for _ in 0..CONVERSION_CYCLES - 1 {
            assert!(!adc.tick(&mut mem));
        }
        assert!(adc.is_busy());
        assert!(adc.tick(&mut mem));
        assert!(!adc.is_busy());

        assert_eq!(mem.sfr(addr::ADCH), 0xAD);
        let control = mem.sfr(addr::ADCON);
        assert_eq!(control >> 6, 0x03);
        assert_ne!(control & adcon::ADCI, 0);
        assert_eq!(control & adcon::ADCS, 0);
        assert_eq!(control & adcon::CHANNEL, 5);
    }

    #[test]
    fn test_idle_does_nothing() {
        let mut mem = Memory::new(RegisterMap::for_variant(Variant::C552));
        let mut adc = Adc::new();
        assert!(!adc.tick(&mut mem));
        assert_eq!(mem.sfr(addr::ADCON), 0);
    }

    #[test]
    fn test_inputs_are_ten_bit() {
        let mut adc = Adc::new();
        adc.set_input(0, 0xFFFF);
        assert_eq!(adc.input(0), 0x3FF);
        adc.set_input(9, 1);
        assert_eq!(adc.input(9), 0);
    }
}
