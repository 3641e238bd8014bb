//! Serial port S0 (UART)
//!
//! Bit timing is not modeled: a byte written to S0BUF is handed to the
//! external collaborator after a fixed number of machine cycles, then TI is
//! set. Received bytes are pushed in by the host.

use crate::bus::ExternalBus;
use crate::memory::Memory;
use crate::sfr::addr;

/// S0CON bits
pub mod s0con {
    pub const REN: u8 = 1 << 4;
    pub const TI: u8 = 1 << 1;
    pub const RI: u8 = 1 << 0;
}

#[derive(Debug, Clone)]
pub struct Serial {
    cycles_per_byte: u32,
    /// Cycles left for the byte being sent, 0 when idle
    remaining: u32,
    shifting: u8,
}

impl Serial {
    pub fn new(cycles_per_byte: u32) -> Self {
        Self {
            cycles_per_byte: cycles_per_byte.max(1),
            remaining: 0,
            shifting: 0,
        }
    }

    pub fn reset(&mut self) {
        self.remaining = 0;
    }

    pub fn is_transmitting(&self) -> bool {
        self.remaining > 0
    }

    /// S0BUF was written
    pub fn start_transmit(&mut self, byte: u8) {
        self.shifting = byte;
        self.remaining = self.cycles_per_byte;
    }

    /// Deliver a byte from the outside world; dropped unless REN is set
    pub fn receive(&mut self, mem: &mut Memory, byte: u8) -> bool {
        let control = mem.sfr(addr::S0CON);
        if control & s0con::REN == 0 {
            return false;
        }
        mem.set_sfr(addr::S0BUF, byte);
        mem.set_sfr(addr::S0CON, control | s0con::RI);
        true
    }

    pub fn tick(&mut self, mem: &mut Memory, external: &mut dyn ExternalBus) {
        if self.remaining == 0 {
            return;
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            external.serial_transmit(self.shifting);
            mem.set_sfr(addr::S0CON, mem.sfr(addr::S0CON) | s0con::TI);
        }
    }
}
