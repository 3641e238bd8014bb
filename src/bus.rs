//! System bus
//!
//! Routes every access the CPU or the host makes:
//! - internal RAM and SFRs go to `Memory` through the write pipeline below
//! - code memory (MOVC) and external data memory (MOVX) go to the
//!   `ExternalBus` collaborator
//!
//! Write pipeline for the internal address space:
//! 1. gate: T3 loads need EW high and PCON.WLE; S0BUF writes start a transmission
//! 2. store: PSW.P is forced to the parity of ACC; an unchanged byte ends
//!    the write here
//! 3. side effects: an ACC write stores the new PSW.P, ADCON.ADCS rising
//!    starts a conversion
//! 4. notifications: register observers, flipped bits, 16-bit pairs, once
//!    per changed register (ACC, then PSW when P flipped)

use tracing::warn;

use crate::config::SimConfig;
use crate::error::ConfigError;
use crate::memory::Memory;
use crate::peripherals::adc::adcon;
use crate::peripherals::{I2cCommand, Peripherals, TickEvents};
use crate::sfr::{addr, BitLocation, RegisterMap};

/// Size of the code and external data address spaces
pub const EXTERNAL_SPACE: usize = 0x10000;

/// Memory and devices outside the chip, supplied by the host
///
/// Calls are synchronous and must not re-enter the simulator.
pub trait ExternalBus {
    /// Code memory byte (MOVC)
    fn code_byte(&mut self, address: u16) -> u8;

    /// External data memory byte (MOVX read)
    fn ram_byte(&mut self, address: u16) -> u8;

    /// External data memory write (MOVX write)
    fn set_ram_byte(&mut self, address: u16, value: u8);

    /// Resolve one I2C protocol step
    ///
    /// `data` carries S1DAT for address and write phases and receives the
    /// byte for read phases. The return value is the slave's ACK.
    fn i2c_command(&mut self, _command: I2cCommand, _data: &mut u8) -> bool {
        false
    }

    /// Byte shifted out of the UART
    fn serial_transmit(&mut self, _byte: u8) {}
}

/// Plain ROM image plus 64KB of external RAM
#[derive(Debug, Clone)]
pub struct FlatBus {
    code: Vec<u8>,
    xram: Vec<u8>,
    transmitted: Vec<u8>,
}

impl FlatBus {
    pub fn new(code: Vec<u8>) -> Self {
        Self {
            code,
            xram: vec![0; EXTERNAL_SPACE],
            transmitted: Vec::new(),
        }
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn xram(&self) -> &[u8] {
        &self.xram
    }

    /// Bytes sent by the UART so far
    pub fn transmitted(&self) -> &[u8] {
        &self.transmitted
    }
}

impl ExternalBus for FlatBus {
    fn code_byte(&mut self, address: u16) -> u8 {
        self.code.get(address as usize).copied().unwrap_or(0xFF)
    }

    fn ram_byte(&mut self, address: u16) -> u8 {
        self.xram[address as usize]
    }

    fn set_ram_byte(&mut self, address: u16, value: u8) {
        self.xram[address as usize] = value;
    }

    fn serial_transmit(&mut self, byte: u8) {
        self.transmitted.push(byte);
    }
}

/// Memory, peripherals and the external collaborator of one chip
pub struct Bus {
    pub memory: Memory,
    pub peripherals: Peripherals,
    external: Box<dyn ExternalBus>,
}

impl Bus {
    pub fn new(config: &SimConfig, external: Box<dyn ExternalBus>) -> Result<Self, ConfigError> {
        let memory = Memory::new(RegisterMap::for_variant(config.variant));
        let peripherals = Peripherals::new(config, &memory)?;
        Ok(Self {
            memory,
            peripherals,
            external,
        })
    }

    pub fn map(&self) -> &'static RegisterMap {
        self.memory.map()
    }

    /// Chip reset: registers to reset values, peripheral counters cleared
    pub fn reset(&mut self) {
        self.memory.reset();
        self.peripherals.reset();
        self.store_parity();
    }

    pub fn external(&mut self) -> &mut dyn ExternalBus {
        &mut *self.external
    }

    pub fn replace_external(&mut self, external: Box<dyn ExternalBus>) {
        self.external = external;
    }

    // ========== Internal address space ==========

    pub fn read_byte(&self, address: u16) -> u8 {
        self.memory.read_byte(address)
    }

    /// Write through the full pipeline, returning the mask of changed bits
    pub fn write_byte(&mut self, address: u16, value: u8) -> u8 {
        let extended = self.peripherals.variant().has_extended_peripherals();
        if address == addr::T3 as u16 && extended {
            if !self.peripherals.watchdog.accepts_load(&self.memory) {
                warn!(value, "T3 write ignored, watchdog load not enabled");
                return 0;
            }
            self.peripherals.watchdog.feed(&mut self.memory);
        } else if address == addr::S0BUF as u16 {
            self.peripherals.serial.start_transmit(value);
        }

        let value = if address == addr::PSW as u16 {
            self.with_parity(value)
        } else {
            value
        };
        let old = self.memory.read_byte(address);
        let changed = self.memory.store(address, value);
        if changed == 0 {
            return 0;
        }
        let parity_changed = if address == addr::ACC as u16 {
            self.store_parity()
        } else {
            0
        };
        self.side_effects(address, old, value);

        self.memory.notify(address, changed);
        if parity_changed != 0 {
            self.memory.notify(addr::PSW as u16, parity_changed);
        }
        changed
    }

    fn side_effects(&mut self, address: u16, old: u8, new: u8) {
        if address == addr::ADCON as u16
            && self.peripherals.variant().has_extended_peripherals()
            && old & adcon::ADCS == 0
            && new & adcon::ADCS != 0
        {
            self.peripherals.adc.start();
        }
    }

    /// `psw` with P set to the odd parity of ACC
    fn with_parity(&self, psw: u8) -> u8 {
        if self.memory.sfr(addr::ACC).count_ones() & 1 == 1 {
            psw | 0x01
        } else {
            psw & !0x01
        }
    }

    /// Bring PSW.P in line with ACC without notifying, returning the changed mask
    fn store_parity(&mut self) -> u8 {
        let psw = self.with_parity(self.memory.sfr(addr::PSW));
        self.memory.store(addr::PSW as u16, psw)
    }

    pub fn read_bit(&self, address: u16, bit: u8) -> bool {
        self.memory.read_bit(address, bit)
    }

    pub fn write_bit(&mut self, address: u16, bit: u8, value: bool) -> u8 {
        let old = self.read_byte(address);
        let new = if value { old | (1 << bit) } else { old & !(1 << bit) };
        self.write_byte(address, new)
    }

    pub fn read_register(&self, name: &str) -> Result<u8, ConfigError> {
        self.memory.read_register(name)
    }

    pub fn write_register(&mut self, name: &str, value: u8) -> Result<u8, ConfigError> {
        let address = self.map().address_of(name)?;
        Ok(self.write_byte(address as u16, value))
    }

    pub fn read_bit_named(&self, name: &str) -> Result<bool, ConfigError> {
        self.memory.read_bit_named(name)
    }

    pub fn write_bit_named(&mut self, name: &str, value: bool) -> Result<u8, ConfigError> {
        let location = self.map().bit(name)?;
        Ok(self.write_bit(location.address as u16, location.bit, value))
    }

    pub fn read16(&self, name: &str) -> Result<u16, ConfigError> {
        self.memory.read16(name)
    }

    /// Write a 16-bit pair, high byte first
    pub fn write16(&mut self, name: &str, value: u16) -> Result<(), ConfigError> {
        let (high, low) = self.map().composite(name)?;
        let [h, l] = value.to_be_bytes();
        self.write_byte(high as u16, h);
        self.write_byte(low as u16, l);
        Ok(())
    }

    // ========== CPU addressing ==========

    pub fn sfr(&self, address: u8) -> u8 {
        self.memory.sfr(address)
    }

    pub fn set_sfr(&mut self, address: u8, value: u8) -> u8 {
        self.write_byte(address as u16, value)
    }

    pub fn read_indirect(&self, pointer: u8) -> u8 {
        self.read_byte(Memory::indirect_address(pointer))
    }

    pub fn write_indirect(&mut self, pointer: u8, value: u8) {
        self.write_byte(Memory::indirect_address(pointer), value);
    }

    /// Address of R0-R7 in the active bank
    pub fn bank_register_address(&self, register: u8) -> u16 {
        self.memory.bank_register_address(register)
    }

    pub fn read_location(&self, location: BitLocation) -> bool {
        self.read_bit(location.address as u16, location.bit)
    }

    pub fn write_location(&mut self, location: BitLocation, value: bool) {
        self.write_bit(location.address as u16, location.bit, value);
    }

    pub fn code_byte(&mut self, address: u16) -> u8 {
        self.external.code_byte(address)
    }

    pub fn xdata_read(&mut self, address: u16) -> u8 {
        self.external.ram_byte(address)
    }

    pub fn xdata_write(&mut self, address: u16, value: u8) {
        self.external.set_ram_byte(address, value);
    }

    // ========== Peripherals ==========

    /// Advance all peripherals by one machine cycle
    pub fn tick(&mut self) -> TickEvents {
        self.peripherals.tick(&mut self.memory, &mut *self.external)
    }

    /// Deliver a byte to the UART receiver
    pub fn receive_serial(&mut self, byte: u8) -> bool {
        self.peripherals.serial.receive(&mut self.memory, byte)
    }

    pub fn set_adc_input(&mut self, channel: usize, value: u16) {
        self.peripherals.adc.set_input(channel, value);
    }

    pub fn set_ew_pin(&mut self, level: bool) {
        self.peripherals.watchdog.set_ew_pin(level);
    }

    pub fn pwm_output(&self, channel: usize) -> bool {
        self.peripherals.pwm_output(&self.memory, channel)
    }
}
