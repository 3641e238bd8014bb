//! Internal memory and register model
//!
//! One flat byte array holds the whole internal address space:
//! - 0x000 - 0x07F: internal RAM (register banks at 0x00-0x1F, bit RAM at 0x20-0x2F)
//! - 0x080 - 0x0FF: SFRs (direct addressing)
//! - 0x100 - 0x17F: upper internal RAM, reached by indirect addressing of 0x80-0xFF
//!
//! Every store reports the mask of bits that actually changed. Observers
//! registered per register, per bit and per 16-bit pair are notified only
//! for real changes, and only while notifications are enabled.

use std::collections::HashMap;

use crate::error::ConfigError;
use crate::sfr::{addr as sfr, BitLocation, RegisterMap, SFR_BASE};

/// Address space layout
pub mod addr {
    /// Lower internal RAM size
    pub const RAM_SIZE: usize = 0x80;
    /// Start of the upper internal RAM as stored in the address space
    pub const UPPER_RAM_START: u16 = 0x100;
    /// Total bytes in the address space
    pub const SPACE_SIZE: usize = 0x180;
    /// Bytes per row when the space is displayed
    pub const ROW_WIDTH: usize = 16;
}

pub type RegisterObserver = Box<dyn FnMut(u8)>;
pub type BitObserver = Box<dyn FnMut(bool)>;
pub type WordObserver = Box<dyn FnMut(u16)>;

#[derive(Default)]
struct Observers {
    registers: HashMap<u16, Vec<RegisterObserver>>,
    bits: HashMap<(u16, u8), Vec<BitObserver>>,
    words: HashMap<&'static str, Vec<WordObserver>>,
}

impl Observers {
    fn is_empty(&self) -> bool {
        self.registers.is_empty() && self.bits.is_empty() && self.words.is_empty()
    }
}

/// Internal address space with change notification
pub struct Memory {
    map: &'static RegisterMap,
    data: [u8; addr::SPACE_SIZE],
    observers: Observers,
    notifications: bool,
}

impl Memory {
    pub fn new(map: &'static RegisterMap) -> Self {
        let mut memory = Self {
            map,
            data: [0; addr::SPACE_SIZE],
            observers: Observers::default(),
            notifications: true,
        };
        memory.reset();
        memory
    }

    pub fn map(&self) -> &'static RegisterMap {
        self.map
    }

    /// Load every register's reset value. RAM keeps its contents.
    pub fn reset(&mut self) {
        for desc in self.map.registers() {
            self.write_byte(desc.address as u16, desc.reset);
        }
    }

    // ========== Raw access ==========

    /// Read a byte of the address space
    ///
    /// Panics if `address` is outside the 0x180-byte space.
    pub fn read_byte(&self, address: u16) -> u8 {
        self.data[address as usize]
    }

    /// Store without notifying, returning the mask of changed bits
    pub fn store(&mut self, address: u16, value: u8) -> u8 {
        let slot = &mut self.data[address as usize];
        let changed = *slot ^ value;
        *slot = value;
        changed
    }

    /// Notify observers of a change described by `mask`
    pub fn notify(&mut self, address: u16, mask: u8) {
        if mask == 0 || !self.notifications || self.observers.is_empty() {
            return;
        }
        let value = self.data[address as usize];

        if let Some(list) = self.observers.registers.get_mut(&address) {
            for observer in list.iter_mut() {
                observer(value);
            }
        }

        for bit in 0..8u8 {
            if mask & (1 << bit) == 0 {
                continue;
            }
            if let Some(list) = self.observers.bits.get_mut(&(address, bit)) {
                let level = value & (1 << bit) != 0;
                for observer in list.iter_mut() {
                    observer(level);
                }
            }
        }

        if address < 0x100 && address >= SFR_BASE as u16 {
            for name in self.map.composites_containing(address as u8) {
                let Some(list) = self.observers.words.get_mut(name) else {
                    continue;
                };
                let Ok((high, low)) = self.map.composite(name) else {
                    continue;
                };
                let word = u16::from_be_bytes([self.data[high as usize], self.data[low as usize]]);
                for observer in list.iter_mut() {
                    observer(word);
                }
            }
        }
    }

    /// Store and notify, returning the mask of changed bits
    pub fn write_byte(&mut self, address: u16, value: u8) -> u8 {
        let changed = self.store(address, value);
        self.notify(address, changed);
        changed
    }

    pub fn read_bit(&self, address: u16, bit: u8) -> bool {
        self.read_byte(address) & (1 << bit) != 0
    }

    pub fn write_bit(&mut self, address: u16, bit: u8, value: bool) -> u8 {
        let old = self.read_byte(address);
        let new = if value { old | (1 << bit) } else { old & !(1 << bit) };
        self.write_byte(address, new)
    }

    // ========== SFR shorthands ==========

    pub fn sfr(&self, address: u8) -> u8 {
        self.data[address as usize]
    }

    pub fn set_sfr(&mut self, address: u8, value: u8) -> u8 {
        self.write_byte(address as u16, value)
    }

    pub fn test(&self, location: BitLocation) -> bool {
        self.read_bit(location.address as u16, location.bit)
    }

    pub fn set(&mut self, location: BitLocation, value: bool) -> u8 {
        self.write_bit(location.address as u16, location.bit, value)
    }

    // ========== Named access ==========

    pub fn read_register(&self, name: &str) -> Result<u8, ConfigError> {
        Ok(self.sfr(self.map.address_of(name)?))
    }

    pub fn read_bit_named(&self, name: &str) -> Result<bool, ConfigError> {
        Ok(self.test(self.map.bit(name)?))
    }

    pub fn read16(&self, name: &str) -> Result<u16, ConfigError> {
        let (high, low) = self.map.composite(name)?;
        Ok(u16::from_be_bytes([self.sfr(high), self.sfr(low)]))
    }

    // ========== Addressing helpers ==========

    /// Address of R0-R7 in the bank selected by PSW.RS1:RS0
    pub fn bank_register_address(&self, register: u8) -> u16 {
        ((self.sfr(sfr::PSW) & 0x18) | (register & 0x07)) as u16
    }

    /// Storage address for an indirect (`@Ri`, stack) access
    pub fn indirect_address(pointer: u8) -> u16 {
        if pointer < SFR_BASE {
            pointer as u16
        } else {
            addr::UPPER_RAM_START + (pointer - SFR_BASE) as u16
        }
    }

    // ========== Observers ==========

    pub fn on_register_change(&mut self, name: &str, observer: RegisterObserver) -> Result<(), ConfigError> {
        let address = self.map.address_of(name)? as u16;
        self.observers.registers.entry(address).or_default().push(observer);
        Ok(())
    }

    pub fn on_bit_change(&mut self, name: &str, observer: BitObserver) -> Result<(), ConfigError> {
        let location = self.map.bit(name)?;
        self.observers
            .bits
            .entry((location.address as u16, location.bit))
            .or_default()
            .push(observer);
        Ok(())
    }

    pub fn on_word_change(&mut self, name: &str, observer: WordObserver) -> Result<(), ConfigError> {
        self.map.composite(name)?;
        let key = self
            .map
            .composite_names()
            .find(|n| *n == name)
            .ok_or_else(|| ConfigError::UnknownComposite(name.to_string()))?;
        self.observers.words.entry(key).or_default().push(observer);
        Ok(())
    }

    /// Turn change notifications on or off (off during fast-forward)
    pub fn set_notifications(&mut self, enabled: bool) {
        self.notifications = enabled;
    }

    pub fn notifications_enabled(&self) -> bool {
        self.notifications
    }

    // ========== Display ==========

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Address space split into display rows of `ROW_WIDTH` bytes
    pub fn rows(&self) -> impl Iterator<Item = (u16, &[u8])> {
        self.data
            .chunks(addr::ROW_WIDTH)
            .enumerate()
            .map(|(i, row)| ((i * addr::ROW_WIDTH) as u16, row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn memory() -> Memory {
        Memory::new(RegisterMap::for_variant(Variant::C552))
    }

    #[test]
    fn test_reset_values() {
        let mut mem = memory();
        for desc in mem.map().registers() {
            assert_eq!(mem.sfr(desc.address), desc.reset, "{}", desc.name);
        }
        mem.set_sfr(sfr::SP, 0x40);
        mem.set_sfr(sfr::S1STA, 0x08);
        mem.data[0x30] = 0x55;
        mem.reset();
        assert_eq!(mem.sfr(sfr::SP), 0x07);
        assert_eq!(mem.sfr(sfr::S1STA), 0xF8);
        assert_eq!(mem.read_byte(0x30), 0x55);
    }

    #[test]
    fn test_write_returns_changed_mask() {
        let mut mem = memory();
        assert_eq!(mem.write_byte(0x40, 0x0F), 0x0F);
        assert_eq!(mem.write_byte(0x40, 0x0F), 0x00);
        assert_eq!(mem.write_byte(0x40, 0x3C), 0x33);
        assert_eq!(mem.write_bit(0x40, 0, true), 0x01);
        assert_eq!(mem.write_bit(0x40, 0, true), 0x00);
    }

    #[test]
    fn test_bank_register_address() {
        let mut mem = memory();
        assert_eq!(mem.bank_register_address(3), 0x03);
        mem.set_sfr(sfr::PSW, 0x18);
        assert_eq!(mem.bank_register_address(3), 0x1B);
        mem.set_sfr(sfr::PSW, 0x08);
        assert_eq!(mem.bank_register_address(7), 0x0F);
    }

    #[test]
    fn test_indirect_address() {
        assert_eq!(Memory::indirect_address(0x7F), 0x7F);
        assert_eq!(Memory::indirect_address(0x80), 0x100);
        assert_eq!(Memory::indirect_address(0xFF), 0x17F);
    }

    #[test]
    fn test_observer_order_and_filtering() {
        let mut mem = memory();
        let log = Rc::new(RefCell::new(Vec::<String>::new()));

        let l = log.clone();
        mem.on_register_change("TL0", Box::new(move |v| l.borrow_mut().push(format!("TL0={v:02X}"))))
            .unwrap();
        let l = log.clone();
        mem.on_bit_change("TL0.1", Box::new(move |b| l.borrow_mut().push(format!("bit1={b}"))))
            .unwrap();
        let l = log.clone();
        mem.on_bit_change("TL0.7", Box::new(move |b| l.borrow_mut().push(format!("bit7={b}"))))
            .unwrap();
        let l = log.clone();
        mem.on_word_change("TIMER0", Box::new(move |w| l.borrow_mut().push(format!("T0={w:04X}"))))
            .unwrap();

        mem.set_sfr(sfr::TH0, 0x12);
        mem.set_sfr(sfr::TL0, 0x02);
        assert_eq!(*log.borrow(), vec!["T0=1200", "TL0=02", "bit1=true", "T0=1202"]);

        log.borrow_mut().clear();
        mem.set_sfr(sfr::TL0, 0x02);
        assert!(log.borrow().is_empty());

        mem.set_notifications(false);
        mem.set_sfr(sfr::TL0, 0x80);
        assert!(log.borrow().is_empty());
        assert_eq!(mem.sfr(sfr::TL0), 0x80);
    }

    #[test]
    fn test_unknown_observer_names() {
        let mut mem = memory();
        assert!(mem.on_register_change("NOPE", Box::new(|_| {})).is_err());
        assert!(mem.on_bit_change("NOPE", Box::new(|_| {})).is_err());
        assert!(mem.on_word_change("NOPE", Box::new(|_| {})).is_err());
    }

    #[test]
    fn test_read16_is_big_endian() {
        let mut mem = memory();
        mem.set_sfr(sfr::DPH, 0xAB);
        mem.set_sfr(sfr::DPL, 0xCD);
        assert_eq!(mem.read16("DPTR").unwrap(), 0xABCD);
    }

    #[test]
    fn test_rows() {
        let mem = memory();
        let rows: Vec<_> = mem.rows().collect();
        assert_eq!(rows.len(), addr::SPACE_SIZE / addr::ROW_WIDTH);
        assert_eq!(rows[8].0, 0x80);
        assert_eq!(rows[8].1[0], 0xFF);
    }
}
