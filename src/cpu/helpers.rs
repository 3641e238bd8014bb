//! CPU helper functions
//!
//! - Operand accessors: one set of byte and bit accessors dispatching on
//!   `Operand`, shared by every instruction
//! - Flag helpers (flag, set_flag, set_arith_flags)
//! - Stack operations (push, pop, push_return, pop_return)
//! - ALU arithmetic (add_with_carry, sub_with_borrow, decimal_adjust)

use super::flags;
use super::{CallStackEntry, Cpu};
use crate::bus::Bus;
use crate::disasm::Operand;
use crate::error::ExecError;
use crate::listing::ListingEntry;
use crate::sfr::addr;

impl Cpu {
    // ========== Operand Access ==========

    pub(super) fn operand(entry: &ListingEntry, index: usize) -> Result<Operand, ExecError> {
        entry
            .operand(index)
            .copied()
            .ok_or(ExecError::MissingOperand {
                address: entry.address,
                mnemonic: entry.mnemonic.as_str(),
                index,
            })
    }

    pub(super) fn invalid(entry: &ListingEntry, operand: Operand) -> ExecError {
        ExecError::InvalidOperand {
            address: entry.address,
            mnemonic: entry.mnemonic.as_str(),
            operand: format!("{operand:?}"),
        }
    }

    pub(super) fn target(entry: &ListingEntry) -> Result<u16, ExecError> {
        entry.target.ok_or(ExecError::MissingTarget {
            address: entry.address,
            mnemonic: entry.mnemonic.as_str(),
        })
    }

    /// Read a byte operand
    pub(super) fn read(&self, bus: &Bus, entry: &ListingEntry, index: usize) -> Result<u8, ExecError> {
        let operand = Self::operand(entry, index)?;
        Ok(match operand {
            Operand::Accumulator => bus.sfr(addr::ACC),
            Operand::Register(n) => bus.read_byte(bus.bank_register_address(n)),
            Operand::IndirectRegister(n) => bus.read_indirect(Self::register(bus, n)),
            Operand::Immediate(value) | Operand::Byte(value) => value,
            Operand::Direct(address) => bus.read_byte(address as u16),
            _ => return Err(Self::invalid(entry, operand)),
        })
    }

    /// Write a byte operand
    pub(super) fn write(
        &mut self,
        bus: &mut Bus,
        entry: &ListingEntry,
        index: usize,
        value: u8,
    ) -> Result<(), ExecError> {
        let operand = Self::operand(entry, index)?;
        match operand {
            Operand::Accumulator => {
                bus.set_sfr(addr::ACC, value);
            }
            Operand::Register(n) => {
                let address = bus.bank_register_address(n);
                bus.write_byte(address, value);
            }
            Operand::IndirectRegister(n) => {
                let pointer = Self::register(bus, n);
                bus.write_indirect(pointer, value);
            }
            Operand::Direct(address) => {
                bus.write_byte(address as u16, value);
            }
            _ => return Err(Self::invalid(entry, operand)),
        }
        Ok(())
    }

    /// Read a bit operand (C, bit or /bit)
    pub(super) fn read_bit(&self, bus: &Bus, entry: &ListingEntry, index: usize) -> Result<bool, ExecError> {
        let operand = Self::operand(entry, index)?;
        match operand {
            Operand::Carry => Ok(Self::flag(bus, flags::CY)),
            Operand::Bit(location) => Ok(bus.read_location(location)),
            Operand::NotBit(location) => Ok(!bus.read_location(location)),
            _ => Err(Self::invalid(entry, operand)),
        }
    }

    /// Write a bit operand (C or bit)
    pub(super) fn write_bit(
        &mut self,
        bus: &mut Bus,
        entry: &ListingEntry,
        index: usize,
        value: bool,
    ) -> Result<(), ExecError> {
        let operand = Self::operand(entry, index)?;
        match operand {
            Operand::Carry => Self::set_flag(bus, flags::CY, value),
            Operand::Bit(location) => bus.write_location(location, value),
            _ => return Err(Self::invalid(entry, operand)),
        }
        Ok(())
    }

    /// R0-R7 of the active bank
    pub(super) fn register(bus: &Bus, n: u8) -> u8 {
        bus.read_byte(bus.bank_register_address(n))
    }

    pub(super) fn acc(bus: &Bus) -> u8 {
        bus.sfr(addr::ACC)
    }

    pub(super) fn set_acc(bus: &mut Bus, value: u8) {
        bus.set_sfr(addr::ACC, value);
    }

    pub(super) fn dptr(bus: &Bus) -> u16 {
        u16::from_be_bytes([bus.sfr(addr::DPH), bus.sfr(addr::DPL)])
    }

    /// High byte first, like a 16-bit register write
    pub(super) fn set_dptr(bus: &mut Bus, value: u16) {
        let [high, low] = value.to_be_bytes();
        bus.set_sfr(addr::DPH, high);
        bus.set_sfr(addr::DPL, low);
    }

    // ========== Flags ==========

    pub(super) fn flag(bus: &Bus, mask: u8) -> bool {
        bus.sfr(addr::PSW) & mask != 0
    }

    pub(super) fn set_flag(bus: &mut Bus, mask: u8, value: bool) {
        let psw = bus.sfr(addr::PSW);
        bus.set_sfr(addr::PSW, if value { psw | mask } else { psw & !mask });
    }

    /// CY, AC and OV in one PSW write
    pub(super) fn set_arith_flags(bus: &mut Bus, carry: bool, aux: bool, overflow: bool) {
        let mut psw = bus.sfr(addr::PSW) & !(flags::CY | flags::AC | flags::OV);
        if carry {
            psw |= flags::CY;
        }
        if aux {
            psw |= flags::AC;
        }
        if overflow {
            psw |= flags::OV;
        }
        bus.set_sfr(addr::PSW, psw);
    }

    // ========== Stack ==========

    pub(super) fn push(&mut self, bus: &mut Bus, value: u8) {
        let sp = bus.sfr(addr::SP).wrapping_add(1);
        bus.set_sfr(addr::SP, sp);
        bus.write_indirect(sp, value);
    }

    /// Pop a byte, dropping call stack entries the stack has unwound past
    pub(super) fn pop(&mut self, bus: &mut Bus) -> u8 {
        let sp = bus.sfr(addr::SP);
        let value = bus.read_indirect(sp);
        let sp = sp.wrapping_sub(1);
        bus.set_sfr(addr::SP, sp);
        self.call_stack.retain(|e| e.stack_pointer < sp);
        value
    }

    /// Push a return address (low byte first) and record it
    pub(super) fn push_return(&mut self, bus: &mut Bus, address: u16) {
        let stack_pointer = bus.sfr(addr::SP);
        let [high, low] = address.to_be_bytes();
        self.push(bus, low);
        self.push(bus, high);
        self.call_stack.push(CallStackEntry {
            return_address: address,
            stack_pointer,
        });
    }

    pub(super) fn pop_return(&mut self, bus: &mut Bus) -> u16 {
        let high = self.pop(bus);
        let low = self.pop(bus);
        u16::from_be_bytes([high, low])
    }
}

// ========== ALU ==========

/// 8-bit add: (result, CY, AC, OV)
pub fn add_with_carry(a: u8, b: u8, carry: bool) -> (u8, bool, bool, bool) {
    let c = carry as u8;
    let sum = a as u16 + b as u16 + c as u16;
    let result = sum as u8;
    let aux = (a & 0x0F) + (b & 0x0F) + c > 0x0F;
    let overflow = (a ^ b) & 0x80 == 0 && (a ^ result) & 0x80 != 0;
    (result, sum > 0xFF, aux, overflow)
}

/// 8-bit subtract with borrow: (result, CY, AC, OV)
///
/// CY and AC are borrows out of bit 7 and bit 3.
pub fn sub_with_borrow(a: u8, b: u8, borrow: bool) -> (u8, bool, bool, bool) {
    let c = borrow as u8;
    let result = a.wrapping_sub(b).wrapping_sub(c);
    let carry = (a as u16) < b as u16 + c as u16;
    let aux = (a & 0x0F) < (b & 0x0F) + c;
    let overflow = (a ^ b) & 0x80 != 0 && (a ^ result) & 0x80 != 0;
    (result, carry, aux, overflow)
}

/// DA A: (result, CY)
///
/// Adds 6 when the low nibble is above 9 or AC is set, then 0x60 when the
/// high nibble is above 9 or CY is set. CY is only ever set, never cleared.
pub fn decimal_adjust(a: u8, carry: bool, aux: bool) -> (u8, bool) {
    let mut value = a as u16;
    let mut carry = carry;
    if value & 0x0F > 9 || aux {
        value += 0x06;
        if value > 0xFF {
            carry = true;
        }
    }
    if (value >> 4) & 0x0F > 9 || carry {
        value += 0x60;
        if value > 0xFF {
            carry = true;
        }
    }
    (value as u8, carry)
}
