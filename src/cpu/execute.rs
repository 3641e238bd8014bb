//! Instruction effects
//!
//! One arm per mnemonic. Operand kinds are handled by the accessors in
//! `helpers`, so each arm only states what the instruction computes. The
//! program counter already points past the instruction when an effect
//! runs, which is what MOVC @A+PC and the return address of calls need.

use super::flags;
use super::helpers::{add_with_carry, decimal_adjust, sub_with_borrow};
use super::Cpu;
use crate::bus::Bus;
use crate::disasm::{Mnemonic, Operand};
use crate::error::ExecError;
use crate::listing::ListingEntry;
use crate::sfr::addr;

impl Cpu {
    pub(super) fn effect(&mut self, bus: &mut Bus, entry: &ListingEntry) -> Result<(), ExecError> {
        use Mnemonic::*;

        match entry.mnemonic {
            NOP => {}
            DB => return Err(ExecError::DataEntry(entry.address)),

            // ========== Data transfer ==========
            MOV => self.exec_mov(bus, entry)?,
            MOVC => {
                let base = match Self::operand(entry, 1)? {
                    Operand::IndexedDptr => Self::dptr(bus),
                    Operand::IndexedPc => self.pc,
                    other => return Err(Self::invalid(entry, other)),
                };
                let value = bus.code_byte(base.wrapping_add(Self::acc(bus) as u16));
                Self::set_acc(bus, value);
            }
            MOVX => self.exec_movx(bus, entry)?,
            PUSH => {
                let value = self.read(bus, entry, 0)?;
                self.push(bus, value);
            }
            POP => {
                let value = self.pop(bus);
                self.write(bus, entry, 0, value)?;
            }
            XCH => {
                let a = self.read(bus, entry, 0)?;
                let other = self.read(bus, entry, 1)?;
                self.write(bus, entry, 1, a)?;
                self.write(bus, entry, 0, other)?;
            }
            XCHD => {
                let a = Self::acc(bus);
                let other = self.read(bus, entry, 1)?;
                self.write(bus, entry, 1, (other & 0xF0) | (a & 0x0F))?;
                Self::set_acc(bus, (a & 0xF0) | (other & 0x0F));
            }

            // ========== Arithmetic ==========
            ADD | ADDC => {
                let a = Self::acc(bus);
                let b = self.read(bus, entry, 1)?;
                let carry = entry.mnemonic == ADDC && Self::flag(bus, flags::CY);
                let (result, cy, ac, ov) = add_with_carry(a, b, carry);
                Self::set_acc(bus, result);
                Self::set_arith_flags(bus, cy, ac, ov);
            }
            SUBB => {
                let a = Self::acc(bus);
                let b = self.read(bus, entry, 1)?;
                let (result, cy, ac, ov) = sub_with_borrow(a, b, Self::flag(bus, flags::CY));
                Self::set_acc(bus, result);
                Self::set_arith_flags(bus, cy, ac, ov);
            }
            INC => {
                if Self::operand(entry, 0)? == Operand::Dptr {
                    Self::set_dptr(bus, Self::dptr(bus).wrapping_add(1));
                } else {
                    let value = self.read(bus, entry, 0)?;
                    self.write(bus, entry, 0, value.wrapping_add(1))?;
                }
            }
            DEC => {
                let value = self.read(bus, entry, 0)?;
                self.write(bus, entry, 0, value.wrapping_sub(1))?;
            }
            MUL => {
                let product = Self::acc(bus) as u16 * bus.sfr(addr::B) as u16;
                let [high, low] = product.to_be_bytes();
                Self::set_acc(bus, low);
                bus.set_sfr(addr::B, high);
                Self::set_flag(bus, flags::CY, false);
                Self::set_flag(bus, flags::OV, product > 0xFF);
            }
            DIV => {
                let (a, b) = (Self::acc(bus), bus.sfr(addr::B));
                Self::set_flag(bus, flags::CY, false);
                if b == 0 {
                    // A and B are undefined after a division by zero
                    Self::set_flag(bus, flags::OV, true);
                } else {
                    Self::set_acc(bus, a / b);
                    bus.set_sfr(addr::B, a % b);
                    Self::set_flag(bus, flags::OV, false);
                }
            }
            DA => {
                let (result, carry) = decimal_adjust(
                    Self::acc(bus),
                    Self::flag(bus, flags::CY),
                    Self::flag(bus, flags::AC),
                );
                Self::set_acc(bus, result);
                Self::set_flag(bus, flags::CY, carry);
            }

            // ========== Logic ==========
            ANL | ORL | XRL => self.exec_logic(bus, entry)?,
            CLR => match Self::operand(entry, 0)? {
                Operand::Accumulator => Self::set_acc(bus, 0),
                _ => self.write_bit(bus, entry, 0, false)?,
            },
            SETB => self.write_bit(bus, entry, 0, true)?,
            CPL => match Self::operand(entry, 0)? {
                Operand::Accumulator => Self::set_acc(bus, !Self::acc(bus)),
                _ => {
                    let bit = self.read_bit(bus, entry, 0)?;
                    self.write_bit(bus, entry, 0, !bit)?;
                }
            },
            RL => Self::set_acc(bus, Self::acc(bus).rotate_left(1)),
            RR => Self::set_acc(bus, Self::acc(bus).rotate_right(1)),
            RLC => {
                let a = Self::acc(bus);
                let carry_in = Self::flag(bus, flags::CY) as u8;
                Self::set_flag(bus, flags::CY, a & 0x80 != 0);
                Self::set_acc(bus, (a << 1) | carry_in);
            }
            RRC => {
                let a = Self::acc(bus);
                let carry_in = Self::flag(bus, flags::CY) as u8;
                Self::set_flag(bus, flags::CY, a & 0x01 != 0);
                Self::set_acc(bus, (a >> 1) | (carry_in << 7));
            }
            SWAP => Self::set_acc(bus, Self::acc(bus).rotate_left(4)),

            // ========== Control flow ==========
            LJMP | AJMP | SJMP => self.pc = Self::target(entry)?,
            JMP => {
                self.pc = Self::dptr(bus).wrapping_add(Self::acc(bus) as u16);
            }
            LCALL | ACALL => {
                let target = Self::target(entry)?;
                self.push_return(bus, self.pc);
                self.pc = target;
            }
            RET => self.pc = self.pop_return(bus),
            RETI => {
                self.pc = self.pop_return(bus);
                self.handler_active = false;
            }
            JC | JNC | JZ | JNZ => {
                let taken = match entry.mnemonic {
                    JC => Self::flag(bus, flags::CY),
                    JNC => !Self::flag(bus, flags::CY),
                    JZ => Self::acc(bus) == 0,
                    _ => Self::acc(bus) != 0,
                };
                self.branch(entry, taken)?;
            }
            JB | JNB => {
                let bit = self.read_bit(bus, entry, 0)?;
                self.branch(entry, bit == (entry.mnemonic == JB))?;
            }
            JBC => {
                let bit = self.read_bit(bus, entry, 0)?;
                if bit {
                    self.write_bit(bus, entry, 0, false)?;
                }
                self.branch(entry, bit)?;
            }
            CJNE => {
                let left = self.read(bus, entry, 0)?;
                let right = self.read(bus, entry, 1)?;
                Self::set_flag(bus, flags::CY, left < right);
                self.branch(entry, left != right)?;
            }
            DJNZ => {
                let value = self.read(bus, entry, 0)?.wrapping_sub(1);
                self.write(bus, entry, 0, value)?;
                self.branch(entry, value != 0)?;
            }
        }
        Ok(())
    }

    fn branch(&mut self, entry: &ListingEntry, taken: bool) -> Result<(), ExecError> {
        let target = Self::target(entry)?;
        if taken {
            self.pc = target;
        }
        Ok(())
    }

    fn exec_mov(&mut self, bus: &mut Bus, entry: &ListingEntry) -> Result<(), ExecError> {
        match (Self::operand(entry, 0)?, Self::operand(entry, 1)?) {
            (Operand::Dptr, Operand::Immediate16(value)) => Self::set_dptr(bus, value),
            (Operand::Carry, Operand::Bit(_)) | (Operand::Bit(_), Operand::Carry) => {
                let bit = self.read_bit(bus, entry, 1)?;
                self.write_bit(bus, entry, 0, bit)?;
            }
            _ => {
                let value = self.read(bus, entry, 1)?;
                self.write(bus, entry, 0, value)?;
            }
        }
        Ok(())
    }

    /// External data address of a MOVX operand: DPTR or P2:Ri
    fn xdata_address(bus: &Bus, entry: &ListingEntry, operand: Operand) -> Result<u16, ExecError> {
        match operand {
            Operand::IndirectDptr => Ok(Self::dptr(bus)),
            Operand::IndirectRegister(n) => {
                Ok(u16::from_be_bytes([bus.sfr(addr::P2), Self::register(bus, n)]))
            }
            other => Err(Self::invalid(entry, other)),
        }
    }

    fn exec_movx(&mut self, bus: &mut Bus, entry: &ListingEntry) -> Result<(), ExecError> {
        match (Self::operand(entry, 0)?, Self::operand(entry, 1)?) {
            (Operand::Accumulator, source) => {
                let address = Self::xdata_address(bus, entry, source)?;
                let value = bus.xdata_read(address);
                Self::set_acc(bus, value);
            }
            (destination, Operand::Accumulator) => {
                let address = Self::xdata_address(bus, entry, destination)?;
                bus.xdata_write(address, Self::acc(bus));
            }
            (destination, _) => return Err(Self::invalid(entry, destination)),
        }
        Ok(())
    }

    fn exec_logic(&mut self, bus: &mut Bus, entry: &ListingEntry) -> Result<(), ExecError> {
        if Self::operand(entry, 0)? == Operand::Carry {
            let carry = Self::flag(bus, flags::CY);
            let bit = self.read_bit(bus, entry, 1)?;
            let result = match entry.mnemonic {
                Mnemonic::ANL => carry && bit,
                Mnemonic::ORL => carry || bit,
                _ => return Err(Self::invalid(entry, Operand::Carry)),
            };
            Self::set_flag(bus, flags::CY, result);
            return Ok(());
        }

        let left = self.read(bus, entry, 0)?;
        let right = self.read(bus, entry, 1)?;
        let result = match entry.mnemonic {
            Mnemonic::ANL => left & right,
            Mnemonic::ORL => left | right,
            _ => left ^ right,
        };
        self.write(bus, entry, 0, result)
    }
}
