//! 8051 disassembler
//!
//! Decodes a code image into `ListingEntry` values and recovers a labeled
//! listing by following control flow.
//!
//! # Module Organization
//!
//! - `instruction`: `Mnemonic` and `Operand`
//! - `opcodes`: opcode byte to mnemonic, operand layout and cycles
//! - `builder`: control-flow traversal (`build`, `promote`)

mod builder;
mod instruction;
mod opcodes;

pub use builder::{DATA_CHUNK, DPTR_JUMP_WINDOW};
pub use instruction::{Mnemonic, Operand};

use std::io::Read;

use crate::config::Variant;
use crate::error::{ConfigError, DisasmError};
use crate::listing::ListingEntry;
use crate::peripherals::InterruptController;
use crate::sfr::{BitLocation, RegisterMap};
use opcodes::Arg;

/// Seekable view of a code image
///
/// Addresses are absolute; `base` is the address of the first byte.
#[derive(Debug, Clone)]
pub struct CodeStream<'a> {
    bytes: &'a [u8],
    base: u16,
    position: u16,
}

impl<'a> CodeStream<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::with_base(bytes, 0)
    }

    pub fn with_base(bytes: &'a [u8], base: u16) -> Self {
        Self {
            bytes,
            base,
            position: base,
        }
    }

    pub fn position(&self) -> u16 {
        self.position
    }

    pub fn seek(&mut self, address: u16) {
        self.position = address;
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    /// One past the last address in the image
    pub fn end(&self) -> u32 {
        self.base as u32 + self.bytes.len() as u32
    }

    pub fn contains(&self, address: u16) -> bool {
        address >= self.base && (address as u32) < self.end()
    }

    pub fn byte_at(&self, address: u16) -> Option<u8> {
        if !self.contains(address) {
            return None;
        }
        self.bytes.get((address - self.base) as usize).copied()
    }

    /// Bytes from `address` up to (not including) `end`, clipped to the image
    pub fn slice(&self, address: u16, end: u32) -> &'a [u8] {
        if !self.contains(address) {
            return &[];
        }
        let start = (address - self.base) as usize;
        let stop = (end.min(self.end()) - self.base as u32) as usize;
        &self.bytes[start..stop]
    }
}

/// Read a whole code image
pub fn read_image(mut reader: impl Read) -> Result<Vec<u8>, DisasmError> {
    let mut image = Vec::new();
    reader.read_to_end(&mut image)?;
    Ok(image)
}

/// Decoder bound to one chip's register names and interrupt table
#[derive(Debug, Clone)]
pub struct Disassembler {
    map: &'static RegisterMap,
    interrupts: InterruptController,
}

impl Disassembler {
    pub fn new(variant: Variant) -> Result<Self, ConfigError> {
        let map = RegisterMap::for_variant(variant);
        Ok(Self {
            map,
            interrupts: InterruptController::for_map(map)?,
        })
    }

    pub fn map(&self) -> &'static RegisterMap {
        self.map
    }

    pub fn interrupts(&self) -> &InterruptController {
        &self.interrupts
    }

    /// Decode the instruction at the stream position and advance past it
    ///
    /// On error the stream position is left at the failing instruction.
    pub fn decode_one(&self, stream: &mut CodeStream) -> Result<ListingEntry, DisasmError> {
        let address = stream.position();
        let opcode = stream.byte_at(address).ok_or(DisasmError::OutOfImage(address))?;
        let shape = opcodes::shape(opcode).ok_or(DisasmError::UnknownOpcode { address, opcode })?;

        let len = shape.len();
        let next = address.wrapping_add(len);
        let bytes = stream.slice(address, address as u32 + len as u32);
        if bytes.len() < len as usize {
            return Err(DisasmError::Truncated { address });
        }
        let bytes = bytes.to_vec();
        stream.seek(next);

        let mut raw = bytes[1..].iter().copied();
        let mut take = || raw.next().unwrap_or_default();
        let mut operands = Vec::with_capacity(shape.args.len());
        for arg in &shape.args {
            let operand = match *arg {
                Arg::A => Operand::Accumulator,
                Arg::C => Operand::Carry,
                Arg::Ab => Operand::AccB,
                Arg::Dptr => Operand::Dptr,
                Arg::AtDptr => Operand::IndirectDptr,
                Arg::AtAPlusDptr => Operand::IndexedDptr,
                Arg::AtAPlusPc => Operand::IndexedPc,
                Arg::Reg(n) => Operand::Register(n),
                Arg::AtReg(n) => Operand::IndirectRegister(n),
                Arg::Imm => Operand::Immediate(take()),
                Arg::Imm16 => Operand::Immediate16(u16::from_be_bytes([take(), take()])),
                Arg::Dir => Operand::Direct(take()),
                Arg::Bit => Operand::Bit(BitLocation::from_bit_address(take())),
                Arg::NotBit => Operand::NotBit(BitLocation::from_bit_address(take())),
                Arg::Rel => Operand::Code(next.wrapping_add_signed(take() as i8 as i16)),
                Arg::Addr11 => {
                    let page = ((opcode as u16 & 0xE0) << 3) | take() as u16;
                    Operand::Code((next & 0xF800) | page)
                }
                Arg::Addr16 => Operand::Code(u16::from_be_bytes([take(), take()])),
            };
            operands.push(operand);
        }
        if shape.swapped {
            operands.swap(0, 1);
        }

        let target = operands.iter().find_map(Operand::code_target);
        Ok(ListingEntry {
            address,
            bytes,
            mnemonic: shape.mnemonic,
            operands,
            target,
            label: None,
            comment: None,
            cycles: shape.cycles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8], base: u16) -> ListingEntry {
        let disassembler = Disassembler::new(Variant::C552).unwrap();
        disassembler
            .decode_one(&mut CodeStream::with_base(bytes, base))
            .unwrap()
    }

    fn text(entry: &ListingEntry) -> String {
        let map = RegisterMap::for_variant(Variant::C552);
        let ops: Vec<_> = entry.operands.iter().map(|o| o.render(map, None)).collect();
        format!("{} {}", entry.mnemonic, ops.join(","))
    }

    #[test]
    fn test_decode_basic() {
        let e = decode(&[0x02, 0x12, 0x34], 0);
        assert_eq!(e.mnemonic, Mnemonic::LJMP);
        assert_eq!(e.target, Some(0x1234));
        assert_eq!(e.len(), 3);

        assert_eq!(text(&decode(&[0x75, 0xA8, 0x82], 0)), "MOV IEN0,#0x82");
        assert_eq!(text(&decode(&[0xE5, 0x30], 0)), "MOV A,RAM_30");
        assert_eq!(text(&decode(&[0x90, 0x12, 0x34], 0)), "MOV DPTR,#0x1234");
        assert_eq!(text(&decode(&[0xB0, 0xD7], 0)), "ANL C,/CY");
        assert_eq!(text(&decode(&[0x93], 0)), "MOVC A,@A+DPTR");
        assert_eq!(text(&decode(&[0xE3], 0)), "MOVX A,@R1");
    }

    #[test]
    fn test_mov_direct_direct_operand_order() {
        // MOV 0x30,P1 is encoded source first
        let e = decode(&[0x85, 0x90, 0x30], 0);
        assert_eq!(e.operands, vec![Operand::Direct(0x30), Operand::Direct(0x90)]);
    }

    #[test]
    fn test_relative_and_absolute_targets() {
        // SJMP -2 at 0x0100 loops on itself
        assert_eq!(decode(&[0x80, 0xFE], 0x0100).target, Some(0x0100));
        // CJNE A,#1,+3 at 0x0010: next is 0x0013
        assert_eq!(decode(&[0xB4, 0x01, 0x03], 0x0010).target, Some(0x0016));
        // ACALL in page 0x0800 with high bits 101
        assert_eq!(decode(&[0xB1, 0x23], 0x0FFE).target, Some(0x0D23));
        // AJMP at the end of a page takes the next page
        assert_eq!(decode(&[0x01, 0x00], 0x07FE).target, Some(0x0800));
        // JB P1.0,-5 (P1.0 is the CT0I capture input)
        let e = decode(&[0x20, 0x90, 0xFB], 0x0020);
        assert_eq!(text(&e), "JB CT0I,0x001E");
    }

    #[test]
    fn test_decode_errors() {
        let disassembler = Disassembler::new(Variant::Mcs51).unwrap();
        let mut stream = CodeStream::new(&[0xA5]);
        assert!(matches!(
            disassembler.decode_one(&mut stream),
            Err(DisasmError::UnknownOpcode { address: 0, opcode: 0xA5 })
        ));
        let mut stream = CodeStream::new(&[0x00, 0x02, 0x00]);
        stream.seek(1);
        assert!(matches!(
            disassembler.decode_one(&mut stream),
            Err(DisasmError::Truncated { address: 1 })
        ));
        assert_eq!(stream.position(), 1);
        stream.seek(3);
        assert!(matches!(disassembler.decode_one(&mut stream), Err(DisasmError::OutOfImage(3))));
    }

    #[test]
    fn test_read_image() {
        let image = read_image(&[0x02u8, 0x00, 0x03][..]).unwrap();
        assert_eq!(image, vec![0x02, 0x00, 0x03]);
    }
}
