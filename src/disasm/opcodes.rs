//! 8051 opcode table
//!
//! Maps an opcode byte to its mnemonic, operand layout and machine cycles.
//! Operand bytes are read by the decoder in the order given by `Arg`.

use super::instruction::Mnemonic;
use super::instruction::Mnemonic::*;

/// Operand layout of one instruction argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Arg {
    A,
    C,
    Ab,
    Dptr,
    AtDptr,
    AtAPlusDptr,
    AtAPlusPc,
    Reg(u8),
    AtReg(u8),
    /// One byte: #data
    Imm,
    /// Two bytes: #data16
    Imm16,
    /// One byte: direct address
    Dir,
    /// One byte: bit address
    Bit,
    /// One byte: /bit address
    NotBit,
    /// One byte: signed offset from the next instruction
    Rel,
    /// One byte plus the top three opcode bits
    Addr11,
    /// Two bytes: absolute code address
    Addr16,
}

impl Arg {
    pub(super) fn size(self) -> u16 {
        match self {
            Arg::Imm | Arg::Dir | Arg::Bit | Arg::NotBit | Arg::Rel | Arg::Addr11 => 1,
            Arg::Imm16 | Arg::Addr16 => 2,
            _ => 0,
        }
    }
}

/// Decoding recipe for one opcode
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Shape {
    pub mnemonic: Mnemonic,
    pub args: Vec<Arg>,
    pub cycles: u8,
    /// MOV direct,direct stores the source byte first
    pub swapped: bool,
}

impl Shape {
    fn new(mnemonic: Mnemonic, args: &[Arg], cycles: u8) -> Self {
        Self {
            mnemonic,
            args: args.to_vec(),
            cycles,
            swapped: false,
        }
    }

    pub(super) fn len(&self) -> u16 {
        1 + self.args.iter().map(|a| a.size()).sum::<u16>()
    }
}

/// Source operand selected by the low opcode nibble of the arithmetic rows
fn src(op: u8) -> Arg {
    match op & 0x0F {
        0x04 => Arg::Imm,
        0x05 => Arg::Dir,
        0x06 | 0x07 => Arg::AtReg(op & 0x01),
        n => Arg::Reg(n - 8),
    }
}

/// Same as `src`, but nibble 4 addresses A instead of an immediate
fn target(op: u8) -> Arg {
    match op & 0x0F {
        0x04 => Arg::A,
        _ => src(op),
    }
}

/// Look up an opcode; `None` for the single undefined opcode 0xA5
pub(super) fn shape(op: u8) -> Option<Shape> {
    use Arg::*;

    let lo = op & 0x0F;
    let shape = match op {
        0x00 => Shape::new(NOP, &[], 1),
        0x02 => Shape::new(LJMP, &[Addr16], 2),
        0x03 => Shape::new(RR, &[A], 1),
        0x04..=0x0F => Shape::new(INC, &[target(op)], 1),
        0x10 => Shape::new(JBC, &[Bit, Rel], 2),
        0x12 => Shape::new(LCALL, &[Addr16], 2),
        0x13 => Shape::new(RRC, &[A], 1),
        0x14..=0x1F => Shape::new(DEC, &[target(op)], 1),
        0x20 => Shape::new(JB, &[Bit, Rel], 2),
        0x22 => Shape::new(RET, &[], 2),
        0x23 => Shape::new(RL, &[A], 1),
        0x24..=0x2F => Shape::new(ADD, &[A, src(op)], 1),
        0x30 => Shape::new(JNB, &[Bit, Rel], 2),
        0x32 => Shape::new(RETI, &[], 2),
        0x33 => Shape::new(RLC, &[A], 1),
        0x34..=0x3F => Shape::new(ADDC, &[A, src(op)], 1),
        0x40 => Shape::new(JC, &[Rel], 2),
        0x50 => Shape::new(JNC, &[Rel], 2),
        0x60 => Shape::new(JZ, &[Rel], 2),
        0x70 => Shape::new(JNZ, &[Rel], 2),
        0x42 | 0x52 | 0x62 | 0x43 | 0x53 | 0x63 | 0x44..=0x4F | 0x54..=0x5F | 0x64..=0x6F => {
            let mnemonic = match op >> 4 {
                0x4 => ORL,
                0x5 => ANL,
                _ => XRL,
            };
            match lo {
                0x02 => Shape::new(mnemonic, &[Dir, A], 1),
                0x03 => Shape::new(mnemonic, &[Dir, Imm], 2),
                _ => Shape::new(mnemonic, &[A, src(op)], 1),
            }
        }
        0x72 => Shape::new(ORL, &[C, Bit], 2),
        0x73 => Shape::new(JMP, &[AtAPlusDptr], 2),
        0x74 => Shape::new(MOV, &[A, Imm], 1),
        0x75 => Shape::new(MOV, &[Dir, Imm], 2),
        0x76..=0x7F => Shape::new(MOV, &[src(op), Imm], 1),
        0x80 => Shape::new(SJMP, &[Rel], 2),
        0x82 => Shape::new(ANL, &[C, Bit], 2),
        0x83 => Shape::new(MOVC, &[A, AtAPlusPc], 2),
        0x84 => Shape::new(DIV, &[Ab], 4),
        0x85 => Shape {
            swapped: true,
            ..Shape::new(MOV, &[Dir, Dir], 2)
        },
        0x86..=0x8F => Shape::new(MOV, &[Dir, src(op)], 2),
        0x90 => Shape::new(MOV, &[Dptr, Imm16], 2),
        0x92 => Shape::new(MOV, &[Bit, C], 2),
        0x93 => Shape::new(MOVC, &[A, AtAPlusDptr], 2),
        0x94..=0x9F => Shape::new(SUBB, &[A, src(op)], 1),
        0xA0 => Shape::new(ORL, &[C, NotBit], 2),
        0xA2 => Shape::new(MOV, &[C, Bit], 1),
        0xA3 => Shape::new(INC, &[Dptr], 2),
        0xA4 => Shape::new(MUL, &[Ab], 4),
        0xA5 => return None,
        0xA6..=0xAF => Shape::new(MOV, &[src(op), Dir], 2),
        0xB0 => Shape::new(ANL, &[C, NotBit], 2),
        0xB2 => Shape::new(CPL, &[Bit], 1),
        0xB3 => Shape::new(CPL, &[C], 1),
        0xB4 => Shape::new(CJNE, &[A, Imm, Rel], 2),
        0xB5 => Shape::new(CJNE, &[A, Dir, Rel], 2),
        0xB6..=0xBF => Shape::new(CJNE, &[src(op), Imm, Rel], 2),
        0xC0 => Shape::new(PUSH, &[Dir], 2),
        0xC2 => Shape::new(CLR, &[Bit], 1),
        0xC3 => Shape::new(CLR, &[C], 1),
        0xC4 => Shape::new(SWAP, &[A], 1),
        0xC5..=0xCF => Shape::new(XCH, &[A, src(op)], 1),
        0xD0 => Shape::new(POP, &[Dir], 2),
        0xD2 => Shape::new(SETB, &[Bit], 1),
        0xD3 => Shape::new(SETB, &[C], 1),
        0xD4 => Shape::new(DA, &[A], 1),
        0xD5 => Shape::new(DJNZ, &[Dir, Rel], 2),
        0xD6 | 0xD7 => Shape::new(XCHD, &[A, src(op)], 1),
        0xD8..=0xDF => Shape::new(DJNZ, &[src(op), Rel], 2),
        0xE0 => Shape::new(MOVX, &[A, AtDptr], 2),
        0xE2 | 0xE3 => Shape::new(MOVX, &[A, AtReg(op & 0x01)], 2),
        0xE4 => Shape::new(CLR, &[A], 1),
        0xE5..=0xEF => Shape::new(MOV, &[A, src(op)], 1),
        0xF0 => Shape::new(MOVX, &[AtDptr, A], 2),
        0xF2 | 0xF3 => Shape::new(MOVX, &[AtReg(op & 0x01), A], 2),
        0xF4 => Shape::new(CPL, &[A], 1),
        0xF5..=0xFF => Shape::new(MOV, &[src(op), A], 1),
        // remaining column x1: absolute jumps and calls within the 2KB page
        _ if op & 0x10 == 0 => Shape::new(AJMP, &[Addr11], 2),
        _ => Shape::new(ACALL, &[Addr11], 2),
    };
    Some(shape)
}
