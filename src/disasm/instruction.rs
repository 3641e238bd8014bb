//! Instruction vocabulary shared by the decoder, the listing and the CPU
//!
//! - `Mnemonic`: closed set of 8051 instruction kinds plus `DB` for data
//! - `Operand`: operand kinds resolved once at decode time

use std::fmt;
use std::str::FromStr;

use crate::sfr::{BitLocation, RegisterMap};

macro_rules! mnemonics {
    ($($name:ident),* $(,)?) => {
        /// Instruction kind
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Mnemonic {
            $($name,)*
        }

        impl Mnemonic {
            pub const ALL: &'static [Mnemonic] = &[$(Mnemonic::$name,)*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Mnemonic::$name => stringify!($name),)*
                }
            }
        }
    };
}

mnemonics!(
    ACALL, ADD, ADDC, AJMP, ANL, CJNE, CLR, CPL, DA, DB, DEC, DIV, DJNZ, INC, JB, JBC, JC, JMP,
    JNB, JNC, JNZ, JZ, LCALL, LJMP, MOV, MOVC, MOVX, MUL, NOP, ORL, POP, PUSH, RET, RETI, RL,
    RLC, RR, RRC, SETB, SJMP, SUBB, SWAP, XCH, XCHD, XRL,
);

impl Mnemonic {
    /// LJMP, AJMP, SJMP: control never falls through
    pub fn is_jump(self) -> bool {
        matches!(self, Mnemonic::LJMP | Mnemonic::AJMP | Mnemonic::SJMP)
    }

    pub fn is_call(self) -> bool {
        matches!(self, Mnemonic::LCALL | Mnemonic::ACALL)
    }

    pub fn is_return(self) -> bool {
        matches!(self, Mnemonic::RET | Mnemonic::RETI)
    }

    /// Branches that may fall through to the next instruction
    pub fn is_conditional(self) -> bool {
        matches!(
            self,
            Mnemonic::JC
                | Mnemonic::JNC
                | Mnemonic::JZ
                | Mnemonic::JNZ
                | Mnemonic::JB
                | Mnemonic::JNB
                | Mnemonic::JBC
                | Mnemonic::CJNE
                | Mnemonic::DJNZ
        )
    }

    pub fn is_data(self) -> bool {
        self == Mnemonic::DB
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mnemonic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mnemonic::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown mnemonic `{s}`"))
    }
}

/// One decoded operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// A
    Accumulator,
    /// R0-R7 of the active bank
    Register(u8),
    /// @R0 / @R1
    IndirectRegister(u8),
    /// #data
    Immediate(u8),
    /// #data16 (MOV DPTR only)
    Immediate16(u16),
    /// Direct address 0x00-0xFF
    Direct(u8),
    Bit(BitLocation),
    /// /bit (ANL C and ORL C)
    NotBit(BitLocation),
    /// C
    Carry,
    /// DPTR
    Dptr,
    /// @DPTR
    IndirectDptr,
    /// @A+DPTR
    IndexedDptr,
    /// @A+PC
    IndexedPc,
    /// AB (MUL, DIV)
    AccB,
    /// Resolved code address of a jump, call or branch
    Code(u16),
    /// Raw byte of a data entry
    Byte(u8),
}

impl Operand {
    /// Listing text for this operand
    ///
    /// `label` is the label of the code address for `Code` operands, if any.
    pub fn render(&self, map: &RegisterMap, label: Option<&str>) -> String {
        match *self {
            Operand::Accumulator => "A".to_string(),
            Operand::Register(n) => format!("R{n}"),
            Operand::IndirectRegister(n) => format!("@R{n}"),
            Operand::Immediate(value) => format!("#0x{value:02X}"),
            Operand::Immediate16(value) => format!("#0x{value:04X}"),
            Operand::Direct(address) => map.direct_label(address),
            Operand::Bit(location) => map.bit_label(location),
            Operand::NotBit(location) => format!("/{}", map.bit_label(location)),
            Operand::Carry => "C".to_string(),
            Operand::Dptr => "DPTR".to_string(),
            Operand::IndirectDptr => "@DPTR".to_string(),
            Operand::IndexedDptr => "@A+DPTR".to_string(),
            Operand::IndexedPc => "@A+PC".to_string(),
            Operand::AccB => "AB".to_string(),
            Operand::Code(address) => match label {
                Some(label) => label.to_string(),
                None => format!("0x{address:04X}"),
            },
            Operand::Byte(value) => format!("0x{value:02X}"),
        }
    }

    pub fn code_target(&self) -> Option<u16> {
        match *self {
            Operand::Code(address) => Some(address),
            _ => None,
        }
    }
}
