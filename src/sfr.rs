//! Special function register descriptor tables
//!
//! Static tables describing every named register, named bit and 16-bit
//! register pair of the supported chips, plus the validated lookup map built
//! from them once per variant.
//!
//! # SFR window
//!
//! | Range       | Contents                                   |
//! |-------------|--------------------------------------------|
//! | 0x00 - 0x7F | Internal RAM (direct and indirect access)  |
//! | 0x80 - 0xFF | SFRs (direct access only)                  |
//!
//! Registers whose address is a multiple of 8 are bit-addressable; bit
//! addresses 0x80-0xFF select `address & 0xF8`, bit `address & 7`.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::config::Variant;
use crate::error::ConfigError;

/// First address of the SFR window
pub const SFR_BASE: u8 = 0x80;

/// Named register with its direct address and reset value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDescriptor {
    pub name: &'static str,
    pub address: u8,
    pub reset: u8,
}

/// Named bit inside a register
///
/// Whether bit instructions reach it is not stored here. It follows from
/// the owner's address: SFRs at a multiple of 8 and RAM 0x20-0x2F are
/// bit addressable, see `BitLocation::is_bit_addressable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitDescriptor {
    pub name: &'static str,
    pub register: &'static str,
    pub bit: u8,
}

/// Two registers read and written as one big-endian 16-bit value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Composite16Descriptor {
    pub name: &'static str,
    pub high: &'static str,
    pub low: &'static str,
}

const fn reg(name: &'static str, address: u8, reset: u8) -> RegisterDescriptor {
    RegisterDescriptor { name, address, reset }
}

const fn bit(name: &'static str, register: &'static str, bit: u8) -> BitDescriptor {
    BitDescriptor { name, register, bit }
}

const fn pair(name: &'static str, high: &'static str, low: &'static str) -> Composite16Descriptor {
    Composite16Descriptor { name, high, low }
}

/// SFR addresses used by the core
pub mod addr {
    pub const P0: u8 = 0x80;
    pub const SP: u8 = 0x81;
    pub const DPL: u8 = 0x82;
    pub const DPH: u8 = 0x83;
    pub const PCON: u8 = 0x87;
    pub const TCON: u8 = 0x88;
    pub const TMOD: u8 = 0x89;
    pub const TL0: u8 = 0x8A;
    pub const TL1: u8 = 0x8B;
    pub const TH0: u8 = 0x8C;
    pub const TH1: u8 = 0x8D;
    pub const P1: u8 = 0x90;
    pub const S0CON: u8 = 0x98;
    pub const S0BUF: u8 = 0x99;
    pub const P2: u8 = 0xA0;
    pub const IEN0: u8 = 0xA8;
    pub const CML0: u8 = 0xA9;
    pub const CTL0: u8 = 0xAC;
    pub const P3: u8 = 0xB0;
    pub const IP0: u8 = 0xB8;
    pub const P4: u8 = 0xC0;
    pub const P5: u8 = 0xC4;
    pub const ADCON: u8 = 0xC5;
    pub const ADCH: u8 = 0xC6;
    pub const TM2IR: u8 = 0xC8;
    pub const CMH0: u8 = 0xC9;
    pub const CTH0: u8 = 0xCC;
    pub const PSW: u8 = 0xD0;
    pub const S1CON: u8 = 0xD8;
    pub const S1STA: u8 = 0xD9;
    pub const S1DAT: u8 = 0xDA;
    pub const S1ADR: u8 = 0xDB;
    pub const ACC: u8 = 0xE0;
    pub const IEN1: u8 = 0xE8;
    pub const TM2CON: u8 = 0xEA;
    pub const CTCON: u8 = 0xEB;
    pub const TML2: u8 = 0xEC;
    pub const TMH2: u8 = 0xED;
    pub const STE: u8 = 0xEE;
    pub const RTE: u8 = 0xEF;
    pub const B: u8 = 0xF0;
    pub const IP1: u8 = 0xF8;
    pub const PWM0: u8 = 0xFC;
    pub const PWM1: u8 = 0xFD;
    pub const PWMP: u8 = 0xFE;
    pub const T3: u8 = 0xFF;
}

// ========== 8051 core ==========

const CORE_REGISTERS: &[RegisterDescriptor] = &[
    reg("P0", addr::P0, 0xFF),
    reg("SP", addr::SP, 0x07),
    reg("DPL", addr::DPL, 0x00),
    reg("DPH", addr::DPH, 0x00),
    reg("PCON", addr::PCON, 0x00),
    reg("TCON", addr::TCON, 0x00),
    reg("TMOD", addr::TMOD, 0x00),
    reg("TL0", addr::TL0, 0x00),
    reg("TL1", addr::TL1, 0x00),
    reg("TH0", addr::TH0, 0x00),
    reg("TH1", addr::TH1, 0x00),
    reg("P1", addr::P1, 0xFF),
    reg("S0CON", addr::S0CON, 0x00),
    reg("S0BUF", addr::S0BUF, 0x00),
    reg("P2", addr::P2, 0xFF),
    reg("IEN0", addr::IEN0, 0x00),
    reg("P3", addr::P3, 0xFF),
    reg("IP0", addr::IP0, 0x00),
    reg("PSW", addr::PSW, 0x00),
    reg("ACC", addr::ACC, 0x00),
    reg("B", addr::B, 0x00),
];

const CORE_BITS: &[BitDescriptor] = &[
    bit("SMOD", "PCON", 7),
    bit("GF1", "PCON", 3),
    bit("GF0", "PCON", 2),
    bit("PD", "PCON", 1),
    bit("IDL", "PCON", 0),
    bit("TF1", "TCON", 7),
    bit("TR1", "TCON", 6),
    bit("TF0", "TCON", 5),
    bit("TR0", "TCON", 4),
    bit("IE1", "TCON", 3),
    bit("IT1", "TCON", 2),
    bit("IE0", "TCON", 1),
    bit("IT0", "TCON", 0),
    bit("SM0", "S0CON", 7),
    bit("SM1", "S0CON", 6),
    bit("SM2", "S0CON", 5),
    bit("REN", "S0CON", 4),
    bit("TB8", "S0CON", 3),
    bit("RB8", "S0CON", 2),
    bit("TI", "S0CON", 1),
    bit("RI", "S0CON", 0),
    bit("EA", "IEN0", 7),
    bit("ES0", "IEN0", 4),
    bit("ET1", "IEN0", 3),
    bit("EX1", "IEN0", 2),
    bit("ET0", "IEN0", 1),
    bit("EX0", "IEN0", 0),
    bit("RD", "P3", 7),
    bit("WR", "P3", 6),
    bit("T1", "P3", 5),
    bit("T0", "P3", 4),
    bit("INT1", "P3", 3),
    bit("INT0", "P3", 2),
    bit("TXD", "P3", 1),
    bit("RXD", "P3", 0),
    bit("PS0", "IP0", 4),
    bit("PT1", "IP0", 3),
    bit("PX1", "IP0", 2),
    bit("PT0", "IP0", 1),
    bit("PX0", "IP0", 0),
    bit("CY", "PSW", 7),
    bit("AC", "PSW", 6),
    bit("F0", "PSW", 5),
    bit("RS1", "PSW", 4),
    bit("RS0", "PSW", 3),
    bit("OV", "PSW", 2),
    bit("F1", "PSW", 1),
    bit("P", "PSW", 0),
];

const CORE_COMPOSITES: &[Composite16Descriptor] = &[
    pair("DPTR", "DPH", "DPL"),
    pair("TIMER0", "TH0", "TL0"),
    pair("TIMER1", "TH1", "TL1"),
];

// ========== 80C552 additions ==========

const C552_REGISTERS: &[RegisterDescriptor] = &[
    reg("CML0", addr::CML0, 0x00),
    reg("CML1", 0xAA, 0x00),
    reg("CML2", 0xAB, 0x00),
    reg("CTL0", addr::CTL0, 0x00),
    reg("CTL1", 0xAD, 0x00),
    reg("CTL2", 0xAE, 0x00),
    reg("CTL3", 0xAF, 0x00),
    reg("P4", addr::P4, 0xFF),
    reg("P5", addr::P5, 0xFF),
    reg("ADCON", addr::ADCON, 0x00),
    reg("ADCH", addr::ADCH, 0x00),
    reg("TM2IR", addr::TM2IR, 0x00),
    reg("CMH0", addr::CMH0, 0x00),
    reg("CMH1", 0xCA, 0x00),
    reg("CMH2", 0xCB, 0x00),
    reg("CTH0", addr::CTH0, 0x00),
    reg("CTH1", 0xCD, 0x00),
    reg("CTH2", 0xCE, 0x00),
    reg("CTH3", 0xCF, 0x00),
    reg("S1CON", addr::S1CON, 0x00),
    reg("S1STA", addr::S1STA, 0xF8),
    reg("S1DAT", addr::S1DAT, 0x00),
    reg("S1ADR", addr::S1ADR, 0x00),
    reg("IEN1", addr::IEN1, 0x00),
    reg("TM2CON", addr::TM2CON, 0x00),
    reg("CTCON", addr::CTCON, 0x00),
    reg("TML2", addr::TML2, 0x00),
    reg("TMH2", addr::TMH2, 0x00),
    reg("STE", addr::STE, 0xC0),
    reg("RTE", addr::RTE, 0x00),
    reg("IP1", addr::IP1, 0x00),
    reg("PWM0", addr::PWM0, 0x00),
    reg("PWM1", addr::PWM1, 0x00),
    reg("PWMP", addr::PWMP, 0x00),
    reg("T3", addr::T3, 0x00),
];

const C552_BITS: &[BitDescriptor] = &[
    bit("WLE", "PCON", 4),
    bit("EAD", "IEN0", 6),
    bit("ES1", "IEN0", 5),
    bit("PAD", "IP0", 6),
    bit("PS1", "IP0", 5),
    bit("CT0I", "P1", 0),
    bit("CT1I", "P1", 1),
    bit("CT2I", "P1", 2),
    bit("CT3I", "P1", 3),
    bit("T2", "P1", 4),
    bit("RT2", "P1", 5),
    bit("SCL", "P1", 6),
    bit("SDA", "P1", 7),
    bit("ADC1", "ADCON", 7),
    bit("ADC0", "ADCON", 6),
    bit("ADEX", "ADCON", 5),
    bit("ADCI", "ADCON", 4),
    bit("ADCS", "ADCON", 3),
    bit("AADR2", "ADCON", 2),
    bit("AADR1", "ADCON", 1),
    bit("AADR0", "ADCON", 0),
    bit("T2OV", "TM2IR", 7),
    bit("CMI2", "TM2IR", 6),
    bit("CMI1", "TM2IR", 5),
    bit("CMI0", "TM2IR", 4),
    bit("CTI3", "TM2IR", 3),
    bit("CTI2", "TM2IR", 2),
    bit("CTI1", "TM2IR", 1),
    bit("CTI0", "TM2IR", 0),
    bit("CR2", "S1CON", 7),
    bit("ENS1", "S1CON", 6),
    bit("STA", "S1CON", 5),
    bit("STO", "S1CON", 4),
    bit("SI", "S1CON", 3),
    bit("AA", "S1CON", 2),
    bit("CR1", "S1CON", 1),
    bit("CR0", "S1CON", 0),
    bit("ET2", "IEN1", 7),
    bit("ECM2", "IEN1", 6),
    bit("ECM1", "IEN1", 5),
    bit("ECM0", "IEN1", 4),
    bit("ECT3", "IEN1", 3),
    bit("ECT2", "IEN1", 2),
    bit("ECT1", "IEN1", 1),
    bit("ECT0", "IEN1", 0),
    bit("T2IS1", "TM2CON", 7),
    bit("T2IS0", "TM2CON", 6),
    bit("T2ER", "TM2CON", 5),
    bit("T2B0", "TM2CON", 4),
    bit("T2P1", "TM2CON", 3),
    bit("T2P0", "TM2CON", 2),
    bit("T2MS1", "TM2CON", 1),
    bit("T2MS0", "TM2CON", 0),
    bit("PT2", "IP1", 7),
    bit("PCM2", "IP1", 6),
    bit("PCM1", "IP1", 5),
    bit("PCM0", "IP1", 4),
    bit("PCT3", "IP1", 3),
    bit("PCT2", "IP1", 2),
    bit("PCT1", "IP1", 1),
    bit("PCT0", "IP1", 0),
];

const C552_COMPOSITES: &[Composite16Descriptor] = &[
    pair("TIMER2", "TMH2", "TML2"),
    pair("CT0", "CTH0", "CTL0"),
    pair("CT1", "CTH1", "CTL1"),
    pair("CT2", "CTH2", "CTL2"),
    pair("CT3", "CTH3", "CTL3"),
    pair("CM0", "CMH0", "CML0"),
    pair("CM1", "CMH1", "CML1"),
    pair("CM2", "CMH2", "CML2"),
];

/// Location of a single bit in the direct address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitLocation {
    pub address: u8,
    pub bit: u8,
}

impl BitLocation {
    pub const fn new(address: u8, bit: u8) -> Self {
        Self { address, bit }
    }

    /// Decode an 8051 bit address (operand of SETB/CLR/JB/...)
    pub const fn from_bit_address(bit_address: u8) -> Self {
        let address = if bit_address < 0x80 {
            0x20 + bit_address / 8
        } else {
            bit_address & 0xF8
        };
        Self {
            address,
            bit: bit_address & 0x07,
        }
    }

    /// Bit address reaching this location, if bit instructions can reach it
    pub fn bit_address(self) -> Option<u8> {
        if (0x20..0x30).contains(&self.address) {
            Some((self.address - 0x20) * 8 + self.bit)
        } else if self.address >= SFR_BASE && self.address % 8 == 0 {
            Some(self.address | self.bit)
        } else {
            None
        }
    }

    /// True when SETB/CLR/CPL/JB and friends can name this bit directly;
    /// other bits change only through byte writes to their owner
    pub fn is_bit_addressable(self) -> bool {
        self.bit_address().is_some()
    }

    pub const fn mask(self) -> u8 {
        1 << self.bit
    }
}

/// Validated register, bit and composite lookup tables for one chip
#[derive(Debug)]
pub struct RegisterMap {
    variant: Variant,
    registers: Vec<RegisterDescriptor>,
    by_name: HashMap<&'static str, u8>,
    names: HashMap<u8, &'static str>,
    bits: HashMap<&'static str, BitLocation>,
    bit_names: HashMap<BitLocation, &'static str>,
    composites: Vec<(&'static str, u8, u8)>,
    containing: HashMap<u8, Vec<&'static str>>,
}

impl RegisterMap {
    /// Build and validate a map from descriptor tables
    pub fn new(
        variant: Variant,
        registers: &[RegisterDescriptor],
        bits: &[BitDescriptor],
        composites: &[Composite16Descriptor],
    ) -> Result<Self, ConfigError> {
        let mut by_name = HashMap::new();
        let mut names: HashMap<u8, &'static str> = HashMap::new();
        for desc in registers {
            if desc.address < SFR_BASE {
                return Err(ConfigError::OutsideSfrWindow {
                    name: desc.name.to_string(),
                    address: desc.address as u16,
                });
            }
            if let Some(existing) = names.get(&desc.address) {
                return Err(ConfigError::DuplicateAddress {
                    name: desc.name.to_string(),
                    address: desc.address as u16,
                    existing: existing.to_string(),
                });
            }
            if by_name.insert(desc.name, desc.address).is_some() {
                return Err(ConfigError::DuplicateName(desc.name.to_string()));
            }
            names.insert(desc.address, desc.name);
        }

        let mut bit_map = HashMap::new();
        let mut bit_names = HashMap::new();
        for desc in bits {
            let address = *by_name
                .get(desc.register)
                .ok_or_else(|| ConfigError::UnknownRegister(desc.register.to_string()))?;
            if desc.bit > 7 {
                return Err(ConfigError::BitOutOfRange {
                    name: desc.name.to_string(),
                    bit: desc.bit,
                });
            }
            let location = BitLocation::new(address, desc.bit);
            if bit_map.insert(desc.name, location).is_some() {
                return Err(ConfigError::DuplicateName(desc.name.to_string()));
            }
            bit_names.insert(location, desc.name);
        }

        let mut pairs = Vec::with_capacity(composites.len());
        let mut containing: HashMap<u8, Vec<&'static str>> = HashMap::new();
        for desc in composites {
            let high = *by_name
                .get(desc.high)
                .ok_or_else(|| ConfigError::UnknownRegister(desc.high.to_string()))?;
            let low = *by_name
                .get(desc.low)
                .ok_or_else(|| ConfigError::UnknownRegister(desc.low.to_string()))?;
            if pairs.iter().any(|(name, _, _)| *name == desc.name) {
                return Err(ConfigError::DuplicateName(desc.name.to_string()));
            }
            pairs.push((desc.name, high, low));
            containing.entry(high).or_default().push(desc.name);
            containing.entry(low).or_default().push(desc.name);
        }

        Ok(Self {
            variant,
            registers: registers.to_vec(),
            by_name,
            names,
            bits: bit_map,
            bit_names,
            composites: pairs,
            containing,
        })
    }

    /// Shared map for a chip variant, built on first use
    pub fn for_variant(variant: Variant) -> &'static RegisterMap {
        static MCS51: OnceLock<RegisterMap> = OnceLock::new();
        static C552: OnceLock<RegisterMap> = OnceLock::new();
        let cell = match variant {
            Variant::Mcs51 => &MCS51,
            Variant::C552 => &C552,
        };
        cell.get_or_init(|| {
            Self::builtin(variant)
                .unwrap_or_else(|err| panic!("built-in {} register table: {err}", variant.name()))
        })
    }

    fn builtin(variant: Variant) -> Result<Self, ConfigError> {
        match variant {
            Variant::Mcs51 => Self::new(variant, CORE_REGISTERS, CORE_BITS, CORE_COMPOSITES),
            Variant::C552 => {
                let registers: Vec<_> = CORE_REGISTERS.iter().chain(C552_REGISTERS).copied().collect();
                let bits: Vec<_> = CORE_BITS.iter().chain(C552_BITS).copied().collect();
                let composites: Vec<_> = CORE_COMPOSITES.iter().chain(C552_COMPOSITES).copied().collect();
                Self::new(variant, &registers, &bits, &composites)
            }
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn registers(&self) -> &[RegisterDescriptor] {
        &self.registers
    }

    pub fn address_of(&self, name: &str) -> Result<u8, ConfigError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownRegister(name.to_string()))
    }

    /// Register name at an SFR address, if one is declared
    pub fn name_at(&self, address: u8) -> Option<&'static str> {
        self.names.get(&address).copied()
    }

    /// Resolve a bit name
    ///
    /// Accepts declared bit names (`TF0`), `REG.n` for any declared register
    /// and `RAM_xx.n` for internal RAM bytes below 0x80.
    pub fn bit(&self, name: &str) -> Result<BitLocation, ConfigError> {
        if let Some(location) = self.bits.get(name) {
            return Ok(*location);
        }
        let unknown = || ConfigError::UnknownBit(name.to_string());
        let (owner, index) = name.rsplit_once('.').ok_or_else(unknown)?;
        let bit: u8 = index.parse().map_err(|_| unknown())?;
        if bit > 7 {
            return Err(unknown());
        }
        let address = match owner.strip_prefix("RAM_") {
            Some(hex) => match u8::from_str_radix(hex, 16) {
                Ok(address) if address < SFR_BASE => address,
                _ => return Err(unknown()),
            },
            None => self.by_name.get(owner).copied().ok_or_else(unknown)?,
        };
        Ok(BitLocation::new(address, bit))
    }

    /// Declared name of a bit, if any
    pub fn bit_name(&self, location: BitLocation) -> Option<&'static str> {
        self.bit_names.get(&location).copied()
    }

    /// All declared bits
    pub fn bits(&self) -> impl Iterator<Item = (&'static str, BitLocation)> + '_ {
        self.bits.iter().map(|(name, location)| (*name, *location))
    }

    /// High and low register addresses of a 16-bit pair
    pub fn composite(&self, name: &str) -> Result<(u8, u8), ConfigError> {
        self.composites
            .iter()
            .find(|(n, _, _)| *n == name)
            .map(|(_, high, low)| (*high, *low))
            .ok_or_else(|| ConfigError::UnknownComposite(name.to_string()))
    }

    pub fn composite_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.composites.iter().map(|(name, _, _)| *name)
    }

    /// 16-bit pairs that include the register at `address`
    pub fn composites_containing(&self, address: u8) -> &[&'static str] {
        self.containing.get(&address).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Display name for a direct address: the SFR name or `RAM_xx`
    pub fn direct_label(&self, address: u8) -> String {
        match self.name_at(address) {
            Some(name) if address >= SFR_BASE => name.to_string(),
            _ => format!("RAM_{:02X}", address),
        }
    }

    /// Display name for a bit: its declared name, `REG.n` or `RAM_xx.n`
    pub fn bit_label(&self, location: BitLocation) -> String {
        if let Some(name) = self.bit_name(location) {
            return name.to_string();
        }
        format!("{}.{}", self.direct_label(location.address), location.bit)
    }
}
