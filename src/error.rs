//! Error types
//!
//! - `ConfigError`: unknown register/bit names and malformed descriptor tables
//! - `DisasmError`: opcode bytes that cannot be decoded
//! - `ListingError`: listing collection invariants and listing text parsing
//! - `ExecError`: instructions whose operands cannot be resolved
//! - `SimError`: everything the simulator driver loop can surface

use thiserror::Error;

use crate::listing::ListingCollection;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown register `{0}`")]
    UnknownRegister(String),
    #[error("unknown bit `{0}`")]
    UnknownBit(String),
    #[error("unknown 16-bit register `{0}`")]
    UnknownComposite(String),
    #[error("register `{name}` at {address:#04x} collides with `{existing}`")]
    DuplicateAddress {
        name: String,
        address: u16,
        existing: String,
    },
    #[error("name `{0}` is declared twice")]
    DuplicateName(String),
    #[error("bit index {bit} of `{name}` is out of range")]
    BitOutOfRange { name: String, bit: u8 },
    #[error("register `{name}` at {address:#04x} is outside the SFR window")]
    OutsideSfrWindow { name: String, address: u16 },
}

#[derive(Debug, Error)]
pub enum DisasmError {
    #[error("unknown opcode {opcode:#04x} at {address:#06x}")]
    UnknownOpcode { address: u16, opcode: u8 },
    #[error("instruction at {address:#06x} runs past the end of the image")]
    Truncated { address: u16 },
    #[error("no code at {0:#06x}")]
    OutOfImage(u16),
    #[error(transparent)]
    Listing(#[from] ListingError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A failed listing build, carrying the listing as far as it got
#[derive(Debug, Error)]
#[error("listing build stopped: {source}")]
pub struct BuildError {
    #[source]
    pub source: DisasmError,
    pub partial: ListingCollection,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListingError {
    #[error("address {0:#06x} is already listed")]
    DuplicateAddress(u16),
    #[error("label `{0}` is already used")]
    DuplicateLabel(String),
    #[error("entry at {address:#06x} overlaps code at {existing:#06x}")]
    Overlap { address: u16, existing: u16 },
    #[error("no entry at {0:#06x}")]
    NoEntry(u16),
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("{mnemonic} at {address:#06x}: operand {operand} cannot be used here")]
    InvalidOperand {
        address: u16,
        mnemonic: &'static str,
        operand: String,
    },
    #[error("{mnemonic} at {address:#06x}: missing operand {index}")]
    MissingOperand {
        address: u16,
        mnemonic: &'static str,
        index: usize,
    },
    #[error("{mnemonic} at {address:#06x} has no branch target")]
    MissingTarget { address: u16, mnemonic: &'static str },
    #[error("data entry at {0:#06x} cannot be executed")]
    DataEntry(u16),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Disasm(#[from] DisasmError),
    #[error(transparent)]
    Listing(#[from] ListingError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
