//! PSW flag bit definitions
//!
//! Bit masks in the program status word. P is maintained by the bus from
//! the accumulator and is read-only for software.

/// Carry flag (bit 7)
pub const CY: u8 = 0b1000_0000;
/// Auxiliary carry (bit 6) - carry out of the low nibble
pub const AC: u8 = 0b0100_0000;
/// User flag 0 (bit 5)
pub const F0: u8 = 0b0010_0000;
/// Register bank select high (bit 4)
pub const RS1: u8 = 0b0001_0000;
/// Register bank select low (bit 3)
pub const RS0: u8 = 0b0000_1000;
/// Overflow flag (bit 2)
pub const OV: u8 = 0b0000_0100;
/// User flag 1 (bit 1)
pub const F1: u8 = 0b0000_0010;
/// Parity of ACC (bit 0)
pub const P: u8 = 0b0000_0001;
