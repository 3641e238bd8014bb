//! ALU flag properties
//!
//! The helpers are pure, so they are checked over their whole input space
//! with proptest instead of hand-picked values.

use super::*;
use proptest::prelude::*;

/// Two-digit value as packed BCD
fn bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

#[test]
fn test_add_ff_plus_one() {
    let (result, cy, ac, ov) = add_with_carry(0xFF, 0x01, false);
    assert_eq!(result, 0x00);
    assert!(cy);
    assert!(ac);
    assert!(!ov);
}

#[test]
fn test_subb_ff_minus_one() {
    // Subtraction borrows instead of carrying out
    let (result, cy, ac, ov) = sub_with_borrow(0xFF, 0x01, false);
    assert_eq!(result, 0xFE);
    assert!(!cy);
    assert!(!ac);
    assert!(!ov);
}

#[test]
fn test_decimal_adjust_examples() {
    assert_eq!(decimal_adjust(0x81, false, true), (0x87, false));
    assert_eq!(decimal_adjust(0x9A, false, false), (0x00, true));
    assert_eq!(decimal_adjust(0xA0, false, false), (0x00, true));
    // Carry in is never cleared
    assert_eq!(decimal_adjust(0x12, true, false), (0x72, true));
}

proptest! {
    #[test]
    fn add_matches_wide_arithmetic(a in any::<u8>(), b in any::<u8>(), c in any::<bool>()) {
        let (result, cy, ac, ov) = add_with_carry(a, b, c);
        let sum = a as u16 + b as u16 + c as u16;
        prop_assert_eq!(result, sum as u8);
        prop_assert_eq!(cy, sum > 0xFF);
        prop_assert_eq!(ac, (a & 0x0F) + (b & 0x0F) + c as u8 > 0x0F);
        let signed = a as i8 as i16 + b as i8 as i16 + c as i16;
        prop_assert_eq!(ov, !(-128..=127).contains(&signed));
    }

    #[test]
    fn subb_matches_wide_arithmetic(a in any::<u8>(), b in any::<u8>(), c in any::<bool>()) {
        let (result, cy, _, ov) = sub_with_borrow(a, b, c);
        let difference = a as i16 - b as i16 - c as i16;
        prop_assert_eq!(result, difference as u8);
        prop_assert_eq!(cy, difference < 0);
        let signed = a as i8 as i16 - b as i8 as i16 - c as i16;
        prop_assert_eq!(ov, !(-128..=127).contains(&signed));
    }

    #[test]
    fn subb_undoes_add(a in any::<u8>(), b in any::<u8>()) {
        let (sum, _, _, _) = add_with_carry(a, b, false);
        let (back, _, _, _) = sub_with_borrow(sum, b, false);
        prop_assert_eq!(back, a);
    }

    #[test]
    fn decimal_adjust_after_bcd_add(x in 0u8..100, y in 0u8..100) {
        let (sum, cy, ac, _) = add_with_carry(bcd(x), bcd(y), false);
        let (adjusted, carry) = decimal_adjust(sum, cy, ac);
        let total = x as u16 + y as u16;
        prop_assert_eq!(adjusted, bcd((total % 100) as u8));
        prop_assert_eq!(carry, total >= 100);
    }
}
