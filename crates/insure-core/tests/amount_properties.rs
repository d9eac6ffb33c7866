//! Property tests for money arithmetic.

use insure_core::{Amount, AmountError, Currency};
use proptest::prelude::*;

fn cad() -> Currency {
    Currency::new("CAD").unwrap()
}

proptest! {
    #[test]
    fn add_then_sub_restores_original(a in 0u64..=u32::MAX as u64, b in 0u64..=u32::MAX as u64) {
        let x = Amount::new(a, cad());
        let y = Amount::new(b, cad());
        let sum = x.checked_add(&y).unwrap();
        prop_assert_eq!(sum.checked_sub(&y).unwrap(), x);
    }

    #[test]
    fn sub_never_goes_negative(a in any::<u64>(), b in any::<u64>()) {
        let x = Amount::new(a, cad());
        let y = Amount::new(b, cad());
        match x.checked_sub(&y) {
            Ok(diff) => prop_assert!(a >= b && diff.quantity == a - b),
            Err(AmountError::Underflow { .. }) => prop_assert!(a < b),
            Err(other) => prop_assert!(false, "unexpected error {other:?}"),
        }
    }

    #[test]
    fn display_reparses_to_minor_units(q in 0u64..10_000_000_000u64) {
        let rendered = Amount::new(q, cad()).to_string();
        let number = rendered.trim_end_matches(" CAD");
        let (major, minor) = number.split_once('.').unwrap();
        prop_assert_eq!(minor.len(), 2);
        let back = major.parse::<u64>().unwrap() * 100 + minor.parse::<u64>().unwrap();
        prop_assert_eq!(back, q);
    }
}

#[test]
fn amount_serializes_with_currency_code() {
    let premium = Amount::from_major(1000, cad()).unwrap();
    let json = serde_json::to_value(&premium).unwrap();
    assert_eq!(json, serde_json::json!({"quantity": 100000, "currency": "CAD"}));
}
