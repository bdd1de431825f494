//! Unit tests for the Money module
//!
//! Tests cover money creation, arithmetic, currency handling, the rounding
//! policy for derived amounts, and rate application.

use core_kernel::{round_amount, Currency, Money, MoneyError, Rate, AMOUNT_EPSILON};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

mod creation {
    use super::*;

    #[test]
    fn test_new_creates_money_with_correct_amount() {
        let m = Money::new(dec!(100.50), Currency::CHF);
        assert_eq!(m.amount(), dec!(100.50));
        assert_eq!(m.currency(), Currency::CHF);
    }

    #[test]
    fn test_new_rounds_to_two_decimal_places() {
        let m = Money::new(dec!(100.123456), Currency::CHF);
        assert_eq!(m.amount(), dec!(100.12));
    }

    #[test]
    fn test_from_minor_converts_rappen_correctly() {
        let m = Money::from_minor(10050, Currency::CHF);
        assert_eq!(m.amount(), dec!(100.50));
    }

    #[test]
    fn test_zero_is_zero() {
        let m = Money::zero(Currency::EUR);
        assert!(m.is_zero());
        assert!(!m.is_positive());
        assert!(!m.is_negative());
    }

    #[test]
    fn test_default_currency_is_chf() {
        assert_eq!(Currency::default(), Currency::CHF);
    }
}

mod arithmetic {
    use super::*;

    #[test]
    fn test_addition_and_subtraction() {
        let a = Money::new(dec!(100.00), Currency::CHF);
        let b = Money::new(dec!(37.45), Currency::CHF);

        assert_eq!((a + b).amount(), dec!(137.45));
        assert_eq!((a - b).amount(), dec!(62.55));
    }

    #[test]
    fn test_negation() {
        let m = Money::new(dec!(25.00), Currency::CHF);
        assert_eq!((-m).amount(), dec!(-25.00));
        assert!((-m).is_negative());
    }

    #[test]
    fn test_abs() {
        let m = Money::new(dec!(-13.20), Currency::CHF);
        assert_eq!(m.abs().amount(), dec!(13.20));
    }

    #[test]
    fn test_multiply_rounds_result() {
        let m = Money::new(dec!(10.00), Currency::CHF);
        assert_eq!(m.multiply(dec!(0.333)).amount(), dec!(3.33));
    }

    #[test]
    fn test_checked_add_rejects_currency_mismatch() {
        let chf = Money::new(dec!(100.00), Currency::CHF);
        let eur = Money::new(dec!(100.00), Currency::EUR);

        assert!(matches!(
            chf.checked_add(&eur),
            Err(MoneyError::CurrencyMismatch(_, _))
        ));
        assert!(matches!(
            chf.checked_sub(&eur),
            Err(MoneyError::CurrencyMismatch(_, _))
        ));
    }
}

mod currency {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for currency in [Currency::CHF, Currency::EUR, Currency::USD, Currency::GBP] {
            assert_eq!(currency.code().parse::<Currency>().unwrap(), currency);
        }
    }

    #[test]
    fn test_unknown_code_is_rejected() {
        assert!(matches!(
            "JPY".parse::<Currency>(),
            Err(MoneyError::UnknownCurrency(_))
        ));
    }

    #[test]
    fn test_display_includes_code() {
        let m = Money::new(dec!(12.30), Currency::EUR);
        assert_eq!(m.to_string(), "EUR 12.30");
    }
}

mod rounding {
    use super::*;

    #[test]
    fn test_round_amount_half_away_from_zero() {
        assert_eq!(round_amount(dec!(2.675)), dec!(2.68));
        assert_eq!(round_amount(dec!(2.674)), dec!(2.67));
        assert_eq!(round_amount(dec!(-2.675)), dec!(-2.68));
    }

    #[test]
    fn test_round_amount_leaves_two_dp_values_unchanged() {
        assert_eq!(round_amount(dec!(19.99)), dec!(19.99));
    }

    #[test]
    fn test_epsilon_absorbs_rounding_residue() {
        // A VAT split of 107.70 at 7.7% leaves at most half a cent
        let residue = dec!(107.70) - (dec!(99.41) + dec!(8.29));
        assert!(residue.abs() <= AMOUNT_EPSILON);
    }
}

mod rate {
    use super::*;

    #[test]
    fn test_from_percentage() {
        let rate = Rate::from_percentage(dec!(7.7));
        assert_eq!(rate.as_decimal(), dec!(0.077));
        assert_eq!(rate.as_percentage(), dec!(7.7));
    }

    #[test]
    fn test_apply_rounds_per_policy() {
        let rate = Rate::from_percentage(dec!(7.7));
        assert_eq!(rate.apply(dec!(107.70)), dec!(8.29));

        let rate = Rate::from_percentage(dec!(50));
        assert_eq!(rate.apply(dec!(0.03)), dec!(0.02));
    }

    #[test]
    fn test_zero_rate() {
        let rate = Rate::new(Decimal::ZERO);
        assert!(rate.is_zero());
        assert_eq!(rate.apply(dec!(1000)), dec!(0));
    }
}
