//! Property-Based Test Generators
//!
//! Proptest strategies for generating random test data that maintains the
//! ledger's invariants.

use chrono::{DateTime, Duration, TimeZone, Utc};
use core_kernel::Rate;
use domain_ledger::TransactionType;
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for positive two-decimal amounts up to 10'000'000.00
pub fn positive_amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for small positive amounts, useful where balances must cover
/// the generated debits
pub fn small_amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for simple credit types
pub fn credit_type_strategy() -> impl Strategy<Value = TransactionType> {
    prop_oneof![
        Just(TransactionType::Deposit),
        Just(TransactionType::ReversalCredit),
    ]
}

/// Strategy for simple debit types
pub fn debit_type_strategy() -> impl Strategy<Value = TransactionType> {
    prop_oneof![
        Just(TransactionType::Withdrawal),
        Just(TransactionType::ExternalTransfer),
    ]
}

/// Strategy for non-transfer transaction types
pub fn simple_type_strategy() -> impl Strategy<Value = TransactionType> {
    prop_oneof![credit_type_strategy(), debit_type_strategy()]
}

/// Strategy for VAT-style rates between 0% and 25%
pub fn rate_strategy() -> impl Strategy<Value = Rate> {
    (0u32..2500u32).prop_map(|basis_points| Rate::from_percentage(Decimal::new(basis_points as i64, 2)))
}

/// Strategy for instants within 2024
pub fn datetime_2024_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid datetime");
    (0i64..366 * 24 * 60).prop_map(move |minutes| start + Duration::minutes(minutes))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn positive_amounts_have_two_decimals(amount in positive_amount_strategy()) {
            prop_assert!(amount > Decimal::ZERO);
            prop_assert!(amount.scale() <= 2);
        }

        #[test]
        fn credit_and_debit_strategies_are_disjoint(
            credit in credit_type_strategy(),
            debit in debit_type_strategy(),
        ) {
            prop_assert!(credit.is_credit());
            prop_assert!(debit.is_debit());
        }

        #[test]
        fn generated_rates_stay_in_band(rate in rate_strategy()) {
            prop_assert!(rate.as_decimal() >= Decimal::ZERO);
            prop_assert!(rate.as_percentage() <= Decimal::from(25));
        }
    }
}
