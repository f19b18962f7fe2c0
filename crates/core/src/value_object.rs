//! Value objects: equality by value, not identity.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Monetary amount in the smallest currency unit (e.g. cents).
///
/// All arithmetic is checked; overflow surfaces as a validation error instead of
/// wrapping silently into a wrong requisition total.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    /// Build a non-negative amount.
    pub fn from_minor(amount: i64) -> DomainResult<Self> {
        if amount < 0 {
            return Err(DomainError::validation("amount cannot be negative"));
        }
        Ok(Self(amount))
    }

    pub fn minor_units(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::validation("amount overflow"))
    }

    /// `self × quantity`, e.g. unit cost times requested quantity.
    pub fn times(self, quantity: i64) -> DomainResult<Money> {
        if quantity < 0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        self.0
            .checked_mul(quantity)
            .map(Money)
            .ok_or_else(|| DomainError::validation("amount overflow"))
    }

    /// Sum of an iterator of amounts, failing on overflow.
    pub fn sum<I>(amounts: I) -> DomainResult<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(matches!(
            Money::from_minor(-1),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn overflow_is_a_validation_error() {
        let big = Money::from_minor(i64::MAX).unwrap();
        assert!(big.times(2).is_err());
        assert!(big.checked_add(Money::from_minor(1).unwrap()).is_err());
    }

    #[test]
    fn displays_major_and_minor_units() {
        assert_eq!(Money::from_minor(1999).unwrap().to_string(), "19.99");
        assert_eq!(Money::from_minor(5).unwrap().to_string(), "0.05");
    }

    proptest! {
        #[test]
        fn sum_matches_integer_sum(values in prop::collection::vec(0i64..1_000_000, 0..20)) {
            let expected: i64 = values.iter().sum();
            let total = Money::sum(values.iter().map(|v| Money::from_minor(*v).unwrap())).unwrap();
            prop_assert_eq!(total.minor_units(), expected);
        }
    }
}
