use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const EUR_CURRENCY_CODE: &str = "EUR";
pub const EUR_CURRENCY_CODE_LOWER: &str = "eur";

//--------------------------------------        Eur        -----------------------------------------------------------
/// A monetary amount in euro cents.
///
/// All amounts in the engine are a whole number of cents. Keeping the representation integral makes every ledger
/// posting exact and replayable; fractional arithmetic only happens inside [`Eur::share_of`], which rounds half away
/// from zero.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Eur(i64);

op!(binary Eur, Add, add);
op!(binary Eur, Sub, sub);
op!(inplace Eur, SubAssign, sub_assign);
op!(unary Eur, Neg, neg);

impl Mul<i64> for Eur {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Eur {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in euro cents: {0}")]
pub struct EurConversionError(String);

impl From<i64> for Eur {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Eur {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Eur {}

impl TryFrom<u64> for Eur {
    type Error = EurConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(EurConversionError(format!("Value {} is too large to convert to Eur", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Eur {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02} €", cents / 100, cents % 100)
    }
}

impl Eur {
    pub const fn value(&self) -> i64 {
        self.0
    }

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn from_euros(euros: i64) -> Self {
        Self(euros * 100)
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The proportional share of `self` attributable to `part` out of `whole`, i.e. `self * part / whole`.
    ///
    /// Intermediate products are widened to `i128`, and the quotient is rounded half away from zero.
    /// A non-positive `whole` yields zero rather than a division error.
    pub fn share_of(&self, part: Eur, whole: Eur) -> Eur {
        if whole.0 <= 0 {
            return Eur::default();
        }
        let num = self.0 as i128 * part.0 as i128;
        let den = whole.0 as i128;
        let half = if num >= 0 { den / 2 } else { -(den / 2) };
        #[allow(clippy::cast_possible_truncation)]
        Eur(((num + half) / den) as i64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_formats_cents() {
        assert_eq!(Eur::from_cents(3520).to_string(), "35.20 €");
        assert_eq!(Eur::from_cents(5).to_string(), "0.05 €");
        assert_eq!(Eur::from_cents(-1250).to_string(), "-12.50 €");
    }

    #[test]
    fn share_of_rounds_half_away_from_zero() {
        // 10.00 € discount, item 40.00 € of a 100.00 € order -> 4.00 €
        let share = Eur::from_euros(10).share_of(Eur::from_euros(40), Eur::from_euros(100));
        assert_eq!(share, Eur::from_cents(400));
        // 0.01 € * 1/2 rounds up to a cent
        let share = Eur::from_cents(1).share_of(Eur::from_cents(1), Eur::from_cents(2));
        assert_eq!(share, Eur::from_cents(1));
    }

    #[test]
    fn share_of_zero_order_total_is_zero() {
        let share = Eur::from_euros(10).share_of(Eur::from_euros(40), Eur::default());
        assert_eq!(share, Eur::default());
    }
}
