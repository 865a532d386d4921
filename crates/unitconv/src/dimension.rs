use std::{
    fmt::{self, Display, Formatter},
    ops::Neg,
};

use rust_decimal::Decimal;

use crate::{Dimension, Unit};

impl Dimension {
    pub const NONE: Self = Self {
        length: 0,
        mass: 0,
        time: 0,
        amount: 0,
    };

    /// The dimension separating an amount of substance from its mass: converting along it requires multiplying by a
    /// molecular weight (g/mol)
    pub const AMOUNT_PER_MASS: Self = Self {
        length: 0,
        mass: -1,
        time: 0,
        amount: 1,
    };

    pub(crate) fn checked_add(self, rhs: Self) -> Option<Self> {
        Some(Self {
            length: self.length.checked_add(rhs.length)?,
            mass: self.mass.checked_add(rhs.mass)?,
            time: self.time.checked_add(rhs.time)?,
            amount: self.amount.checked_add(rhs.amount)?,
        })
    }

    pub(crate) fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.checked_add(rhs.checked_neg()?)
    }

    pub(crate) fn checked_mul(self, exponent: i32) -> Option<Self> {
        Some(Self {
            length: self.length.checked_mul(exponent)?,
            mass: self.mass.checked_mul(exponent)?,
            time: self.time.checked_mul(exponent)?,
            amount: self.amount.checked_mul(exponent)?,
        })
    }

    fn checked_neg(self) -> Option<Self> {
        self.checked_mul(-1)
    }
}

impl Neg for Dimension {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            length: -self.length,
            mass: -self.mass,
            time: -self.time,
            amount: -self.amount,
        }
    }
}

// NOTE: Formats dimensions using base-unit symbols in UCUM style, e.g. `m-3.mol` for a molar concentration
impl Display for Dimension {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let terms: Vec<_> = [
            ("m", self.length),
            ("g", self.mass),
            ("s", self.time),
            ("mol", self.amount),
        ]
        .into_iter()
        .filter(|&(_, exponent)| exponent != 0)
        .map(|(symbol, exponent)| {
            if exponent == 1 {
                symbol.to_owned()
            } else {
                format!("{symbol}{exponent}")
            }
        })
        .collect();

        if terms.is_empty() {
            write!(f, "1")
        } else {
            write!(f, "{}", terms.join("."))
        }
    }
}

// ---------------------------------------------------------------------------------------------------------------------

impl Unit {
    pub const ONE: Self = Self {
        factor: Decimal::ONE,
        dimension: Dimension::NONE,
    };

    pub(crate) const fn new_base(factor: Decimal, dimension: Dimension) -> Self {
        Self { factor, dimension }
    }

    #[must_use]
    pub const fn factor(&self) -> Decimal {
        self.factor
    }

    #[must_use]
    pub const fn dimension(&self) -> Dimension {
        self.dimension
    }

    #[must_use]
    pub fn is_commensurable_with(&self, other: &Self) -> bool {
        self.dimension == other.dimension
    }

    pub(crate) fn checked_mul(self, rhs: Self) -> Option<Self> {
        Self::non_zero(
            self.factor.checked_mul(rhs.factor)?,
            self.dimension.checked_add(rhs.dimension)?,
        )
    }

    pub(crate) fn checked_div(self, rhs: Self) -> Option<Self> {
        Self::non_zero(
            self.factor.checked_div(rhs.factor)?,
            self.dimension.checked_sub(rhs.dimension)?,
        )
    }

    pub(crate) fn checked_powi(self, exponent: i32) -> Option<Self> {
        Self::non_zero(
            checked_powi(self.factor, exponent)?,
            self.dimension.checked_mul(exponent)?,
        )
    }

    // NOTE: `Decimal` rounds products that are too small to represent down to zero, and a unit with a zero factor
    // can't be converted into or out of, so that's treated the same as overflowing
    fn non_zero(factor: Decimal, dimension: Dimension) -> Option<Self> {
        (!factor.is_zero()).then_some(Self { factor, dimension })
    }
}

// NOTE: Exponentiation by squaring, so that huge exponents of 1 don't take forever
fn checked_powi(base: Decimal, exponent: i32) -> Option<Decimal> {
    let mut result = Decimal::ONE;
    let mut square = base;
    let mut remaining = exponent.unsigned_abs();
    while remaining > 0 {
        if remaining & 1 == 1 {
            result = result.checked_mul(square)?;
        }
        remaining >>= 1;
        if remaining > 0 {
            square = square.checked_mul(square)?;
        }
    }

    if exponent < 0 {
        Decimal::ONE.checked_div(result)
    } else {
        Some(result)
    }
}
