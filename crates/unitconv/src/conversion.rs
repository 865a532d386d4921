use rust_decimal::Decimal;

use crate::{ConversionFailure, Dimension, Result, Unit, UnitDatabase, UnitError};

/// The outcome of an ordinary conversion attempt
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Conversion {
    Succeeded(Decimal),
    Failed(ConversionFailure),
}

impl Conversion {
    #[must_use]
    pub const fn value(&self) -> Option<Decimal> {
        match self {
            Self::Succeeded(value) => Some(*value),
            Self::Failed(_) => None,
        }
    }
}

impl UnitDatabase {
    /// Converts `value` from the unit expression `from` into the unit expression `to`.
    ///
    /// Units that measure the same dimension are converted by their factors alone. A mass and an amount of substance
    /// (e.g. `mg/dL` and `mmol/L`) can be interconverted only when a positive `molecular_weight` (in g/mol) is given.
    ///
    /// Everything that stops two units from being interconvertible is reported as a [`Conversion::Failed`], and only
    /// arithmetic overflow is returned as an `Err`.
    pub fn convert_unit_to(
        &self,
        from: &str,
        value: Decimal,
        to: &str,
        molecular_weight: Option<Decimal>,
    ) -> Result<Conversion> {
        let (from_unit, to_unit) = match (Unit::new(self, from), Unit::new(self, to)) {
            (Ok(from_unit), Ok(to_unit)) => (from_unit, to_unit),
            (Err(e), _) | (_, Err(e)) => return Ok(Conversion::Failed(ConversionFailure::InvalidUnit(e))),
        };

        let Some(molar_exponent) = molar_exponent(&from_unit, &to_unit) else {
            return Ok(Conversion::Failed(ConversionFailure::Incommensurable {
                from: from.to_owned(),
                from_dimension: from_unit.dimension().to_string(),
                to: to.to_owned(),
                to_dimension: to_unit.dimension().to_string(),
            }));
        };

        let molecular_weight = match (molar_exponent, molecular_weight) {
            (0, _) => None,
            (_, None) => {
                return Ok(Conversion::Failed(ConversionFailure::MissingMolecularWeight {
                    from: from.to_owned(),
                    to: to.to_owned(),
                }));
            }
            (_, Some(weight)) if weight <= Decimal::ZERO => {
                return Ok(Conversion::Failed(ConversionFailure::InvalidMolecularWeight(weight)));
            }
            (_, weight) => weight,
        };

        let (from_factor, to_factor) = match molecular_weight {
            Some(weight) if molar_exponent > 0 => (from_unit.factor().checked_mul(weight), Some(to_unit.factor())),
            Some(weight) => (Some(from_unit.factor()), to_unit.factor().checked_mul(weight)),
            None => (Some(from_unit.factor()), Some(to_unit.factor())),
        };
        let converted = from_factor
            .zip(to_factor)
            .and_then(|(from_factor, to_factor)| rescale(value, from_factor, to_factor))
            .ok_or_else(|| UnitError::overflow(value, from, to))?;

        Ok(Conversion::Succeeded(converted.normalize()))
    }
}

// NOTE: Scaling by an exact `from / to` ratio keeps every digit of `value`, but a repeating ratio (like `h / d`)
// would be rounded first, so those multiply by `from` before dividing by `to` instead
fn rescale(value: Decimal, from: Decimal, to: Decimal) -> Option<Decimal> {
    let ratio = from.checked_div(to)?;
    if ratio.checked_mul(to) == Some(from) {
        value.checked_mul(ratio)
    } else {
        value.checked_mul(from)?.checked_div(to)
    }
}

// NOTE: Returns the power of the molecular weight needed to bridge `from` and `to`, or `None` if nothing can
fn molar_exponent(from: &Unit, to: &Unit) -> Option<i32> {
    if from.is_commensurable_with(to) {
        return Some(0);
    }

    let difference = from.dimension().checked_sub(to.dimension())?;
    if difference == Dimension::AMOUNT_PER_MASS {
        Some(1)
    } else if difference == -Dimension::AMOUNT_PER_MASS {
        Some(-1)
    } else {
        None
    }
}
