use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use rust_decimal::Decimal;

use crate::errors::MeasurementError;

/// A single observed value and the unit it was recorded in
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Measurement {
    unit: String,
    value: Decimal,
}

impl Measurement {
    pub fn new(value: Decimal, unit: impl Into<String>) -> Self {
        let unit = unit.into();
        Self { unit, value }
    }

    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    #[must_use]
    pub const fn value(&self) -> Decimal {
        self.value
    }
}

impl Display for Measurement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Value = decimal | decimal , ( "e" | "E" ) , exponent ;
/// Measurement = Value , whitespace , Unit ;
impl FromStr for Measurement {
    type Err = MeasurementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some((value, unit)) = s.split_once(char::is_whitespace) else {
            return Err(MeasurementError::MissingUnit(s.to_owned()));
        };

        let parsed = if value.contains(['e', 'E']) {
            Decimal::from_scientific(value)
        } else {
            Decimal::from_str_exact(value)
        };
        let value = parsed.map_err(|_| MeasurementError::InvalidValue(value.to_owned()))?;

        Ok(Self::new(value, unit.trim()))
    }
}
