//! Parsing and conversion of UCUM-style unit expressions, with support for mass / substance-amount conversions
//! via molecular weights

pub mod conversion;
mod dimension;
pub mod errors;
pub mod parser;
pub mod unit_database;
#[cfg(test)]
mod testing_tools;

use rust_decimal::Decimal;

// FIXME: Work out what really needs to be exported here...
pub use conversion::Conversion;
pub use errors::{ConversionFailure, Result, UnitError, UnitLookupError, UnitSyntaxError};
pub use unit_database::{DecimalKdl, UnitDatabase};

// ---------------------------------------------------------------------------------------------------------------------

/// Integer exponents of the four base dimensions
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Dimension {
    pub length: i32,
    pub mass: i32,
    pub time: i32,
    pub amount: i32,
}

/// A unit expression reduced to a magnitude (relative to the base units) and a dimension
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Unit {
    factor: Decimal,
    dimension: Dimension,
}

// ---------------------------------------------------------------------------------------------------------------------

#[derive(Clone, Eq, PartialEq, Debug)]
struct Prefix {
    symbol: String,
    name: String,
    factor: Decimal,
}

#[derive(Clone, Eq, PartialEq, Debug)]
struct Atom {
    name: String,
    metric: bool,
    unit: Unit,
}
