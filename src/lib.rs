//! Checks clinical measurements against the numeric ranges of rules, converting units (and looking up molecular
//! weights for mass / amount-of-substance conversions) along the way

pub mod collaborators;
pub mod errors;
mod measurement;
mod rule;
pub mod rule_database;
mod validator;
#[cfg(test)]
mod testing_tools;

pub use collaborators::{MappingStore, UnitConverter};
pub use errors::{MeasurementError, Result, ValidationError};
pub use measurement::Measurement;
pub use rule::{Bounds, RangeRule};
pub use rule_database::RuleDatabase;
pub use validator::RangeValidator;

pub use mapping_db::{MappingDatabase, MappingDocument, MappingRef};
pub use unitconv::{Conversion, ConversionFailure, UnitDatabase};
