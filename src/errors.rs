use std::error::Error as StdError;

use miette::Diagnostic;
use rust_decimal::Decimal;
use thiserror::Error;
use unitconv::ConversionFailure;

pub type Result<T, E = Box<ValidationError>> = std::result::Result<T, E>;

type BoxedError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Diagnostic, Error)]
pub enum ValidationError {
    #[diagnostic(help("give the rule a `min`, a `max`, or both"))]
    #[error("range rule must specify at least one bound")]
    Unbounded,

    #[diagnostic(help(
        "add a mapping document with this standard unit and a molecular weight to the rule's mappings"
    ))]
    #[error("no molecular weight found among mapping documents for observation unit {unit:?}")]
    MissingMolecularWeight { unit: String },

    #[error(
        "converting {from:?} to {to:?} failed, even with a molecular weight of {molecular_weight} g/mol"
    )]
    FallbackConversion {
        from: String,
        to: String,
        molecular_weight: Decimal,
        #[source]
        #[diagnostic_source]
        failure: ConversionFailure,
    },

    #[error("failed to fetch mapping documents from the store")]
    Store(#[source] BoxedError),

    // NOTE: Wraps anything the converter reports through its error channel, so it's never silently swallowed
    #[error("the unit converter failed unexpectedly while converting {from:?} to {to:?}")]
    Converter {
        from: String,
        to: String,
        #[source]
        source: BoxedError,
    },
}

impl ValidationError {
    pub(crate) fn missing_molecular_weight(unit: &str) -> Box<Self> {
        let unit = unit.to_owned();

        Box::new(Self::MissingMolecularWeight { unit })
    }

    pub(crate) fn fallback_conversion(
        from: &str,
        to: &str,
        molecular_weight: Decimal,
        failure: ConversionFailure,
    ) -> Box<Self> {
        let from = from.to_owned();
        let to = to.to_owned();

        Box::new(Self::FallbackConversion {
            from,
            to,
            molecular_weight,
            failure,
        })
    }

    pub(crate) fn store(error: impl StdError + Send + Sync + 'static) -> Box<Self> {
        Box::new(Self::Store(Box::new(error)))
    }

    pub(crate) fn converter(from: &str, to: &str, error: impl StdError + Send + Sync + 'static) -> Box<Self> {
        let from = from.to_owned();
        let to = to.to_owned();
        let source = Box::new(error);

        Box::new(Self::Converter { from, to, source })
    }
}

// ---------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Diagnostic, Clone, Eq, PartialEq, Error)]
pub enum MeasurementError {
    #[diagnostic(help("measurements are written as a value followed by a unit, like `489.5331 nmol/L`"))]
    #[error("the measurement {0:?} is missing a unit")]
    MissingUnit(String),

    #[diagnostic(help("values must be plain decimal numbers, like `5.51`, `-2`, or `1e-3`"))]
    #[error("{0:?} is not a valid measurement value")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use std::io;

    use insta::assert_snapshot;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn error_messages() {
        assert_snapshot!(ValidationError::Unbounded, @"range rule must specify at least one bound");
        assert_snapshot!(
            ValidationError::missing_molecular_weight("nmol/L"),
            @r#"no molecular weight found among mapping documents for observation unit "nmol/L""#
        );
        let failure = ConversionFailure::InvalidMolecularWeight(dec!(0));
        assert_snapshot!(
            ValidationError::fallback_conversion("nmol/L", "g/dL", dec!(0), failure),
            @r#"converting "nmol/L" to "g/dL" failed, even with a molecular weight of 0 g/mol"#
        );
    }

    #[test]
    fn wrapped_errors_keep_their_source() {
        let err = ValidationError::converter("mg", "g", io::Error::other("converter offline"));
        assert_snapshot!(
            err,
            @r#"the unit converter failed unexpectedly while converting "mg" to "g""#
        );
        assert_eq!(err.source().unwrap().to_string(), "converter offline");

        let err = ValidationError::store(io::Error::other("permission denied"));
        assert_snapshot!(err, @"failed to fetch mapping documents from the store");
        assert_eq!(err.source().unwrap().to_string(), "permission denied");
    }
}
