use std::fmt;

use miette::{Diagnostic, LabeledSpan, SourceSpan};
use nom::error::ErrorKind;
use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T, E = Box<UnitError>> = std::result::Result<T, E>;

// NOTE: This is the "something went unexpectedly wrong" channel. Ordinary reasons for two units not being
// interconvertible are reported as a `ConversionFailure` instead
#[derive(Debug, Diagnostic, Clone, Eq, PartialEq, Error)]
pub enum UnitError {
    #[diagnostic(help(
        "the converted value can't be represented as a decimal, double-check the units for typos"
    ))]
    #[error("converting {value} {from:?} to {to:?} overflowed the range of representable values")]
    Overflow {
        value: Decimal,
        from: String,
        to: String,
    },
}

impl UnitError {
    pub(crate) fn overflow(value: Decimal, from: &str, to: &str) -> Box<Self> {
        let from = from.to_owned();
        let to = to.to_owned();

        Box::new(Self::Overflow { value, from, to })
    }
}

// ---------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Diagnostic, Clone, Eq, PartialEq, Error)]
pub enum ConversionFailure {
    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidUnit(Box<UnitSyntaxError>),

    #[diagnostic(help(
        "amounts of substance (like mol) and masses (like g) can only be interconverted using a molecular weight"
    ))]
    #[error("converting from {from:?} to {to:?} requires a molecular weight")]
    MissingMolecularWeight { from: String, to: String },

    #[error("molecular weights must be positive, but got {0} g/mol")]
    InvalidMolecularWeight(Decimal),

    #[diagnostic(help(
        "only units measuring the same dimension (or a mass and an amount of substance) can be interconverted"
    ))]
    #[error("cannot convert from {from:?} ({from_dimension}) to {to:?} ({to_dimension})")]
    Incommensurable {
        from: String,
        from_dimension: String,
        to: String,
        to_dimension: String,
    },
}

impl ConversionFailure {
    /// Whether supplying a molecular weight could make this conversion succeed
    #[must_use]
    pub const fn needs_molecular_weight(&self) -> bool {
        matches!(self, Self::MissingMolecularWeight { .. })
    }
}

// ---------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Diagnostic, Clone, Eq, PartialEq, Error)]
pub enum UnitLookupError {
    #[diagnostic(help("double-check for typos, or add a new entry to the unit database"))]
    #[error("the unit {0:?} could not be found in the supplied unit database")]
    Unit(String),

    #[diagnostic(help("only metric units can be prefixed, try writing the unit without a prefix"))]
    #[error("the prefix {0:?} ({1}) cannot be applied to the non-metric unit {2:?} ({3})")]
    NonMetric(String, String, String, String),
}

// ---------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("{kind}")]
pub struct UnitSyntaxError {
    pub(crate) input: String,
    pub(crate) span: SourceSpan,
    pub(crate) kind: UnitErrorKind,
}

impl UnitSyntaxError {
    #[must_use]
    pub const fn kind(&self) -> &UnitErrorKind {
        &self.kind
    }

    #[must_use]
    pub const fn span(&self) -> SourceSpan {
        self.span
    }
}

// NOTE: Manually implemented so that the label text can be pulled from `self.kind`
impl Diagnostic for UnitSyntaxError {
    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.input)
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.kind.help()
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let label = self.kind.label()?;
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            Some(label.to_owned()),
            self.span,
        ))))
    }
}

#[derive(Debug, Diagnostic, Clone, Eq, PartialEq, Error)]
pub enum UnitErrorKind {
    #[error(
        "expected a unit (like mg or [in_i]), a number (like 10*3), an annotation (like {{cells}}), or a \
        parenthesized term"
    )]
    ExpectedComponent,

    #[diagnostic(help("you've probably forgotten to close an earlier '('"))]
    #[error("expected ')' to close the parenthesized term")]
    ExpectedClosingParen,

    #[diagnostic(help("you've probably forgotten to close an earlier '['"))]
    #[error("expected ']' to close the bracketed unit symbol")]
    ExpectedClosingBracket,

    #[diagnostic(help("you've probably forgotten to close an earlier '{{'"))]
    #[error("expected '}}' to close the annotation")]
    ExpectedClosingBrace,

    #[error("expected an integer exponent")]
    ExpectedExponent,

    #[diagnostic(transparent)]
    #[error(transparent)]
    LookupError(UnitLookupError),

    #[diagnostic(help("try simplifying the expression, or using smaller prefixes and exponents"))]
    #[error("the magnitude of this unit expression is too large or too small to be represented")]
    Overflow,

    #[diagnostic(help(
        "this is an internal error that you shouldn't ever see! If you have gotten this error, \
        then please report it as a bug!"
    ))]
    #[error("internal `nom` error: {0:?}")]
    NomError(ErrorKind),

    #[diagnostic(help(
        "check the unparsed region for errors, or remove it from the rest of the unit expression"
    ))]
    #[error("could not interpret the full input as a valid unit expression")]
    Incomplete,
}

impl UnitErrorKind {
    fn label(&self) -> Option<&'static str> {
        Some(match self {
            Self::LookupError(UnitLookupError::Unit(_)) => "unit not found",
            Self::LookupError(UnitLookupError::NonMetric(..)) => "non-metric unit",
            Self::ExpectedComponent => "expected a unit",
            Self::ExpectedClosingParen => "expected ')'",
            Self::ExpectedClosingBracket => "expected ']'",
            Self::ExpectedClosingBrace => "expected '}'",
            Self::ExpectedExponent => "expected an exponent",
            Self::Overflow => "overflowed here",
            Self::Incomplete => "input was valid up until this point",
            Self::NomError(_) => "the region that triggered this bug!",
        })
    }
}

impl From<ErrorKind> for UnitErrorKind {
    fn from(value: ErrorKind) -> Self {
        match value {
            ErrorKind::Eof => Self::Incomplete,
            kind => Self::NomError(kind),
        }
    }
}

impl From<UnitLookupError> for UnitErrorKind {
    fn from(value: UnitLookupError) -> Self {
        Self::LookupError(value)
    }
}
