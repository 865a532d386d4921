// Standard Library Imports
use std::{cmp::Reverse, collections::hash_map::Entry, ops::Deref};

// External Crate Imports
use ahash::{HashMap, HashMapExt};
use knuffel::{
    Decode, DecodeScalar,
    ast::{self, Integer, Literal, Radix, TypeName},
    decode::{Context, Kind},
    errors::{DecodeError, ExpectedType},
    span::{Span, Spanned},
    traits::ErrorSpan,
};
use miette::{Diagnostic, LabeledSpan, NamedSource, Result};
use nom::combinator::all_consuming;
use rust_decimal::Decimal;
use thiserror::Error;

// Local Crate Imports
use crate::{
    Atom, Dimension, Prefix, Unit, UnitLookupError, errors::UnitErrorKind, parser::atom_symbol,
};

pub const DEFAULT_KDL: &str = include_str!("../unit_database.kdl");

// Public API ==========================================================================================================

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct UnitDatabase {
    // NOTE: Sorted from longest to shortest symbol, so that "da" is tried before "d"
    prefixes: Vec<Prefix>,
    atoms: HashMap<String, Atom>,
}

impl UnitDatabase {
    pub fn from_kdl(file_name: impl AsRef<str>, kdl_text: impl AsRef<str>) -> Result<Self> {
        let parsed_db: UnitDatabaseKdl = knuffel::parse(file_name.as_ref(), kdl_text.as_ref())?;
        parsed_db
            .validate()
            .map_err(|e| e.finalize(file_name, kdl_text).into())
    }

    // NOTE: Unprefixed atoms always take priority, so "d" is a day and not a dangling deci- prefix
    pub(crate) fn resolve(&self, symbol: &str) -> Result<Unit, UnitErrorKind> {
        if let Some(atom) = self.atoms.get(symbol) {
            return Ok(atom.unit);
        }

        let mut non_metric = None;
        for prefix in &self.prefixes {
            let Some((rest, atom)) = symbol
                .strip_prefix(prefix.symbol.as_str())
                .and_then(|rest| self.atoms.get(rest).map(|atom| (rest, atom)))
            else {
                continue;
            };

            if atom.metric {
                let prefix_unit = Unit::new_base(prefix.factor, Dimension::NONE);
                return prefix_unit
                    .checked_mul(atom.unit)
                    .ok_or(UnitErrorKind::Overflow);
            }

            non_metric.get_or_insert_with(|| {
                UnitLookupError::NonMetric(
                    prefix.symbol.clone(),
                    prefix.name.clone(),
                    rest.to_owned(),
                    atom.name.clone(),
                )
            });
        }

        Err(non_metric
            .unwrap_or_else(|| UnitLookupError::Unit(symbol.to_owned()))
            .into())
    }
}

impl Default for UnitDatabase {
    fn default() -> Self {
        // SAFETY: The bundled database is checked by the `build_default_unit_database` test
        Self::from_kdl("unit_database.kdl", DEFAULT_KDL).unwrap()
    }
}

// KDL File Schema =====================================================================================================

#[derive(Debug, Decode)]
#[knuffel(span_type=Span)]
struct UnitDatabaseKdl {
    #[knuffel(child, unwrap(children))]
    prefixes: Vec<PrefixKdl>,
    #[knuffel(child, unwrap(children))]
    units: Vec<AtomKdl>,
}

#[derive(Debug, Decode)]
#[knuffel(span_type=Span)]
struct PrefixKdl {
    #[knuffel(span)]
    span: Span,
    #[knuffel(node_name)]
    symbol: String,
    #[knuffel(argument)]
    name: String,
    #[knuffel(argument)]
    factor: DecimalKdl,
}

#[derive(Debug, Decode)]
#[knuffel(span_type=Span)]
struct AtomKdl {
    #[knuffel(span)]
    span: Span,
    #[knuffel(node_name)]
    symbol: String,
    #[knuffel(argument)]
    name: String,
    #[knuffel(property, default)]
    metric: bool,
    #[knuffel(property)]
    factor: Option<DecimalKdl>,
    #[knuffel(property, default)]
    length: i32,
    #[knuffel(property, default)]
    mass: i32,
    #[knuffel(property, default)]
    time: i32,
    #[knuffel(property, default)]
    amount: i32,
}

// Lossless Parsing of KDL Numbers to Decimal ==========================================================================

/// A KDL number decoded straight into a [`Decimal`], without a lossy detour through `f64`
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct DecimalKdl(pub Decimal);

impl From<DecimalKdl> for Decimal {
    fn from(value: DecimalKdl) -> Self {
        value.0
    }
}

impl<S: ErrorSpan> DecodeScalar<S> for DecimalKdl {
    fn type_check(type_name: &Option<Spanned<TypeName, S>>, ctx: &mut Context<S>) {
        if let Some(t) = type_name {
            ctx.emit_error(DecodeError::TypeName {
                span: t.span().clone(),
                found: Some(t.deref().clone()),
                expected: ExpectedType::no_type(),
                rust_type: "Decimal",
            });
        }
    }

    fn raw_decode(
        value: &Spanned<Literal, S>,
        ctx: &mut Context<S>,
    ) -> Result<Self, DecodeError<S>> {
        match &**value {
            Literal::Decimal(ast::Decimal(s)) | Literal::Int(Integer(Radix::Dec, s)) => {
                let parsed = if s.contains(['e', 'E']) {
                    Decimal::from_scientific(s)
                } else {
                    Decimal::from_str_exact(s)
                };
                match parsed {
                    Ok(d) => Ok(Self(d)),
                    Err(e) => {
                        ctx.emit_error(DecodeError::conversion(value, Box::new(e)));
                        Ok(Self::default())
                    }
                }
            }
            unsupported => {
                ctx.emit_error(DecodeError::unsupported(
                    value,
                    format!(
                        "expected a decimal number, found {}",
                        Kind::from(unsupported)
                    ),
                ));
                Ok(Self::default())
            }
        }
    }
}

// Unit Database Validation ============================================================================================

type ValidationResult<T> = std::result::Result<T, UnitDatabaseErrorKind>;

impl UnitDatabaseKdl {
    fn validate(self) -> ValidationResult<UnitDatabase> {
        let mut seen_prefixes = HashMap::new();
        for prefix in self.prefixes {
            if prefix.symbol.is_empty() || !prefix.symbol.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(UnitDatabaseErrorKind::InvalidPrefixSymbol(
                    prefix.span,
                    prefix.symbol,
                ));
            }
            check_factor(prefix.span, &prefix.symbol, prefix.factor.0)?;

            match seen_prefixes.entry(prefix.symbol) {
                Entry::Occupied(e) => {
                    let (symbol, (first_defined_at, _)) = e.remove_entry();
                    return Err(UnitDatabaseErrorKind::DuplicatePrefix(
                        first_defined_at,
                        prefix.span,
                        symbol,
                    ));
                }
                Entry::Vacant(e) => {
                    let symbol = e.key().clone();
                    let name = prefix.name;
                    let factor = prefix.factor.0;
                    e.insert((prefix.span, Prefix { symbol, name, factor }))
                }
            };
        }

        let mut seen_atoms = HashMap::new();
        for atom in self.units {
            if all_consuming(atom_symbol)(&atom.symbol).is_err() {
                return Err(UnitDatabaseErrorKind::InvalidUnitSymbol(atom.span, atom.symbol));
            }
            let factor = atom.factor.map_or(Decimal::ONE, Decimal::from);
            check_factor(atom.span, &atom.symbol, factor)?;

            match seen_atoms.entry(atom.symbol) {
                Entry::Occupied(e) => {
                    let (symbol, (first_defined_at, _)) = e.remove_entry();
                    return Err(UnitDatabaseErrorKind::DuplicateUnit(
                        first_defined_at,
                        atom.span,
                        symbol,
                    ));
                }
                Entry::Vacant(e) => {
                    let dimension = Dimension {
                        length: atom.length,
                        mass: atom.mass,
                        time: atom.time,
                        amount: atom.amount,
                    };
                    e.insert((
                        atom.span,
                        Atom {
                            name: atom.name,
                            metric: atom.metric,
                            unit: Unit::new_base(factor, dimension),
                        },
                    ))
                }
            };
        }

        let mut prefixes: Vec<_> = seen_prefixes.into_values().map(|(_, p)| p).collect();
        prefixes.sort_unstable_by(|a, b| (Reverse(a.symbol.len()), &a.symbol).cmp(&(Reverse(b.symbol.len()), &b.symbol)));
        let atoms = seen_atoms.into_iter().map(|(k, (_, a))| (k, a)).collect();

        Ok(UnitDatabase { prefixes, atoms })
    }
}

fn check_factor(span: Span, symbol: &str, factor: Decimal) -> ValidationResult<()> {
    if factor.is_sign_positive() && !factor.is_zero() {
        Ok(())
    } else {
        Err(UnitDatabaseErrorKind::NonPositiveFactor(
            span,
            symbol.to_owned(),
            factor,
        ))
    }
}

// Validation Error Types and Trait Implementations  ===================================================================

#[derive(Debug, Error)]
#[error("failed to validate unit database file")]
struct UnitDatabaseError {
    kdl: NamedSource<String>,
    #[source]
    kind: UnitDatabaseErrorKind,
}

// NOTE: This is manually implemented because the list of labels is dynamic and needs to be extracted from `self.kind`
impl Diagnostic for UnitDatabaseError {
    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.kdl)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        Some(Box::new(self.kind.labels().into_iter().map(|(s, l)| {
            LabeledSpan::new_with_span(Some(l.to_owned()), *s)
        })))
    }

    fn diagnostic_source(&self) -> Option<&dyn Diagnostic> {
        Some(&self.kind)
    }
}

#[derive(Clone, Debug, Diagnostic, Error)]
enum UnitDatabaseErrorKind {
    #[error("the prefix {2:?} has already been defined")]
    #[diagnostic(help("remove the duplicate prefix, or pick a new symbol"))]
    DuplicatePrefix(Span, Span, String),

    #[error("the unit {2:?} has already been defined")]
    #[diagnostic(help("remove the duplicate unit, or pick a new symbol"))]
    DuplicateUnit(Span, Span, String),

    #[error("{1:?} is not a valid prefix symbol")]
    #[diagnostic(help("prefix symbols must be made up of ASCII letters only"))]
    InvalidPrefixSymbol(Span, String),

    #[error("{1:?} is not a valid unit symbol")]
    #[diagnostic(help(
        "unit symbols must be made up of ASCII letters and '%', or be wrapped in square brackets"
    ))]
    InvalidUnitSymbol(Span, String),

    #[error("the factor of {1:?} must be positive, but got {2}")]
    NonPositiveFactor(Span, String, Decimal),
}

impl UnitDatabaseErrorKind {
    fn labels(&self) -> Vec<(&Span, &'static str)> {
        match self {
            Self::DuplicatePrefix(s1, s2, _) | Self::DuplicateUnit(s1, s2, _) => {
                vec![(s1, "first defined here"), (s2, "then again here")]
            }
            Self::InvalidPrefixSymbol(s, _) => vec![(s, "invalid prefix")],
            Self::InvalidUnitSymbol(s, _) => vec![(s, "invalid unit")],
            Self::NonPositiveFactor(s, _, _) => vec![(s, "non-positive factor")],
        }
    }

    fn finalize(self, file_name: impl AsRef<str>, kdl: impl AsRef<str>) -> UnitDatabaseError {
        let kdl = NamedSource::new(file_name, kdl.as_ref().to_owned());
        UnitDatabaseError { kdl, kind: self }
    }
}

// Module Tests ========================================================================================================
