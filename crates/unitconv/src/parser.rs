// External Crate Imports
use miette::SourceSpan;
use nom::{
    Err, Finish, IResult, Parser,
    branch::alt,
    bytes::complete::{is_not, take_while, take_while1},
    character::complete::{char, i32, one_of, u64},
    combinator::{all_consuming, cut, map, opt, recognize},
    error::{ErrorKind, ParseError},
    sequence::{delimited, pair, preceded},
};
use rust_decimal::Decimal;

// Local Crate Imports
use crate::{
    Dimension, Unit, UnitDatabase,
    errors::{UnitErrorKind, UnitSyntaxError},
};

// Public API ==========================================================================================================

pub type ParseResult<'a, O> = IResult<&'a str, O, ParseFailure<'a>>;

impl Unit {
    pub fn new(db: &UnitDatabase, expression: impl AsRef<str>) -> Result<Self, Box<UnitSyntaxError>> {
        let expression = expression.as_ref();
        all_consuming(|i| unit_expression(db, i))(expression)
            .finish()
            .map(|(_, unit)| unit)
            .map_err(|e| Box::new(e.into_final_error(expression)))
    }
}

/// Unit Expression = [ "/" ] , Term ;
pub fn unit_expression<'s>(db: &UnitDatabase, i: &'s str) -> ParseResult<'s, Unit> {
    let (rest, reciprocal) = opt(char('/'))(i)?;
    let (rest, unit) = cut(|i| term(db, i))(rest)?;
    let unit = if reciprocal.is_some() {
        Unit::ONE.checked_div(unit).ok_or_else(|| overflow(i, rest))?
    } else {
        unit
    };
    Ok((rest, unit))
}

/// Atom Symbol = "[" , { char - "]" }- , "]" | { letter | "%" }- ;
pub fn atom_symbol(i: &str) -> ParseResult<&str> {
    let closing_bracket = cut(expect(char(']'), UnitErrorKind::ExpectedClosingBracket));
    let bracketed = recognize(delimited(char('['), is_not("]"), closing_bracket));
    let plain = take_while1(|c: char| c.is_ascii_alphabetic() || c == '%');
    alt((bracketed, plain))(i)
}

// Parse Errors ========================================================================================================

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ParseFailure<'a> {
    input: &'a str,
    length: usize,
    kind: UnitErrorKind,
}

impl<'a> ParseFailure<'a> {
    fn new(input: &'a str, kind: UnitErrorKind) -> Self {
        Self::spanning(input, 0, kind)
    }

    const fn spanning(input: &'a str, length: usize, kind: UnitErrorKind) -> Self {
        Self {
            input,
            length,
            kind,
        }
    }

    fn into_final_error(self, full_input: &str) -> UnitSyntaxError {
        // NOTE: `self.input` is always a suffix of `full_input`, so the difference in their lengths is the offset
        let start = full_input.len() - self.input.len();
        // NOTE: The additional space is added so that labels can point to the end of an input
        let input = format!("{full_input} ");
        UnitSyntaxError {
            input,
            span: SourceSpan::from(start..start + self.length),
            kind: self.kind,
        }
    }
}

impl<'a> ParseError<&'a str> for ParseFailure<'a> {
    fn from_error_kind(input: &'a str, kind: ErrorKind) -> Self {
        Self::new(input, kind.into())
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }

    // NOTE: Report whichever alternative made it furthest through the input
    fn or(self, other: Self) -> Self {
        if other.input.len() <= self.input.len() {
            other
        } else {
            self
        }
    }
}

// Private Sub-Parsers =================================================================================================

/// Term = Component , { ( "." | "/" ) , Component } ;
fn term<'s>(db: &UnitDatabase, i: &'s str) -> ParseResult<'s, Unit> {
    let (mut rest, mut unit) = component(db, i)?;
    // NOTE: Multiplication and division have equal precedence and are left-associative
    while let Ok((after_operator, operator)) = one_of::<_, _, ParseFailure>("./")(rest) {
        let (after_component, rhs) = cut(|i| component(db, i))(after_operator)?;
        let combined = match operator {
            '.' => unit.checked_mul(rhs),
            '/' => unit.checked_div(rhs),
            _ => unreachable!(),
        };
        unit = combined.ok_or_else(|| overflow(i, after_component))?;
        rest = after_component;
    }
    Ok((rest, unit))
}

/// Component
///   = Simple Unit , [ Exponent ] , [ Annotation ]
///   | Factor , [ Annotation ]
///   | "(" , Term , ")"
///   | Annotation
///   ;
fn component<'s>(db: &UnitDatabase, i: &'s str) -> ParseResult<'s, Unit> {
    let simple_unit = |i| annotated_unit(db, i);
    let nested_term = |i| parenthesized(db, i);
    let numeric_factor = map(pair(factor, opt(annotation)), |(unit, _)| unit);
    let bare_annotation = map(annotation, |_| Unit::ONE);
    let parser = alt((simple_unit, numeric_factor, nested_term, bare_annotation));
    expect(parser, UnitErrorKind::ExpectedComponent)(i)
}

/// Annotated Unit = Simple Unit , [ Exponent ] , [ Annotation ] ;
fn annotated_unit<'s>(db: &UnitDatabase, i: &'s str) -> ParseResult<'s, Unit> {
    let (rest, symbol) = atom_symbol(i)?;
    let unit = db
        .resolve(symbol)
        .map_err(|kind| Err::Failure(ParseFailure::spanning(i, symbol.len(), kind)))?;
    let (rest, exponent) = opt(exponent)(rest)?;
    let (rest, _) = opt(annotation)(rest)?;
    let unit = match exponent {
        Some(exponent) => unit.checked_powi(exponent).ok_or_else(|| overflow(i, rest))?,
        None => unit,
    };
    Ok((rest, unit))
}

// NOTE: These are not meant to be links, it's just EBNF
#[allow(clippy::doc_link_with_quotes)]
/// Factor = digit , { digit } , [ ( "*" | "^" ) , Exponent ] ;
fn factor(i: &str) -> ParseResult<Unit> {
    let power = preceded(one_of("*^"), cut(expect(exponent, UnitErrorKind::ExpectedExponent)));
    let (rest, (base, power)) = pair(u64, opt(power))(i)?;
    let base = Unit::new_base(Decimal::from(base), Dimension::NONE);
    let unit = base
        .checked_powi(power.unwrap_or(1))
        .ok_or_else(|| overflow(i, rest))?;
    Ok((rest, unit))
}

// NOTE: These are not meant to be links, it's just EBNF
#[allow(clippy::doc_link_with_quotes)]
/// "(" , Term , ")"
fn parenthesized<'s>(db: &UnitDatabase, i: &'s str) -> ParseResult<'s, Unit> {
    let closing_paren = cut(expect(char(')'), UnitErrorKind::ExpectedClosingParen));
    delimited(char('('), cut(|i| term(db, i)), closing_paren)(i)
}

/// Exponent = [ "+" | "-" ] , digit , { digit } ;
fn exponent(i: &str) -> ParseResult<i32> {
    preceded(opt(char('+')), i32)(i)
}

/// Annotation = "{" , { char - "}" } , "}" ;
fn annotation(i: &str) -> ParseResult<&str> {
    let closing_brace = cut(expect(char('}'), UnitErrorKind::ExpectedClosingBrace));
    delimited(char('{'), take_while(|c| c != '}'), closing_brace)(i)
}

// Parser Helpers ======================================================================================================

// NOTE: Only recoverable errors are replaced, failures (from `cut` or from database lookups) are passed through
// untouched, since they are already as specific as they are going to get
fn expect<'s, O>(
    mut parser: impl Parser<&'s str, O, ParseFailure<'s>>,
    kind: UnitErrorKind,
) -> impl FnMut(&'s str) -> ParseResult<'s, O> {
    move |i| {
        parser.parse(i).map_err(|e| match e {
            Err::Error(_) => Err::Error(ParseFailure::new(i, kind.clone())),
            e => e,
        })
    }
}

fn overflow<'s>(start: &'s str, rest: &'s str) -> Err<ParseFailure<'s>> {
    let length = start.len() - rest.len();
    Err::Failure(ParseFailure::spanning(start, length, UnitErrorKind::Overflow))
}

// Module Tests ========================================================================================================
