// Standard Library Imports
use std::{collections::BTreeMap, path::Path};

// External Crate Imports
use knuffel::{Decode, span::Span};
use miette::{Diagnostic, IntoDiagnostic, LabeledSpan, NamedSource, Result, WrapErr};
use rust_decimal::Decimal;
use thiserror::Error;
use unitconv::{DecimalKdl, Unit, UnitDatabase, UnitSyntaxError};

// Local Crate Imports
use crate::RangeRule;

// Public API ==========================================================================================================

/// Named range rules, iterated in name order
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct RuleDatabase {
    rules: BTreeMap<String, RangeRule>,
}

impl RuleDatabase {
    pub fn new(
        unit_db: &UnitDatabase,
        file_name: impl AsRef<str>,
        kdl_text: impl AsRef<str>,
    ) -> Result<Self> {
        let parsed_db: RuleDatabaseKdl = knuffel::parse(file_name.as_ref(), kdl_text.as_ref())?;
        parsed_db
            .validate(unit_db)
            .map_err(|e| e.finalize(file_name, kdl_text).into())
    }

    pub async fn load(unit_db: &UnitDatabase, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let kdl_text = tokio::fs::read_to_string(path)
            .await
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to read rule database {}", path.display()))?;
        Self::new(unit_db, path.display().to_string(), kdl_text)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RangeRule> {
        self.rules.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RangeRule)> {
        self.rules.iter().map(|(name, rule)| (name.as_str(), rule))
    }
}

// KDL File Schema =====================================================================================================

#[derive(Debug, Decode)]
#[knuffel(span_type=Span)]
struct RuleDatabaseKdl {
    #[knuffel(children(name = "rule"))]
    rules: Vec<RuleKdl>,
}

#[derive(Debug, Decode)]
#[knuffel(span_type=Span)]
struct RuleKdl {
    #[knuffel(span)]
    span: Span,
    #[knuffel(argument)]
    name: String,
    #[knuffel(property)]
    unit: String,
    #[knuffel(property, default)]
    unit_not_required: bool,
    #[knuffel(child, unwrap(argument))]
    min: Option<DecimalKdl>,
    #[knuffel(child, unwrap(argument))]
    max: Option<DecimalKdl>,
    #[knuffel(children(name = "mapping"), unwrap(argument))]
    mappings: Vec<String>,
}

// Rule Database Validation ============================================================================================

type ValidationResult<T> = std::result::Result<T, RuleDatabaseErrorKind>;

impl RuleDatabaseKdl {
    fn validate(self, unit_db: &UnitDatabase) -> ValidationResult<RuleDatabase> {
        let mut seen = BTreeMap::new();
        for rule in self.rules {
            let span = rule.span;
            let (name, range_rule) = rule.validate(unit_db)?;
            if let Some((first_defined_at, _)) = seen.get(&name) {
                return Err(RuleDatabaseErrorKind::DuplicateRule(*first_defined_at, span, name));
            }
            seen.insert(name, (span, range_rule));
        }

        let rules = seen.into_iter().map(|(k, (_, r))| (k, r)).collect();
        Ok(RuleDatabase { rules })
    }
}

impl RuleKdl {
    fn validate(self, unit_db: &UnitDatabase) -> ValidationResult<(String, RangeRule)> {
        // NOTE: The unit of a rule that compares raw values is only informative, so it's allowed to be anything
        if !self.unit_not_required {
            if let Err(e) = Unit::new(unit_db, &self.unit) {
                return Err(RuleDatabaseErrorKind::InvalidUnit(self.span, self.unit, e));
            }
        }

        let min = self.min.map(Decimal::from);
        let max = self.max.map(Decimal::from);
        match (min, max) {
            (None, None) => return Err(RuleDatabaseErrorKind::Unbounded(self.span, self.name)),
            (Some(min), Some(max)) if min >= max => {
                return Err(RuleDatabaseErrorKind::EmptyRange(self.span, self.name, min, max));
            }
            _ => (),
        }

        let mut rule = RangeRule::new(self.unit)
            .with_unit_not_required(self.unit_not_required)
            .with_mappings(self.mappings);
        if let Some(min) = min {
            rule = rule.with_min(min);
        }
        if let Some(max) = max {
            rule = rule.with_max(max);
        }

        Ok((self.name, rule))
    }
}

// Validation Error Types and Trait Implementations  ===================================================================

#[derive(Debug, Error)]
#[error("failed to validate rule database file")]
struct RuleDatabaseError {
    kdl: NamedSource<String>,
    #[source]
    kind: RuleDatabaseErrorKind,
}

// NOTE: This is manually implemented because the list of labels is dynamic and needs to be extracted from `self.kind`
impl Diagnostic for RuleDatabaseError {
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
enum RuleDatabaseErrorKind {
    #[error("the rule {2:?} has already been defined")]
    #[diagnostic(help("rename one of the rules, or merge them into one"))]
    DuplicateRule(Span, Span, String),

    #[error("the rule unit {1:?} is not a valid unit expression")]
    #[diagnostic(help(
        "double-check the unit for typos, or set `unit-not-required=true` to compare values without converting them"
    ))]
    InvalidUnit(Span, String, #[source] Box<UnitSyntaxError>),

    #[error("the rule {1:?} must specify at least one bound")]
    #[diagnostic(help("add a `min`, a `max`, or both"))]
    Unbounded(Span, String),

    #[error("the rule {1:?} can never be satisfied, since its min ({2}) is not below its max ({3})")]
    #[diagnostic(help("all bounds are exclusive, so the min must be strictly smaller than the max"))]
    EmptyRange(Span, String, Decimal, Decimal),
}

impl RuleDatabaseErrorKind {
    fn labels(&self) -> Vec<(&Span, &'static str)> {
        match self {
            Self::DuplicateRule(s1, s2, _) => {
                vec![(s1, "first defined here"), (s2, "then again here")]
            }
            Self::InvalidUnit(s, _, _) => vec![(s, "invalid unit")],
            Self::Unbounded(s, _) => vec![(s, "unbounded rule")],
            Self::EmptyRange(s, _, _, _) => vec![(s, "empty range")],
        }
    }

    fn finalize(self, file_name: impl AsRef<str>, kdl: impl AsRef<str>) -> RuleDatabaseError {
        let kdl = NamedSource::new(file_name, kdl.as_ref().to_owned());
        RuleDatabaseError { kdl, kind: self }
    }
}

// Module Tests ========================================================================================================

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use insta::assert_snapshot;
    use mapping_db::MappingRef;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::{
        Bounds,
        testing_tools::{ALBUMIN, RULES_KDL, UNIT_DB, VITAMIN_D},
    };

    fn parse_rules(kdl: &str) -> ValidationResult<RuleDatabase> {
        let db: RuleDatabaseKdl = knuffel::parse("test", kdl).unwrap();
        db.validate(&UNIT_DB)
    }

    #[test]
    fn build_rule_database() {
        let db = RuleDatabase::new(&UNIT_DB, "rules.kdl", RULES_KDL).unwrap();
        assert_eq!(db.len(), 4);
        assert!(!db.is_empty());

        let names: Vec<_> = db.iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec!["albumin-normal", "glucose-fasting", "pain-score-low", "vitamin-d-sufficient"]
        );

        let albumin = db.get("albumin-normal").unwrap();
        assert_eq!(albumin.unit(), "g/dL");
        assert_eq!(albumin.bounds(), Some(Bounds::Above(dec!(5.51))));
        assert_eq!(albumin.mappings().len(), 5);
        assert_eq!(albumin.mappings()[0], MappingRef::from(ALBUMIN));
        assert_eq!(albumin.mappings()[1], MappingRef::from(VITAMIN_D));

        let vitamin_d = db.get("vitamin-d-sufficient").unwrap();
        assert_eq!(vitamin_d.bounds(), Some(Bounds::Between(dec!(30), dec!(100))));
        assert!(!vitamin_d.unit_not_required());

        let pain = db.get("pain-score-low").unwrap();
        assert!(pain.unit_not_required());
        assert_eq!(pain.bounds(), Some(Bounds::Below(dec!(4))));
        assert!(pain.mappings().is_empty());

        assert_eq!(db.get("missing"), None);
    }

    #[test]
    fn empty_rule_database() {
        let db = RuleDatabase::new(&UNIT_DB, "empty.kdl", "").unwrap();
        assert!(db.is_empty());
        assert_eq!(db, RuleDatabase::default());
    }

    #[test]
    fn duplicate_rule() {
        let kdl = indoc! {r#"
            rule "glucose" unit="mg/dL" {
                max 100
            }
            rule "glucose" unit="mmol/L" {
                max 5.6
            }
        "#};
        let err = parse_rules(kdl).unwrap_err();
        assert_snapshot!(err, @r#"the rule "glucose" has already been defined"#);
        assert_eq!(err.labels().len(), 2);
    }

    #[test]
    fn invalid_unit() {
        let kdl = indoc! {r#"
            rule "glucose" unit="mg/dX" {
                max 100
            }
        "#};
        let err = parse_rules(kdl).unwrap_err();
        assert_snapshot!(err, @r#"the rule unit "mg/dX" is not a valid unit expression"#);

        // Anything goes when the unit isn't required
        let kdl = indoc! {r#"
            rule "score" unit="points out of ten" unit-not-required=true {
                max 4
            }
        "#};
        let db = parse_rules(kdl).unwrap();
        assert_eq!(db.get("score").unwrap().unit(), "points out of ten");
    }

    #[test]
    fn unbounded_rule() {
        let kdl = indoc! {r#"
            rule "glucose" unit="mg/dL" {
                mapping "/observationMappings/glucose"
            }
        "#};
        let err = parse_rules(kdl).unwrap_err();
        assert_snapshot!(err, @r#"the rule "glucose" must specify at least one bound"#);
    }

    #[test]
    fn empty_range() {
        let kdl = indoc! {r#"
            rule "glucose" unit="mg/dL" {
                min 100
                max 100
            }
        "#};
        let err = parse_rules(kdl).unwrap_err();
        assert_snapshot!(
            err,
            @r#"the rule "glucose" can never be satisfied, since its min (100) is not below its max (100)"#
        );

        let kdl = indoc! {r#"
            rule "glucose" unit="mg/dL" {
                min 120
                max 70
            }
        "#};
        assert!(matches!(parse_rules(kdl), Err(RuleDatabaseErrorKind::EmptyRange(..))));
    }

    #[test]
    fn validation_errors_are_reported_with_source() {
        let kdl = indoc! {r#"
            rule "glucose" unit="mg/dL" {}
        "#};
        let err = RuleDatabase::new(&UNIT_DB, "test", kdl).unwrap_err();
        assert_snapshot!(err, @"failed to validate rule database file");
        assert_eq!(err.labels().into_iter().flatten().count(), 1);
    }

    #[test]
    fn missing_unit_property() {
        let kdl = indoc! {r#"
            rule "glucose" {
                max 100
            }
        "#};
        assert!(RuleDatabase::new(&UNIT_DB, "test", kdl).is_err());
    }

    #[tokio::test]
    async fn load_from_file() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/rules.kdl");
        let db = RuleDatabase::load(&UNIT_DB, path).await.unwrap();
        assert_eq!(db, RuleDatabase::new(&UNIT_DB, "rules.kdl", RULES_KDL).unwrap());
    }

    #[tokio::test]
    async fn load_missing_file() {
        let err = RuleDatabase::load(&UNIT_DB, "does/not/exist.kdl").await.unwrap_err();
        assert_snapshot!(err, @"failed to read rule database does/not/exist.kdl");
    }
}
