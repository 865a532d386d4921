// Standard Library Imports
use std::{collections::hash_map::Entry, path::Path};

// External Crate Imports
use ahash::{HashMap, HashMapExt};
use knuffel::{Decode, span::Span};
use log::trace;
use miette::{Diagnostic, IntoDiagnostic, LabeledSpan, NamedSource, Result, WrapErr};
use rust_decimal::Decimal;
use thiserror::Error;
use unitconv::{DecimalKdl, Unit, UnitDatabase, UnitSyntaxError};

// Local Crate Imports
use crate::{MappingDocument, MappingRef};

// Public API ==========================================================================================================

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct MappingDatabase {
    documents: HashMap<MappingRef, MappingDocument>,
}

impl MappingDatabase {
    pub fn new(
        unit_db: &UnitDatabase,
        file_name: impl AsRef<str>,
        kdl_text: impl AsRef<str>,
    ) -> Result<Self> {
        let parsed_db: MappingDatabaseKdl = knuffel::parse(file_name.as_ref(), kdl_text.as_ref())?;
        parsed_db
            .validate(unit_db)
            .map_err(|e| e.finalize(file_name, kdl_text).into())
    }

    pub async fn load(unit_db: &UnitDatabase, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let kdl_text = tokio::fs::read_to_string(path)
            .await
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to read mapping database {}", path.display()))?;
        Self::new(unit_db, path.display().to_string(), kdl_text)
    }

    #[must_use]
    pub fn get(&self, reference: &MappingRef) -> Option<&MappingDocument> {
        self.documents.get(reference)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Fetches the documents for `references` in the order they were given, silently skipping any that don't exist
    #[must_use]
    pub fn resolve(&self, references: &[MappingRef]) -> Vec<MappingDocument> {
        references
            .iter()
            .filter_map(|reference| {
                let document = self.get(reference);
                if document.is_none() {
                    trace!("no mapping document found for {reference}");
                }
                document.cloned()
            })
            .collect()
    }
}

// KDL File Schema =====================================================================================================

#[derive(Debug, Decode)]
#[knuffel(span_type=Span)]
struct MappingDatabaseKdl {
    #[knuffel(children(name = "mapping"))]
    mappings: Vec<MappingKdl>,
}

#[derive(Debug, Decode)]
#[knuffel(span_type=Span)]
struct MappingKdl {
    #[knuffel(span)]
    span: Span,
    #[knuffel(argument)]
    reference: String,
    #[knuffel(child, unwrap(argument))]
    display: Option<String>,
    #[knuffel(child, unwrap(argument))]
    standard_unit: Option<String>,
    #[knuffel(child, unwrap(argument))]
    molecular_weight: Option<DecimalKdl>,
}

// Mapping Database Validation =========================================================================================

type ValidationResult<T> = std::result::Result<T, MappingDatabaseErrorKind>;

impl MappingDatabaseKdl {
    fn validate(self, unit_db: &UnitDatabase) -> ValidationResult<MappingDatabase> {
        let mut seen = HashMap::with_capacity(self.mappings.len());
        for mapping in self.mappings {
            let span = mapping.span;
            let document = mapping.validate(unit_db)?;
            match seen.entry(document.reference().clone()) {
                Entry::Occupied(e) => {
                    let (reference, (first_defined_at, _)) = e.remove_entry();
                    return Err(MappingDatabaseErrorKind::DuplicateMapping(
                        first_defined_at,
                        span,
                        reference,
                    ));
                }
                Entry::Vacant(e) => e.insert((span, document)),
            };
        }

        let documents = seen.into_iter().map(|(k, (_, d))| (k, d)).collect();
        Ok(MappingDatabase { documents })
    }
}

impl MappingKdl {
    fn validate(self, unit_db: &UnitDatabase) -> ValidationResult<MappingDocument> {
        let mut document = MappingDocument::new(self.reference);

        if let Some(display) = self.display {
            document = document.with_display(display);
        }

        if let Some(standard_unit) = self.standard_unit {
            if let Err(e) = Unit::new(unit_db, &standard_unit) {
                return Err(MappingDatabaseErrorKind::InvalidStandardUnit(
                    self.span,
                    standard_unit,
                    e,
                ));
            }
            document = document.with_standard_unit(standard_unit);
        }

        if let Some(DecimalKdl(molecular_weight)) = self.molecular_weight {
            if molecular_weight <= Decimal::ZERO {
                return Err(MappingDatabaseErrorKind::NonPositiveMolecularWeight(
                    self.span,
                    molecular_weight,
                ));
            }
            document = document.with_molecular_weight(molecular_weight);
        }

        Ok(document)
    }
}

// Validation Error Types and Trait Implementations  ===================================================================

#[derive(Debug, Error)]
#[error("failed to validate mapping database file")]
struct MappingDatabaseError {
    kdl: NamedSource<String>,
    #[source]
    kind: MappingDatabaseErrorKind,
}

// NOTE: This is manually implemented because the list of labels is dynamic and needs to be extracted from `self.kind`
impl Diagnostic for MappingDatabaseError {
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
enum MappingDatabaseErrorKind {
    #[error("the mapping {2} has already been defined")]
    #[diagnostic(help("each mapping document must have a unique reference"))]
    DuplicateMapping(Span, Span, MappingRef),

    #[error("the standard unit {1:?} is not a valid unit expression")]
    #[diagnostic(help("double-check the unit for typos, or add it to the unit database"))]
    InvalidStandardUnit(Span, String, #[source] Box<UnitSyntaxError>),

    #[error("molecular weights must be positive, but got {1} g/mol")]
    NonPositiveMolecularWeight(Span, Decimal),
}

impl MappingDatabaseErrorKind {
    fn labels(&self) -> Vec<(&Span, &'static str)> {
        match self {
            Self::DuplicateMapping(s1, s2, _) => {
                vec![(s1, "first defined here"), (s2, "then again here")]
            }
            Self::InvalidStandardUnit(s, _, _) => vec![(s, "invalid standard unit")],
            Self::NonPositiveMolecularWeight(s, _) => vec![(s, "non-positive molecular weight")],
        }
    }

    fn finalize(self, file_name: impl AsRef<str>, kdl: impl AsRef<str>) -> MappingDatabaseError {
        let kdl = NamedSource::new(file_name, kdl.as_ref().to_owned());
        MappingDatabaseError { kdl, kind: self }
    }
}

// Module Tests ========================================================================================================

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use indoc::indoc;
    use insta::assert_snapshot;
    use rust_decimal_macros::dec;

    use super::*;

    static UNIT_DB: LazyLock<UnitDatabase> = LazyLock::new(UnitDatabase::default);

    const VITAMIN_D: &str =
        "/apps/curehub/observationMappings/96cf450f2578b40ddbf0b524fe8c41d73291f6ef6c190793d0d5c2e9f4b17d3d";

    const MAPPINGS_KDL: &str = indoc! {r#"
        mapping "/apps/curehub/observationMappings/96cf450f2578b40ddbf0b524fe8c41d73291f6ef6c190793d0d5c2e9f4b17d3d" {
            display "25-Hydroxyvitamin D3"
            standard-unit "nmol/L"
            molecular-weight 400.64
        }
        mapping "/observationMappings/glucose" {
            display "Glucose"
            standard-unit "mmol/L"
            molecular-weight 180.16
        }
        mapping "/observationMappings/hemoglobin" {
            standard-unit "g/dL"
        }
    "#};

    fn parse_mappings(kdl: &str) -> ValidationResult<MappingDatabase> {
        let db: MappingDatabaseKdl = knuffel::parse("test", kdl).unwrap();
        db.validate(&UNIT_DB)
    }

    #[test]
    fn build_mapping_database() {
        let db = MappingDatabase::new(&UNIT_DB, "mappings.kdl", MAPPINGS_KDL).unwrap();
        assert_eq!(db.len(), 3);
        assert!(!db.is_empty());

        let vitamin_d = db.get(&MappingRef::from(VITAMIN_D)).unwrap();
        assert_eq!(vitamin_d.display(), Some("25-Hydroxyvitamin D3"));
        assert_eq!(vitamin_d.standard_unit(), Some("nmol/L"));
        assert_eq!(vitamin_d.molecular_weight(), Some(dec!(400.64)));

        let hemoglobin = db.get(&"/observationMappings/hemoglobin".into()).unwrap();
        assert_eq!(hemoglobin.display(), None);
        assert_eq!(hemoglobin.molecular_weight(), None);

        assert_eq!(db.get(&"/observationMappings/missing".into()), None);
    }

    #[test]
    fn empty_mapping_database() {
        let db = MappingDatabase::new(&UNIT_DB, "empty.kdl", "").unwrap();
        assert!(db.is_empty());
        assert_eq!(db, MappingDatabase::default());
    }

    #[test]
    fn resolve_in_order() {
        let db = MappingDatabase::new(&UNIT_DB, "mappings.kdl", MAPPINGS_KDL).unwrap();
        let references = [
            MappingRef::from("/observationMappings/glucose"),
            MappingRef::from("/observationMappings/missing"),
            MappingRef::from(VITAMIN_D),
        ];
        let documents = db.resolve(&references);
        let resolved: Vec<_> = documents.iter().map(|d| d.reference().as_str()).collect();
        assert_eq!(resolved, vec!["/observationMappings/glucose", VITAMIN_D]);
        assert!(db.resolve(&[]).is_empty());
    }

    #[test]
    fn duplicate_mapping() {
        let kdl = indoc! {r#"
            mapping "/observationMappings/glucose" {
                standard-unit "mmol/L"
            }
            mapping "/observationMappings/glucose" {
                standard-unit "mg/dL"
            }
        "#};
        let err = parse_mappings(kdl).unwrap_err();
        assert_snapshot!(err, @"the mapping /observationMappings/glucose has already been defined");
        assert_eq!(err.labels().len(), 2);
    }

    #[test]
    fn invalid_standard_unit() {
        let kdl = indoc! {r#"
            mapping "/observationMappings/glucose" {
                standard-unit "mmol/X"
            }
        "#};
        let err = parse_mappings(kdl).unwrap_err();
        assert_snapshot!(err, @r#"the standard unit "mmol/X" is not a valid unit expression"#);
        let MappingDatabaseErrorKind::InvalidStandardUnit(_, _, cause) = err else {
            panic!("expected an invalid standard unit");
        };
        assert_snapshot!(cause, @r#"the unit "X" could not be found in the supplied unit database"#);
    }

    #[test]
    fn non_positive_molecular_weight() {
        let kdl = indoc! {r#"
            mapping "/observationMappings/glucose" {
                standard-unit "mmol/L"
                molecular-weight 0
            }
        "#};
        let err = parse_mappings(kdl).unwrap_err();
        assert_snapshot!(err, @"molecular weights must be positive, but got 0 g/mol");
    }

    #[test]
    fn validation_errors_are_reported_with_source() {
        let kdl = indoc! {r#"
            mapping "/observationMappings/glucose" {
                molecular-weight -180.16
            }
        "#};
        let err = MappingDatabase::new(&UNIT_DB, "test", kdl).unwrap_err();
        assert_snapshot!(err, @"failed to validate mapping database file");
        assert_eq!(err.labels().into_iter().flatten().count(), 1);
    }

    #[test]
    fn malformed_kdl() {
        let kdl = indoc! {r#"
            mapping {
                standard-unit "mmol/L"
            }
        "#};
        assert!(MappingDatabase::new(&UNIT_DB, "test", kdl).is_err());
    }

    #[tokio::test]
    async fn load_from_file() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../tests/data/mappings.kdl");
        let db = MappingDatabase::load(&UNIT_DB, path).await.unwrap();
        let vitamin_d = db.get(&VITAMIN_D.into()).unwrap();
        assert_eq!(vitamin_d.molecular_weight(), Some(dec!(400.64)));
    }

    #[tokio::test]
    async fn load_missing_file() {
        let err = MappingDatabase::load(&UNIT_DB, "does/not/exist.kdl")
            .await
            .unwrap_err();
        assert_snapshot!(err, @"failed to read mapping database does/not/exist.kdl");
    }
}
