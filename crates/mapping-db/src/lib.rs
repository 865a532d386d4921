//! Observation mapping documents (display names, standard units, and molecular weights) keyed by their document
//! reference, loaded from KDL

pub mod mapping_database;

use std::{
    borrow::Borrow,
    fmt::{self, Display, Formatter},
};

use rust_decimal::Decimal;

pub use mapping_database::MappingDatabase;

// ---------------------------------------------------------------------------------------------------------------------

/// An opaque reference to a mapping document, like `/apps/curehub/observationMappings/96cf…`
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct MappingRef(String);

impl MappingRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MappingRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MappingRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for MappingRef {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Display for MappingRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------------------------------------------------

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct MappingDocument {
    reference: MappingRef,
    display: Option<String>,
    standard_unit: Option<String>,
    molecular_weight: Option<Decimal>,
}

impl MappingDocument {
    pub fn new(reference: impl Into<MappingRef>) -> Self {
        Self {
            reference: reference.into(),
            display: None,
            standard_unit: None,
            molecular_weight: None,
        }
    }

    #[must_use]
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    #[must_use]
    pub fn with_standard_unit(mut self, standard_unit: impl Into<String>) -> Self {
        self.standard_unit = Some(standard_unit.into());
        self
    }

    #[must_use]
    pub const fn with_molecular_weight(mut self, molecular_weight: Decimal) -> Self {
        self.molecular_weight = Some(molecular_weight);
        self
    }

    #[must_use]
    pub const fn reference(&self) -> &MappingRef {
        &self.reference
    }

    #[must_use]
    pub fn display(&self) -> Option<&str> {
        self.display.as_deref()
    }

    #[must_use]
    pub fn standard_unit(&self) -> Option<&str> {
        self.standard_unit.as_deref()
    }

    /// In g/mol
    #[must_use]
    pub const fn molecular_weight(&self) -> Option<Decimal> {
        self.molecular_weight
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn build_document() {
        let document = MappingDocument::new("/observationMappings/vitamin-d")
            .with_display("25-Hydroxyvitamin D3")
            .with_standard_unit("nmol/L")
            .with_molecular_weight(dec!(400.64));
        assert_eq!(document.reference().as_str(), "/observationMappings/vitamin-d");
        assert_eq!(document.display(), Some("25-Hydroxyvitamin D3"));
        assert_eq!(document.standard_unit(), Some("nmol/L"));
        assert_eq!(document.molecular_weight(), Some(dec!(400.64)));

        let bare = MappingDocument::new(MappingRef::new("/observationMappings/empty"));
        assert_eq!(bare.display(), None);
        assert_eq!(bare.standard_unit(), None);
        assert_eq!(bare.molecular_weight(), None);
    }

    #[test]
    fn reference_conversions() {
        let reference = MappingRef::from("/a/b");
        assert_eq!(reference, MappingRef::from("/a/b".to_owned()));
        assert_eq!(reference.to_string(), "/a/b");
        let borrowed: &str = reference.borrow();
        assert_eq!(borrowed, "/a/b");
    }
}
