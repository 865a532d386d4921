use log::debug;
use mapping_db::{MappingDocument, MappingRef};
use rust_decimal::Decimal;
use unitconv::Conversion;

use crate::{
    Measurement, RangeRule,
    collaborators::{MappingStore, UnitConverter},
    errors::{Result, ValidationError},
};

/// Checks measurements against the range of a [`RangeRule`], converting them into the rule's unit first.
///
/// Conversions between masses and amounts of substance need a molecular weight. When the converter reports that one
/// is missing, the validator can fall back to the molecular weight of a mapping document fetched from its
/// [`MappingStore`]. This fallback is enabled by default.
#[derive(Clone, Debug)]
pub struct RangeValidator<C, S> {
    converter: C,
    store: S,
    molecular_weight_fallback: bool,
}

impl<C: UnitConverter, S: MappingStore> RangeValidator<C, S> {
    pub const fn new(converter: C, store: S) -> Self {
        Self {
            converter,
            store,
            molecular_weight_fallback: true,
        }
    }

    /// When disabled, a missing molecular weight is treated like any other failed conversion
    #[must_use]
    pub const fn with_molecular_weight_fallback(mut self, enabled: bool) -> Self {
        self.molecular_weight_fallback = enabled;
        self
    }

    /// Returns whether `measurement` falls strictly inside the bounds of `rule`.
    ///
    /// `mapping_refs` are only fetched if a molecular weight is needed, and the first document with a standard unit
    /// matching the unit of `measurement` must provide it. A measurement that just can't be converted into the
    /// rule's unit is reported as `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Fails if `rule` has no bounds, if no usable molecular weight can be found or used, and if the converter or the
    /// mapping store report an error.
    pub async fn is_within_range(
        &self,
        measurement: &Measurement,
        rule: &RangeRule,
        mapping_refs: &[MappingRef],
    ) -> Result<bool> {
        let bounds = rule.bounds().ok_or(ValidationError::Unbounded)?;

        let value = if rule.unit_not_required() {
            measurement.value()
        } else {
            match self.convert(measurement, rule.unit(), None)? {
                Conversion::Succeeded(value) => value,
                Conversion::Failed(failure)
                    if self.molecular_weight_fallback && failure.needs_molecular_weight() =>
                {
                    self.convert_with_mapping(measurement, rule.unit(), mapping_refs)
                        .await?
                }
                Conversion::Failed(failure) => {
                    debug!("{measurement} can't be compared against a rule in {:?}: {failure}", rule.unit());
                    return Ok(false);
                }
            }
        };

        Ok(bounds.contains(value))
    }

    /// Like [`RangeValidator::is_within_range`], but uses the mappings attached to `rule`
    ///
    /// # Errors
    ///
    /// See [`RangeValidator::is_within_range`]
    pub async fn is_within_rule_range(&self, measurement: &Measurement, rule: &RangeRule) -> Result<bool> {
        self.is_within_range(measurement, rule, rule.mappings()).await
    }

    fn convert(&self, measurement: &Measurement, to: &str, molecular_weight: Option<Decimal>) -> Result<Conversion> {
        let from = measurement.unit();
        self.converter
            .convert_unit_to(from, measurement.value(), to, molecular_weight)
            .map_err(|e| ValidationError::converter(from, to, e))
    }

    async fn convert_with_mapping(
        &self,
        measurement: &Measurement,
        to: &str,
        mapping_refs: &[MappingRef],
    ) -> Result<Decimal> {
        let from = measurement.unit();
        debug!(
            "converting {from:?} to {to:?} needs a molecular weight, searching {} mapping document(s)",
            mapping_refs.len()
        );

        let documents = self
            .store
            .resolve(mapping_refs)
            .await
            .map_err(ValidationError::store)?;

        // NOTE: Only the first document with a matching unit is considered, even if it lacks a molecular weight
        let molecular_weight = documents
            .iter()
            .find(|document| document.standard_unit() == Some(from))
            .and_then(MappingDocument::molecular_weight)
            .ok_or_else(|| ValidationError::missing_molecular_weight(from))?;
        debug!("using a molecular weight of {molecular_weight} g/mol for {from:?}");

        match self.convert(measurement, to, Some(molecular_weight))? {
            Conversion::Succeeded(value) => Ok(value),
            Conversion::Failed(failure) => Err(ValidationError::fallback_conversion(
                from,
                to,
                molecular_weight,
                failure,
            )),
        }
    }
}
