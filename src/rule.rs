use std::fmt::{self, Display, Formatter};

use mapping_db::MappingRef;
use rust_decimal::Decimal;

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RangeRule {
    unit: String,
    min: Option<Decimal>,
    max: Option<Decimal>,
    unit_not_required: bool,
    mappings: Vec<MappingRef>,
}

/// The numeric range a rule accepts. Every bound is exclusive.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Bounds {
    Between(Decimal, Decimal),
    Above(Decimal),
    Below(Decimal),
}

impl RangeRule {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            min: None,
            max: None,
            unit_not_required: false,
            mappings: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_min(mut self, min: Decimal) -> Self {
        self.min = Some(min);
        self
    }

    #[must_use]
    pub const fn with_max(mut self, max: Decimal) -> Self {
        self.max = Some(max);
        self
    }

    /// Compares measurement values as they are, without converting them into the rule's unit
    #[must_use]
    pub const fn with_unit_not_required(mut self, unit_not_required: bool) -> Self {
        self.unit_not_required = unit_not_required;
        self
    }

    #[must_use]
    pub fn with_mappings(mut self, mappings: impl IntoIterator<Item = impl Into<MappingRef>>) -> Self {
        self.mappings = mappings.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    #[must_use]
    pub const fn min(&self) -> Option<Decimal> {
        self.min
    }

    #[must_use]
    pub const fn max(&self) -> Option<Decimal> {
        self.max
    }

    #[must_use]
    pub const fn unit_not_required(&self) -> bool {
        self.unit_not_required
    }

    #[must_use]
    pub fn mappings(&self) -> &[MappingRef] {
        &self.mappings
    }

    /// Returns `None` for a rule that has neither a `min` nor a `max`
    #[must_use]
    pub const fn bounds(&self) -> Option<Bounds> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => Some(Bounds::Between(min, max)),
            (Some(min), None) => Some(Bounds::Above(min)),
            (None, Some(max)) => Some(Bounds::Below(max)),
            (None, None) => None,
        }
    }
}

impl Bounds {
    #[must_use]
    pub fn contains(&self, value: Decimal) -> bool {
        match *self {
            Self::Between(min, max) => min < value && value < max,
            Self::Above(min) => value > min,
            Self::Below(max) => value < max,
        }
    }
}

impl Display for Bounds {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Between(min, max) => write!(f, "between {min} and {max}"),
            Self::Above(min) => write!(f, "above {min}"),
            Self::Below(max) => write!(f, "below {max}"),
        }
    }
}
