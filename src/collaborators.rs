use std::{convert::Infallible, error::Error as StdError, future::Future};

use mapping_db::{MappingDatabase, MappingDocument, MappingRef};
use rust_decimal::Decimal;
use unitconv::{Conversion, UnitDatabase, UnitError};

// Collaborator Traits =================================================================================================

pub trait UnitConverter {
    type Error: StdError + Send + Sync + 'static;

    /// Ordinary reasons for `from` and `to` not being interconvertible are reported as [`Conversion::Failed`], while
    /// `Err` is reserved for things going unexpectedly wrong
    fn convert_unit_to(
        &self,
        from: &str,
        value: Decimal,
        to: &str,
        molecular_weight: Option<Decimal>,
    ) -> Result<Conversion, Self::Error>;
}

pub trait MappingStore {
    type Error: StdError + Send + Sync + 'static;

    /// Fetches every document in `references` that exists, in order. Missing documents are left out, not reported
    fn resolve(
        &self,
        references: &[MappingRef],
    ) -> impl Future<Output = Result<Vec<MappingDocument>, Self::Error>> + Send;
}

// Reference Implementations ===========================================================================================

macro_rules! converter_ref_impls {
    ($($ref_type:ty),+ $(,)?) => {
        $(
            impl<T: UnitConverter> UnitConverter for $ref_type {
                type Error = T::Error;

                fn convert_unit_to(
                    &self,
                    from: &str,
                    value: Decimal,
                    to: &str,
                    molecular_weight: Option<Decimal>,
                ) -> Result<Conversion, Self::Error> {
                    (**self).convert_unit_to(from, value, to, molecular_weight)
                }
            }
        )+
    };
}

converter_ref_impls!(&T, &mut T, Box<T>);

macro_rules! store_ref_impls {
    ($($ref_type:ty),+ $(,)?) => {
        $(
            impl<T: MappingStore> MappingStore for $ref_type {
                type Error = T::Error;

                fn resolve(
                    &self,
                    references: &[MappingRef],
                ) -> impl Future<Output = Result<Vec<MappingDocument>, Self::Error>> + Send {
                    (**self).resolve(references)
                }
            }
        )+
    };
}

store_ref_impls!(&T, &mut T, Box<T>);

// Workspace Implementations ===========================================================================================

impl UnitConverter for UnitDatabase {
    type Error = Box<UnitError>;

    fn convert_unit_to(
        &self,
        from: &str,
        value: Decimal,
        to: &str,
        molecular_weight: Option<Decimal>,
    ) -> Result<Conversion, Self::Error> {
        Self::convert_unit_to(self, from, value, to, molecular_weight)
    }
}

// NOTE: Lookups in an in-memory database can't fail, so there's no error to report
impl MappingStore for MappingDatabase {
    type Error = Infallible;

    fn resolve(
        &self,
        references: &[MappingRef],
    ) -> impl Future<Output = Result<Vec<MappingDocument>, Self::Error>> + Send {
        std::future::ready(Ok(Self::resolve(self, references)))
    }
}
