use std::{
    collections::VecDeque,
    future::{self, Future},
    io,
    sync::{
        LazyLock, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use mapping_db::{MappingDatabase, MappingDocument, MappingRef};
use rust_decimal::Decimal;
use unitconv::{Conversion, UnitDatabase};

use crate::collaborators::{MappingStore, UnitConverter};

pub const MAPPINGS_KDL: &str = include_str!("../tests/data/mappings.kdl");
pub const RULES_KDL: &str = include_str!("../tests/data/rules.kdl");

pub const ALBUMIN: &str =
    "/apps/curehub/observationMappings/8c8904d0a7b5ae8c4d2bac4bffdc2ff8e5cbd69d0ec716da7c63c8a84d48f4bb";
pub const VITAMIN_D: &str =
    "/apps/curehub/observationMappings/96cf450f2578b40ddbf0b524fe8c41d73291f6ef6c190793d0d5c2e9f4b17d3d";
pub const VITAMIN_D_MASS: &str =
    "/apps/curehub/observationMappings/08759cd69999593a2567cf2324dc0efbbef7879cff524f04c106980b8a4db597";
pub const GLUCOSE: &str =
    "/apps/curehub/observationMappings/d1b71ef6c01de8f2adc7f229aad6a93c0db1cf9cba860c11d2069e85ed0037f1";

pub static UNIT_DB: LazyLock<UnitDatabase> = LazyLock::new(UnitDatabase::default);

pub static MAPPING_DB: LazyLock<MappingDatabase> =
    LazyLock::new(|| MappingDatabase::new(&*UNIT_DB, "mappings.kdl", MAPPINGS_KDL).unwrap());

// Stores ==============================================================================================================

/// Counts how many times the wrapped store has been asked to resolve documents
pub struct CountingStore<S> {
    store: S,
    fetches: AtomicUsize,
}

impl<S> CountingStore<S> {
    pub const fn new(store: S) -> Self {
        Self {
            store,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl<S: MappingStore> MappingStore for CountingStore<S> {
    type Error = S::Error;

    fn resolve(
        &self,
        references: &[MappingRef],
    ) -> impl Future<Output = Result<Vec<MappingDocument>, Self::Error>> + Send {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.store.resolve(references)
    }
}

/// Serves a fixed list of documents, keeping the order they were given in (and any duplicate units)
pub struct StaticStore(Vec<MappingDocument>);

impl StaticStore {
    pub fn new(documents: impl IntoIterator<Item = MappingDocument>) -> Self {
        Self(documents.into_iter().collect())
    }
}

impl MappingStore for StaticStore {
    type Error = io::Error;

    fn resolve(
        &self,
        references: &[MappingRef],
    ) -> impl Future<Output = Result<Vec<MappingDocument>, Self::Error>> + Send {
        let documents: Vec<_> = references
            .iter()
            .filter_map(|reference| self.0.iter().find(|d| d.reference() == reference))
            .cloned()
            .collect();
        future::ready(Ok(documents))
    }
}

pub struct FailingStore;

impl MappingStore for FailingStore {
    type Error = io::Error;

    fn resolve(
        &self,
        _references: &[MappingRef],
    ) -> impl Future<Output = Result<Vec<MappingDocument>, Self::Error>> + Send {
        future::ready(Err(io::Error::other("store unavailable")))
    }
}

// Converters ==========================================================================================================

pub struct BrokenConverter;

impl UnitConverter for BrokenConverter {
    type Error = io::Error;

    fn convert_unit_to(
        &self,
        _from: &str,
        _value: Decimal,
        _to: &str,
        _molecular_weight: Option<Decimal>,
    ) -> Result<Conversion, Self::Error> {
        Err(io::Error::other("converter crashed"))
    }
}

/// Replays a fixed sequence of conversions, recording the molecular weight it was given each time
pub struct ScriptedConverter {
    conversions: Mutex<VecDeque<Conversion>>,
    molecular_weights: Mutex<Vec<Option<Decimal>>>,
}

impl ScriptedConverter {
    pub fn new(conversions: impl IntoIterator<Item = Conversion>) -> Self {
        Self {
            conversions: Mutex::new(conversions.into_iter().collect()),
            molecular_weights: Mutex::default(),
        }
    }

    pub fn molecular_weights(&self) -> Vec<Option<Decimal>> {
        self.molecular_weights.lock().unwrap().clone()
    }
}

impl UnitConverter for ScriptedConverter {
    type Error = io::Error;

    fn convert_unit_to(
        &self,
        _from: &str,
        _value: Decimal,
        _to: &str,
        molecular_weight: Option<Decimal>,
    ) -> Result<Conversion, Self::Error> {
        self.molecular_weights.lock().unwrap().push(molecular_weight);
        self.conversions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| io::Error::other("ran out of scripted conversions"))
    }
}
