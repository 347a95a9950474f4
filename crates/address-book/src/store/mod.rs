//! Persistence for address records.
//!
//! [`AddressStore`] is the repository seam: the facade and the search engine
//! only ever talk to this trait, so backends can be swapped without touching
//! either. Two backends ship with the crate:
//!
//! - [`MemoryStore`]: a `BTreeMap` behind an `RwLock`. Used by tests and for
//!   throwaway runs.
//! - [`SqliteStore`]: a single SQLite connection behind a mutex. Every mutating
//!   call commits before it returns.
//!
//! Both backends serialize writes to the same record (read-merge-write happens
//! under one lock or one transaction) and hand out owned copies of records.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::{
    config::{DatabaseLocation, ServiceConfig},
    error::Result,
    model::{Address, AddressId, AddressPatch, AddressPayload, MAX_PAGE_LIMIT, NewAddress, Pagination},
    validation::{LATITUDE_RANGE, ValidationError, validate_address},
};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Store lock poisoned by a panicking writer")]
    Poisoned,
    #[error("Corrupt store data: {0}")]
    Corrupt(String),
}

/// Closed latitude interval used to narrow a scan before distances are computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatitudeBand {
    pub min: f64,
    pub max: f64,
}

impl LatitudeBand {
    /// The band covering every valid latitude.
    pub const ALL: Self = Self {
        min: LATITUDE_RANGE.0,
        max: LATITUDE_RANGE.1,
    };

    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, latitude: f64) -> bool {
        (self.min..=self.max).contains(&latitude)
    }
}

impl Default for LatitudeBand {
    fn default() -> Self {
        Self::ALL
    }
}

/// Repository of address records keyed by [`AddressId`].
pub trait AddressStore: Send + Sync + std::fmt::Debug {
    /// Short backend name, used in logs and the health endpoint.
    fn backend(&self) -> &'static str;

    /// Persist a new record, assigning its id and timestamps.
    fn create(&self, record: NewAddress) -> Result<Address>;

    fn get(&self, id: AddressId) -> Result<Address>;

    /// A page of records in ascending id order. Never fails on an empty page.
    fn list(&self, page: Pagination) -> Result<Vec<Address>>;

    /// Merge `patch` into the stored record, revalidate, and refresh `updated_at`.
    fn update(&self, id: AddressId, patch: &AddressPatch) -> Result<Address>;

    /// Hard delete. Deleting an absent id is always `NotFound`.
    fn delete(&self, id: AddressId) -> Result<()>;

    /// Every record whose latitude lies inside `band`, in ascending id order.
    fn scan(&self, band: LatitudeBand) -> Result<Vec<Address>>;

    fn count(&self) -> Result<usize>;
}

/// Re-run validation on a record about to be inserted.
///
/// `NewAddress` has public fields, so a store cannot assume it came through
/// [`validate_address`].
pub(crate) fn revalidate(record: NewAddress) -> std::result::Result<NewAddress, ValidationError> {
    validate_address(&AddressPayload::from(record))
}

/// Merge a patch onto an existing record and validate the result.
pub(crate) fn apply_patch(
    existing: &Address,
    patch: &AddressPatch,
) -> std::result::Result<Address, ValidationError> {
    let merged = validate_address(&patch.merge_onto(existing))?;
    Ok(merged.into_address(
        existing.id,
        existing.created_at,
        next_updated_at(existing.updated_at),
    ))
}

/// `updated_at` for a modification, never earlier than the previous value even if
/// the wall clock stepped backwards.
pub(crate) fn next_updated_at(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous)
}

pub(crate) fn check_pagination(page: Pagination) -> std::result::Result<(), ValidationError> {
    if page.limit == 0 || page.limit > MAX_PAGE_LIMIT {
        return Err(ValidationError::single(
            "limit",
            format!("must be between 1 and {MAX_PAGE_LIMIT}, got {}", page.limit),
        ));
    }
    Ok(())
}

/// Open the backend described by the service configuration.
pub fn open_store(config: &ServiceConfig) -> Result<Arc<dyn AddressStore>> {
    let store: Arc<dyn AddressStore> = match &config.database {
        DatabaseLocation::Memory => Arc::new(MemoryStore::new()),
        DatabaseLocation::SqliteInMemory => Arc::new(SqliteStore::open_in_memory()?),
        DatabaseLocation::SqliteFile(path) => {
            Arc::new(SqliteStore::open(path, config.busy_timeout)?)
        }
    };
    info!(backend = store.backend(), database = %config.database, "Address store ready");
    Ok(store)
}
