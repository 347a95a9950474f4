//! The [`AddressBook`] facade: the one interface the HTTP layer calls.
//!
//! Inbound payloads are validated here, then handed to the store for CRUD or
//! to the [`DistanceSearch`] engine for radius queries. The store is held
//! explicitly; there is no global state.
//!
//! ```rust
//! use address_book::{AddressBook, AddressPayload};
//!
//! let book = AddressBook::in_memory();
//! let created = book.create(&AddressPayload::new(
//!     "Broadway 1", "New York", "NY", "10004", "USA", 40.7128, -74.0060,
//! ))?;
//!
//! let nearby = book.search(40.7128, -74.0060, 50.0)?;
//! assert_eq!(nearby[0].address.id, created.id);
//! # Ok::<(), address_book::error::AddressBookError>(())
//! ```

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::{
    config::ServiceConfig,
    error::{AddressBookError, Result},
    model::{Address, AddressId, AddressPatch, AddressPayload, Pagination},
    search::{DistanceSearch, NearbyAddress},
    store::{AddressStore, MemoryStore, open_store},
    validation::validate_address,
};

/// Cheap to clone; clones share the same store.
#[derive(Debug, Clone)]
pub struct AddressBook {
    store: Arc<dyn AddressStore>,
    search: DistanceSearch,
}

impl AddressBook {
    pub fn new(store: Arc<dyn AddressStore>, search: DistanceSearch) -> Self {
        Self { store, search }
    }

    /// Backed by a fresh [`MemoryStore`] and the default Earth radius.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), DistanceSearch::default())
    }

    /// Open the store named by `config` and wire up the search engine.
    #[instrument(name = "Open AddressBook", level = "info", skip(config), fields(database = %config.database))]
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let t_init = std::time::Instant::now();
        let store = open_store(config)?;
        info!(
            elapsed_seconds = ?t_init.elapsed(),
            "AddressBook initialization complete"
        );
        Ok(Self::new(store, DistanceSearch::new(config.earth_radius_km)))
    }

    pub fn store(&self) -> &dyn AddressStore {
        self.store.as_ref()
    }

    pub const fn search_engine(&self) -> &DistanceSearch {
        &self.search
    }

    #[instrument(level = "info", skip_all)]
    pub fn create(&self, payload: &AddressPayload) -> Result<Address> {
        let record = validate_address(payload)?;
        info!(city = %record.city, country = %record.country, "Creating new address");
        let address = self.store.create(record)?;
        info!(id = %address.id, "Address created");
        Ok(address)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn get(&self, id: AddressId) -> Result<Address> {
        self.store.get(id).inspect_err(log_not_found)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn list(&self, page: Pagination) -> Result<Vec<Address>> {
        self.store.list(page)
    }

    #[instrument(level = "info", skip(self, patch))]
    pub fn update(&self, id: AddressId, patch: &AddressPatch) -> Result<Address> {
        let address = self.store.update(id, patch).inspect_err(log_not_found)?;
        info!(%id, "Address updated");
        Ok(address)
    }

    #[instrument(level = "info", skip(self))]
    pub fn delete(&self, id: AddressId) -> Result<()> {
        self.store.delete(id).inspect_err(log_not_found)?;
        info!(%id, "Address deleted");
        Ok(())
    }

    /// Addresses within `radius_km` of the center, nearest first.
    #[instrument(level = "info", skip(self))]
    pub fn search(
        &self,
        center_lat: f64,
        center_lon: f64,
        radius_km: f64,
    ) -> Result<Vec<NearbyAddress>> {
        let hits = self
            .search
            .search(self.store.as_ref(), center_lat, center_lon, radius_km)?;
        info!(found = hits.len(), "Radius search finished");
        Ok(hits)
    }

    pub fn count(&self) -> Result<usize> {
        self.store.count()
    }
}

fn log_not_found(err: &AddressBookError) {
    if let AddressBookError::NotFound(id) = err {
        warn!(%id, "Address not found");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn london() -> AddressPayload {
        AddressPayload::new(
            "221B Baker Street",
            "London",
            "Greater London",
            "NW1 6XE",
            "UK",
            51.5238,
            -0.1586,
        )
    }

    #[test]
    fn test_create_validates_before_store() {
        let book = AddressBook::in_memory();
        let mut payload = london();
        payload.latitude = Some(120.0.into());
        assert!(matches!(
            book.create(&payload),
            Err(AddressBookError::Validation(e)) if e.has_field("latitude")
        ));
        assert_eq!(book.count().unwrap(), 0);
    }

    #[test]
    fn test_clones_share_the_store() {
        let book = AddressBook::in_memory();
        let other = book.clone();
        let created = book.create(&london()).unwrap();
        assert_eq!(other.get(created.id).unwrap(), created);
    }

    #[test]
    fn test_from_config_uses_configured_radius() {
        let config = crate::ServiceConfigBuilder::ephemeral()
            .earth_radius_km(1.0)
            .build()
            .unwrap();
        let book = AddressBook::from_config(&config).unwrap();
        assert_eq!(book.search_engine().earth_radius_km(), 1.0);
        assert_eq!(book.store().backend(), "memory");
    }
}
