use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::debug;

use super::{
    AddressStore, LatitudeBand, PersistenceError, apply_patch, check_pagination, revalidate,
};
use crate::{
    error::{AddressBookError, Result},
    model::{Address, AddressId, AddressPatch, NewAddress, Pagination},
};

#[derive(Debug, Default)]
struct Records {
    by_id: BTreeMap<AddressId, Address>,
    last_id: i64,
}

/// In-process store. Readers share the lock; writers take it exclusively.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Records>> {
        self.records
            .read()
            .map_err(|_| PersistenceError::Poisoned.into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Records>> {
        self.records
            .write()
            .map_err(|_| PersistenceError::Poisoned.into())
    }
}

impl AddressStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn create(&self, record: NewAddress) -> Result<Address> {
        let record = revalidate(record)?;
        let mut records = self.write()?;
        records.last_id += 1;
        let id = AddressId(records.last_id);
        let now = Utc::now();
        let address = record.into_address(id, now, now);
        records.by_id.insert(id, address.clone());
        debug!(%id, "Inserted address into memory store");
        Ok(address)
    }

    fn get(&self, id: AddressId) -> Result<Address> {
        self.read()?
            .by_id
            .get(&id)
            .cloned()
            .ok_or(AddressBookError::NotFound(id))
    }

    fn list(&self, page: Pagination) -> Result<Vec<Address>> {
        check_pagination(page)?;
        Ok(self
            .read()?
            .by_id
            .values()
            .skip(page.skip)
            .take(page.limit)
            .cloned()
            .collect())
    }

    fn update(&self, id: AddressId, patch: &AddressPatch) -> Result<Address> {
        let mut records = self.write()?;
        let slot = records
            .by_id
            .get_mut(&id)
            .ok_or(AddressBookError::NotFound(id))?;
        let updated = apply_patch(slot, patch)?;
        slot.clone_from(&updated);
        Ok(updated)
    }

    fn delete(&self, id: AddressId) -> Result<()> {
        self.write()?
            .by_id
            .remove(&id)
            .map(|_| ())
            .ok_or(AddressBookError::NotFound(id))
    }

    fn scan(&self, band: LatitudeBand) -> Result<Vec<Address>> {
        Ok(self
            .read()?
            .by_id
            .values()
            .filter(|address| band.contains(address.latitude))
            .cloned()
            .collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.read()?.by_id.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn record(city: &str, latitude: f64, longitude: f64) -> NewAddress {
        NewAddress {
            street: "1 High Street".into(),
            city: city.into(),
            state: "Greater London".into(),
            postal_code: "SW1A 1AA".into(),
            country: "UK".into(),
            latitude,
            longitude,
        }
    }

    #[test]
    fn test_ids_are_not_reused_after_delete() {
        let store = MemoryStore::new();
        let first = store.create(record("London", 51.5, -0.12)).unwrap();
        store.delete(first.id).unwrap();
        let second = store.create(record("London", 51.5, -0.12)).unwrap();
        assert!(second.id > first.id);
    }

    #[test]
    fn test_create_rejects_invalid_record() {
        let store = MemoryStore::new();
        let err = store.create(record(" ", 123.0, 0.0)).unwrap_err();
        let AddressBookError::Validation(err) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(err.has_field("city"));
        assert!(err.has_field("latitude"));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_invalid_update_leaves_record_untouched() {
        let store = MemoryStore::new();
        let created = store.create(record("London", 51.5, -0.12)).unwrap();
        let patch = AddressPatch {
            longitude: Some(200.0.into()),
            ..Default::default()
        };
        assert!(matches!(
            store.update(created.id, &patch),
            Err(AddressBookError::Validation(_))
        ));
        assert_eq!(store.get(created.id).unwrap(), created);
    }

    #[test]
    fn test_scan_filters_by_band() {
        let store = MemoryStore::new();
        store.create(record("London", 51.5, -0.12)).unwrap();
        store.create(record("Madrid", 40.4, -3.7)).unwrap();
        let hits = store.scan(LatitudeBand::new(50.0, 52.0)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].city, "London");
    }

    #[test]
    fn test_concurrent_updates_stay_consistent() {
        let store = Arc::new(MemoryStore::new());
        let created = store.create(record("London", 51.5, -0.12)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let patch = AddressPatch {
                        city: Some(format!("City {i}").into()),
                        postal_code: Some(format!("PC {i}").into()),
                        ..Default::default()
                    };
                    store.update(created.id, &patch).unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = store.get(created.id).unwrap();
        let city_suffix = stored.city.trim_start_matches("City ");
        let postal_suffix = stored.postal_code.trim_start_matches("PC ");
        assert_eq!(city_suffix, postal_suffix, "fields from different writers interleaved");
        assert!(stored.updated_at >= created.updated_at);
    }
}
