//! Address Book - address records with coordinates and radius search
//!
//! Address Book stores street addresses together with their latitude and
//! longitude, and answers "what is within `r` km of this point?" using
//! great-circle (haversine) distances.
//!
//! # Quick Start
//!
//! ```rust
//! use address_book::{AddressBook, AddressPatch, AddressPayload};
//!
//! let book = AddressBook::in_memory();
//!
//! let nyc = book.create(&AddressPayload::new(
//!     "Broadway 1", "New York", "NY", "10004", "USA", 40.7128, -74.0060,
//! ))?;
//! book.create(&AddressPayload::new(
//!     "1 World Way", "Los Angeles", "CA", "90045", "USA", 34.0522, -118.2437,
//! ))?;
//!
//! // Only New York is within 50 km of New York
//! let nearby = book.search(40.7128, -74.0060, 50.0)?;
//! assert_eq!(nearby.len(), 1);
//! assert_eq!(nearby[0].address.id, nyc.id);
//!
//! // Partial update
//! let patch = AddressPatch { city: Some("NYC".into()), ..Default::default() };
//! let updated = book.update(nyc.id, &patch)?;
//! assert_eq!(updated.street, nyc.street);
//! # Ok::<(), address_book::error::AddressBookError>(())
//! ```
//!
//! # Storage
//!
//! Records live behind the [`AddressStore`] trait. [`MemoryStore`] keeps them in
//! process; [`SqliteStore`] persists them to a SQLite file and commits every
//! change before returning.
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use once_cell::sync::OnceCell;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, fmt::format::FmtSpan, prelude::*};

mod config;
mod core;
pub mod error;
mod model;
mod search;
mod store;
mod validation;

pub use config::{
    DESCRIPTION, DatabaseLocation, PROJECT_NAME, ServiceConfig, ServiceConfigBuilder, VERSION,
};
pub use self::core::AddressBook;
pub use model::{
    Address, AddressId, AddressPatch, AddressPayload, CoordinateInput, DEFAULT_PAGE_LIMIT,
    MAX_PAGE_LIMIT, NewAddress, Pagination, TextInput,
};
pub use search::{DistanceSearch, EARTH_RADIUS_KM, GeoPoint, NearbyAddress, haversine_km};
pub use store::{
    AddressStore, LatitudeBand, MemoryStore, PersistenceError, SqliteStore, open_store,
};
pub use validation::{FieldViolation, ValidationError, validate_address};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Initialize logging for the address book.
///
/// Sets up structured logging to stdout. `RUST_LOG` takes precedence over
/// `level` when it is set. Only the first call has any effect.
///
/// # Examples
///
/// ```rust
/// use address_book::init_logging;
/// use tracing::Level;
///
/// init_logging(Level::INFO)?;
/// # Ok::<(), address_book::error::AddressBookError>(())
/// ```
pub fn init_logging(level: impl Into<LevelFilter>) -> Result<&'static (), error::AddressBookError> {
    init_logging_with_file(level, None)
}

/// Like [`init_logging`], additionally appending plain-text logs to `log_file`.
pub fn init_logging_with_file(
    level: impl Into<LevelFilter>,
    log_file: Option<&Path>,
) -> Result<&'static (), error::AddressBookError> {
    LOGGER_INIT.get_or_try_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level.into().to_string()))?
            .add_directive("hyper_util=warn".parse()?)
            .add_directive("rusqlite=warn".parse()?);

        let file_layer = match log_file {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            }
            None => None,
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_span_events(FmtSpan::CLOSE))
            .with(file_layer)
            .try_init()
            .map_err(|e| error::AddressBookError::ConfigError(format!("logging: {e}")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_env() {
        let _ = init_logging(tracing::Level::WARN);
    }

    fn payload(city: &str, latitude: f64, longitude: f64) -> AddressPayload {
        AddressPayload::new("Main Street 1", city, "Region", "12345", "Country", latitude, longitude)
    }

    #[test]
    fn test_logging_initializes_once() {
        setup_test_env();
        assert!(init_logging(tracing::Level::DEBUG).is_ok());
    }

    #[test]
    fn test_book_over_sqlite() {
        setup_test_env();

        let store = std::sync::Arc::new(SqliteStore::open_in_memory().unwrap());
        let book = AddressBook::new(store, DistanceSearch::default());

        let paris = book.create(&payload("Paris", 48.8566, 2.3522)).unwrap();
        book.create(&payload("Versailles", 48.8049, 2.1204)).unwrap();
        book.create(&payload("Lyon", 45.7640, 4.8357)).unwrap();

        let hits = book.search(48.8566, 2.3522, 25.0).unwrap();
        let cities: Vec<_> = hits.iter().map(|h| h.address.city.as_str()).collect();
        assert_eq!(cities, ["Paris", "Versailles"]);
        assert_eq!(hits[0].address.id, paris.id);
    }

    #[test]
    fn test_search_respects_earth_radius() {
        setup_test_env();

        // On a unit sphere a quarter turn is pi/2 km.
        let book = AddressBook::new(
            std::sync::Arc::new(MemoryStore::new()),
            DistanceSearch::new(1.0),
        );
        book.create(&payload("Equator", 0.0, 90.0)).unwrap();
        let hits = book.search(0.0, 0.0, 2.0).unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].distance_km - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }
}
