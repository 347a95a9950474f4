use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::{error::AddressBookError, search::EARTH_RADIUS_KM};

pub const PROJECT_NAME: &str = "Address Book API";
pub const DESCRIPTION: &str = "API for managing addresses with geolocation capabilities";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_DB_FILE: &str = "address_book.db";
const ENV_PREFIX: &str = "ADDRESS_BOOK_";

/// Where address records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// Plain in-process map, gone when the process exits.
    Memory,
    /// SQLite without a backing file.
    SqliteInMemory,
    SqliteFile(PathBuf),
}

impl DatabaseLocation {
    /// `memory`, `:memory:` or a filesystem path (optionally `sqlite://`-prefixed).
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "memory" => Self::Memory,
            ":memory:" | "sqlite://:memory:" => Self::SqliteInMemory,
            other => Self::SqliteFile(PathBuf::from(
                other.strip_prefix("sqlite://").unwrap_or(other),
            )),
        }
    }

    /// `address_book.db` inside the platform data directory, or the working
    /// directory when no such directory can be determined.
    pub fn default_file() -> Self {
        Self::SqliteFile(
            data_dir().map_or_else(|| PathBuf::from(DEFAULT_DB_FILE), |dir| dir.join(DEFAULT_DB_FILE)),
        )
    }
}

#[cfg(feature = "system-dirs")]
fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "address-book").map(|dirs| dirs.data_dir().to_path_buf())
}

#[cfg(not(feature = "system-dirs"))]
fn data_dir() -> Option<PathBuf> {
    None
}

impl fmt::Display for DatabaseLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::SqliteInMemory => write!(f, ":memory:"),
            Self::SqliteFile(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Runtime settings for the store, the search engine and the HTTP server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub database: DatabaseLocation,
    /// Sphere radius used by the haversine distance
    pub earth_radius_km: f64,
    /// Extra log destination next to stdout
    pub log_file: Option<PathBuf>,
    /// Upper bound on a single HTTP request
    pub request_timeout: Duration,
    /// How long SQLite waits on a locked database before giving up
    pub busy_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            database: DatabaseLocation::default_file(),
            earth_radius_km: EARTH_RADIUS_KM,
            log_file: None,
            request_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

impl ServiceConfig {
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::new()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Read `ADDRESS_BOOK_*` variables from the process environment.
    pub fn from_env() -> Result<Self, AddressBookError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup, starting from the defaults.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AddressBookError> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut builder = ServiceConfigBuilder::new();

        if let Some(host) = var("HOST") {
            builder = builder.host(host);
        }
        if let Some(port) = var("PORT") {
            builder = builder.port(parse_var("PORT", &port)?);
        }
        if let Some(database) = var("DATABASE") {
            builder = builder.database(DatabaseLocation::parse(&database));
        }
        if let Some(radius) = var("EARTH_RADIUS_KM") {
            builder = builder.earth_radius_km(parse_var("EARTH_RADIUS_KM", &radius)?);
        }
        if let Some(path) = var("LOG_FILE").filter(|p| !p.trim().is_empty()) {
            builder = builder.log_file(path);
        }
        if let Some(secs) = var("REQUEST_TIMEOUT_SECS") {
            builder = builder.request_timeout(Duration::from_secs(parse_var(
                "REQUEST_TIMEOUT_SECS",
                &secs,
            )?));
        }
        if let Some(millis) = var("BUSY_TIMEOUT_MS") {
            builder = builder.busy_timeout(Duration::from_millis(parse_var(
                "BUSY_TIMEOUT_MS",
                &millis,
            )?));
        }
        builder.build()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, AddressBookError>
where
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e| {
        AddressBookError::ConfigError(format!("{ENV_PREFIX}{name}={value:?} is invalid: {e}"))
    })
}

/// Builder for [`ServiceConfig`] with the service defaults pre-filled
#[derive(Debug, Clone, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::default(),
        }
    }

    /// Preset for tests and demos: in-memory store, loopback, ephemeral port.
    pub fn ephemeral() -> Self {
        Self::new()
            .host("127.0.0.1")
            .port(0)
            .database(DatabaseLocation::Memory)
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn database(mut self, database: DatabaseLocation) -> Self {
        self.config.database = database;
        self
    }

    pub fn earth_radius_km(mut self, radius_km: f64) -> Self {
        self.config.earth_radius_km = radius_km;
        self
    }

    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_file = Some(path.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.config.busy_timeout = timeout;
        self
    }

    /// Build the final configuration, rejecting values the service cannot run with.
    pub fn build(self) -> Result<ServiceConfig, AddressBookError> {
        let config = self.config;
        if !(config.earth_radius_km.is_finite() && config.earth_radius_km > 0.0) {
            return Err(AddressBookError::ConfigError(format!(
                "Earth radius must be a positive number of kilometres, got {}",
                config.earth_radius_km
            )));
        }
        if config.host.trim().is_empty() {
            return Err(AddressBookError::ConfigError(
                "Host must not be empty".to_string(),
            ));
        }
        if config.request_timeout.is_zero() {
            return Err(AddressBookError::ConfigError(
                "Request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }
}
