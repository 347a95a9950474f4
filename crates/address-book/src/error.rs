use thiserror::Error;

use crate::model::AddressId;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AddressBookError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Address with ID {0} not found")]
    NotFound(AddressId),
    #[error("Persistence error: {0}")]
    Persistence(#[from] crate::store::PersistenceError),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Init Logging error: {0}")]
    InitLoggingError(#[from] tracing_subscriber::filter::ParseError),
}

impl From<rusqlite::Error> for AddressBookError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(err.into())
    }
}

pub type Result<T> = std::result::Result<T, AddressBookError>;
