//! Address records and the payloads that create or modify them.
//!
//! [`Address`] is the persisted shape handed out by every store. Callers always
//! receive owned copies; nothing in this module borrows from storage.
//!
//! Inbound data arrives as an [`AddressPayload`] (create) or an [`AddressPatch`]
//! (partial update). Every field in both is optional; validation reports all
//! missing or malformed fields at once.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// System-assigned identifier of an address record.
///
/// Identifiers are handed out in increasing order and never reused, even after
/// the record they named has been deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressId(pub i64);

impl AddressId {
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for AddressId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for AddressId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored address with its coordinates and bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Address {
    /// The user-supplied part of the record, without id or timestamps.
    pub fn fields(&self) -> NewAddress {
        NewAddress {
            street: self.street.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            postal_code: self.postal_code.clone(),
            country: self.country.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {}, {} {}, {}, {} ({:.4}, {:.4})",
            self.id,
            self.street,
            self.postal_code,
            self.city,
            self.state,
            self.country,
            self.latitude,
            self.longitude
        )
    }
}

/// A validated, normalised address that is ready to be persisted.
///
/// Only [`crate::validation`] constructs these from untrusted input, so a
/// `NewAddress` reaching a store always satisfies the field and coordinate rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl NewAddress {
    /// Stamp the record with its identifier and timestamps.
    pub(crate) fn into_address(
        self,
        id: AddressId,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Address {
        Address {
            id,
            street: self.street,
            city: self.city,
            state: self.state,
            postal_code: self.postal_code,
            country: self.country,
            latitude: self.latitude,
            longitude: self.longitude,
            created_at,
            updated_at,
        }
    }
}

/// A text field as it arrives over the wire. Values of any other JSON type are
/// kept as-is so validation can report them against the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextInput {
    Text(String),
    Other(Value),
}

impl From<&str> for TextInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TextInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A coordinate as it arrives over the wire: a JSON number, a string that
/// should contain one, or anything else (always rejected by validation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoordinateInput {
    Number(f64),
    Text(String),
    Other(Value),
}

impl From<f64> for CoordinateInput {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for CoordinateInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Candidate address for creation. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressPayload {
    pub street: Option<TextInput>,
    pub city: Option<TextInput>,
    pub state: Option<TextInput>,
    pub postal_code: Option<TextInput>,
    pub country: Option<TextInput>,
    pub latitude: Option<CoordinateInput>,
    pub longitude: Option<CoordinateInput>,
}

impl AddressPayload {
    /// Convenience constructor for a fully populated payload.
    pub fn new(
        street: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        postal_code: impl Into<String>,
        country: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            street: Some(TextInput::Text(street.into())),
            city: Some(TextInput::Text(city.into())),
            state: Some(TextInput::Text(state.into())),
            postal_code: Some(TextInput::Text(postal_code.into())),
            country: Some(TextInput::Text(country.into())),
            latitude: Some(latitude.into()),
            longitude: Some(longitude.into()),
        }
    }
}

impl From<NewAddress> for AddressPayload {
    fn from(address: NewAddress) -> Self {
        Self::new(
            address.street,
            address.city,
            address.state,
            address.postal_code,
            address.country,
            address.latitude,
            address.longitude,
        )
    }
}

/// Partial update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressPatch {
    pub street: Option<TextInput>,
    pub city: Option<TextInput>,
    pub state: Option<TextInput>,
    pub postal_code: Option<TextInput>,
    pub country: Option<TextInput>,
    pub latitude: Option<CoordinateInput>,
    pub longitude: Option<CoordinateInput>,
}

impl AddressPatch {
    pub fn is_empty(&self) -> bool {
        self.street.is_none()
            && self.city.is_none()
            && self.state.is_none()
            && self.postal_code.is_none()
            && self.country.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
    }

    /// Overlay this patch on an existing record, producing a payload that still
    /// has to go through validation.
    pub fn merge_onto(&self, existing: &Address) -> AddressPayload {
        let text = |patched: &Option<TextInput>, stored: &str| {
            Some(patched.clone().unwrap_or_else(|| stored.into()))
        };
        AddressPayload {
            street: text(&self.street, &existing.street),
            city: text(&self.city, &existing.city),
            state: text(&self.state, &existing.state),
            postal_code: text(&self.postal_code, &existing.postal_code),
            country: text(&self.country, &existing.country),
            latitude: Some(
                self.latitude
                    .clone()
                    .unwrap_or(CoordinateInput::Number(existing.latitude)),
            ),
            longitude: Some(
                self.longitude
                    .clone()
                    .unwrap_or(CoordinateInput::Number(existing.longitude)),
            ),
        }
    }
}

pub const DEFAULT_PAGE_LIMIT: usize = 100;
pub const MAX_PAGE_LIMIT: usize = 1000;

/// Offset pagination over the id-ordered list of addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    /// Number of records to skip
    pub skip: usize,
    /// Maximum records to return (1..=1000)
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Pagination {
    pub const fn new(skip: usize, limit: usize) -> Self {
        Self { skip, limit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> Address {
        NewAddress {
            street: "1 Main St".into(),
            city: "Springfield".into(),
            state: "IL".into(),
            postal_code: "62701".into(),
            country: "USA".into(),
            latitude: 39.7817,
            longitude: -89.6501,
        }
        .into_address(AddressId(7), Utc::now(), Utc::now())
    }

    #[test]
    fn test_payload_ignores_unknown_fields() {
        let payload: AddressPayload = serde_json::from_str(
            r#"{"street":"1 Main St","city":"Springfield","nickname":"home","latitude":"39.78"}"#,
        )
        .unwrap();

        assert_eq!(payload.street, Some("1 Main St".into()));
        assert_eq!(payload.latitude, Some(CoordinateInput::Text("39.78".into())));
        assert!(payload.longitude.is_none());
    }

    #[test]
    fn test_coordinate_accepts_numbers_and_strings() {
        let number: CoordinateInput = serde_json::from_str("12.5").unwrap();
        let text: CoordinateInput = serde_json::from_str("\"12.5\"").unwrap();
        assert_eq!(number, CoordinateInput::Number(12.5));
        assert_eq!(text, CoordinateInput::Text("12.5".into()));
    }

    #[test]
    fn test_wrongly_typed_fields_still_deserialize() {
        let payload: AddressPayload = serde_json::from_str(
            r#"{"street":"  ","city":123,"state":["NY"],"latitude":true,"longitude":500}"#,
        )
        .unwrap();

        assert_eq!(payload.city, Some(TextInput::Other(Value::from(123))));
        assert!(matches!(payload.state, Some(TextInput::Other(Value::Array(_)))));
        assert_eq!(payload.latitude, Some(CoordinateInput::Other(Value::Bool(true))));
        assert_eq!(payload.longitude, Some(CoordinateInput::Number(500.0)));
        assert!(payload.postal_code.is_none());
    }

    #[test]
    fn test_patch_merge_keeps_untouched_fields() {
        let existing = stored();
        let patch = AddressPatch {
            city: Some("Shelbyville".into()),
            ..Default::default()
        };

        let merged = patch.merge_onto(&existing);
        assert_eq!(merged.city, Some("Shelbyville".into()));
        assert_eq!(merged.street, Some("1 Main St".into()));
        assert_eq!(merged.latitude, Some(CoordinateInput::Number(39.7817)));
        assert_eq!(merged.longitude, Some(CoordinateInput::Number(-89.6501)));
    }

    #[test]
    fn test_empty_patch() {
        assert!(AddressPatch::default().is_empty());
        let patch = AddressPatch {
            latitude: Some(1.0.into()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_address_id_serializes_as_plain_integer() {
        let json = serde_json::to_value(stored()).unwrap();
        assert_eq!(json["id"], 7);
    }

    #[test]
    fn test_pagination_defaults() {
        let page: Pagination = serde_json::from_str("{}").unwrap();
        assert_eq!(page, Pagination::new(0, DEFAULT_PAGE_LIMIT));
    }
}
