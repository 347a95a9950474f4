//! Field and coordinate rules applied before anything reaches a store.
//!
//! Validation never stops at the first problem: every rule is checked and the
//! resulting [`ValidationError`] lists each violated field.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use serde_json::Value;

use crate::model::{AddressPayload, CoordinateInput, NewAddress, TextInput};

pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);
pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);

// Maximum lengths in characters, after trimming.
pub const MAX_STREET_LEN: usize = 255;
pub const MAX_REGION_LEN: usize = 100;
pub const MAX_POSTAL_CODE_LEN: usize = 20;

/// One broken rule on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .violations.iter().join("; "))]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation::new(field, message)],
        }
    }

    /// Whether any violation names `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

/// Collects violations while a payload is checked.
#[derive(Debug, Default)]
struct Violations(Vec<FieldViolation>);

impl Violations {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldViolation::new(field, message));
    }

    fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, ValidationError> {
        if self.0.is_empty() {
            Ok(value())
        } else {
            Err(ValidationError { violations: self.0 })
        }
    }
}

/// JSON type name for messages about wrongly typed input.
fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_text(
    violations: &mut Violations,
    field: &str,
    max_len: usize,
    value: Option<&TextInput>,
) -> String {
    let raw = match value {
        None => {
            violations.push(field, "field is required");
            return String::new();
        }
        Some(TextInput::Other(other)) => {
            violations.push(field, format!("must be a string, got {}", json_type(other)));
            return String::new();
        }
        Some(TextInput::Text(raw)) => raw,
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        violations.push(field, "field cannot be empty or whitespace");
    } else if trimmed.chars().count() > max_len {
        violations.push(field, format!("must be at most {max_len} characters"));
    }
    trimmed.to_string()
}

/// Parse a coordinate and check it against the inclusive `(min, max)` range.
pub fn check_coordinate(
    field: &str,
    value: Option<&CoordinateInput>,
    (min, max): (f64, f64),
) -> Result<f64, FieldViolation> {
    let parsed = match value {
        None => return Err(FieldViolation::new(field, "field is required")),
        Some(CoordinateInput::Number(n)) => *n,
        Some(CoordinateInput::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| FieldViolation::new(field, format!("'{s}' is not a number")))?,
        Some(CoordinateInput::Other(other)) => {
            return Err(FieldViolation::new(
                field,
                format!("must be a number, got {}", json_type(other)),
            ));
        }
    };
    if !parsed.is_finite() {
        return Err(FieldViolation::new(field, "must be a finite number"));
    }
    if !(min..=max).contains(&parsed) {
        return Err(FieldViolation::new(
            field,
            format!("must be between {min} and {max}, got {parsed}"),
        ));
    }
    Ok(parsed)
}

/// Validate a candidate address and normalise it (trimmed text fields).
pub fn validate_address(payload: &AddressPayload) -> Result<NewAddress, ValidationError> {
    let mut violations = Violations::default();

    let street = check_text(&mut violations, "street", MAX_STREET_LEN, payload.street.as_ref());
    let city = check_text(&mut violations, "city", MAX_REGION_LEN, payload.city.as_ref());
    let state = check_text(&mut violations, "state", MAX_REGION_LEN, payload.state.as_ref());
    let postal_code = check_text(
        &mut violations,
        "postal_code",
        MAX_POSTAL_CODE_LEN,
        payload.postal_code.as_ref(),
    );
    let country = check_text(&mut violations, "country", MAX_REGION_LEN, payload.country.as_ref());

    let latitude = check_coordinate("latitude", payload.latitude.as_ref(), LATITUDE_RANGE)
        .unwrap_or_else(|violation| {
            violations.0.push(violation);
            0.0
        });
    let longitude = check_coordinate("longitude", payload.longitude.as_ref(), LONGITUDE_RANGE)
        .unwrap_or_else(|violation| {
            violations.0.push(violation);
            0.0
        });

    violations.finish(|| NewAddress {
        street,
        city,
        state,
        postal_code,
        country,
        latitude,
        longitude,
    })
}
