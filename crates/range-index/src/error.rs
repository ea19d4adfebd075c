use thiserror::Error;

use crate::FieldKind;

pub type RangeIndexResult<T> = std::result::Result<T, RangeIndexError>;

/// Errors produced while resolving range fields and building index keys.
#[derive(Debug, Error)]
pub enum RangeIndexError {
    /// Schema has no field with the configured name.
    #[error("The defined range field {field} does not exist in your {format} schema")]
    MissingField { field: String, format: &'static str },

    /// Field exists but is not a 32 or 64-bit integer.
    #[error("Range field {field} has type {found}; only int and long are supported")]
    UnsupportedFieldType { field: String, found: String },

    /// Top-level schema is not a record / message.
    #[error("{format} schema used for range indexing must describe a record")]
    NotARecord { format: &'static str },

    /// Schema text or descriptor could not be parsed.
    #[error("Invalid {format} schema: {reason}")]
    InvalidSchema { format: &'static str, reason: String },

    /// Record was encoded in a different format than the schema.
    #[error("Record format {found} does not match {expected} schema")]
    FormatMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Record has no usable value for the range field.
    #[error("Range field {field} has no value in record")]
    MissingValue { field: String },

    /// Record value does not have the width resolved from the schema.
    #[error("Range field {field} should hold {expected} but holds {found}")]
    ValueTypeMismatch {
        field: String,
        expected: FieldKind,
        found: String,
    },

    /// Unsigned 64-bit value above `i64::MAX`.
    #[error("Range field {field} holds {value}, which exceeds the long range")]
    ValueOutOfRange { field: String, value: u64 },

    /// Caller supplied range boundary is unusable.
    #[error("Invalid range boundary '{value}': {reason}")]
    InvalidBoundary { value: String, reason: String },

    /// Record could not be converted to or from JSON.
    #[error("Record conversion failed: {reason}")]
    Conversion { reason: String },
}

impl RangeIndexError {
    pub fn missing_field(field: impl Into<String>, format: &'static str) -> Self {
        RangeIndexError::MissingField {
            field: field.into(),
            format,
        }
    }

    pub fn unsupported_type(field: impl Into<String>, found: impl Into<String>) -> Self {
        RangeIndexError::UnsupportedFieldType {
            field: field.into(),
            found: found.into(),
        }
    }

    pub fn invalid_schema(format: &'static str, reason: impl Into<String>) -> Self {
        RangeIndexError::InvalidSchema {
            format,
            reason: reason.into(),
        }
    }

    pub fn invalid_boundary(value: impl Into<String>, reason: impl Into<String>) -> Self {
        RangeIndexError::InvalidBoundary {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn conversion(reason: impl Into<String>) -> Self {
        RangeIndexError::Conversion {
            reason: reason.into(),
        }
    }

    /// True for errors caused by a request's range bounds rather than setup.
    pub fn is_bad_boundary(&self) -> bool {
        matches!(self, RangeIndexError::InvalidBoundary { .. })
    }

    /// True for errors that can only surface while resolving the schema.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RangeIndexError::MissingField { .. }
                | RangeIndexError::UnsupportedFieldType { .. }
                | RangeIndexError::NotARecord { .. }
                | RangeIndexError::InvalidSchema { .. }
        )
    }
}
