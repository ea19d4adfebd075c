use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::RangeIndexResult;
use crate::padder::{EndRange, FieldKind};
use crate::schema::{MirrorRecord, RangeFieldExtractor, RecordSchema};

/// Composite key `"{key}_{zero-padded field value}"` stored in the range store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RangeIndexKey(String);

impl RangeIndexKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RangeIndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RangeIndexKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Scan prefix shared by every index key of `key`.
pub fn key_prefix<K: fmt::Display + ?Sized>(key: &K) -> String {
    format!("{key}_")
}

/// Builds range index keys for one configured field of a topic's value schema.
#[derive(Debug, Clone)]
pub struct RangeIndexer {
    field: String,
    kind: FieldKind,
    extractor: RangeFieldExtractor,
}

impl RangeIndexer {
    /// Resolves the field against the schema. Unsupported or missing fields fail here.
    pub fn new(schema: &RecordSchema, field: impl Into<String>) -> RangeIndexResult<Self> {
        let field = field.into();
        let extractor = RangeFieldExtractor::for_schema(schema);
        let kind = extractor.field_kind(schema, &field)?;
        Ok(Self {
            field,
            kind,
            extractor,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Index key for a stored record.
    pub fn create_index<K: fmt::Display + ?Sized>(
        &self,
        key: &K,
        record: &MirrorRecord,
    ) -> RangeIndexResult<RangeIndexKey> {
        let value = self.extractor.extract(record, &self.field, self.kind)?;
        if value.is_negative() {
            warn!(
                field = %self.field,
                %value,
                "negative range value does not keep numeric order among negatives"
            );
        }
        Ok(RangeIndexKey(format!("{}{}", key_prefix(key), value.pad_zero())))
    }

    /// Index key for a caller-supplied boundary, comparable against stored keys.
    pub fn create_bound_index<K: fmt::Display + ?Sized>(
        &self,
        key: &K,
        boundary: &str,
        end: EndRange,
    ) -> RangeIndexResult<RangeIndexKey> {
        let padded = self.kind.pad_boundary(boundary, end)?;
        Ok(RangeIndexKey(format!("{}{}", key_prefix(key), padded)))
    }

    /// `[from, to)` pair covering the closed interval `[from, to]`.
    pub fn scan_bounds<K: fmt::Display + ?Sized>(
        &self,
        key: &K,
        from: &str,
        to: &str,
    ) -> RangeIndexResult<(RangeIndexKey, RangeIndexKey)> {
        Ok((
            self.create_bound_index(key, from, EndRange::Inclusive)?,
            self.create_bound_index(key, to, EndRange::Exclusive)?,
        ))
    }
}
