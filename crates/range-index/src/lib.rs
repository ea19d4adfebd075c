//! Sortable range index keys for mirrors backed by an ordered key-value store.
//!
//! A record stored under `key` whose range field holds `v` is additionally
//! written under `"{key}_{pad(v)}"`. Padding makes lexicographic order match
//! numeric order for non-negative values, so a plain prefix scan answers
//! `from <= v <= to`.

pub mod error;
pub mod indexer;
pub mod padder;
pub mod schema;

pub use error::{RangeIndexError, RangeIndexResult};
pub use indexer::{key_prefix, RangeIndexKey, RangeIndexer};
pub use padder::{EndRange, FieldKind, RangeNumber, RangeValue, ZeroPadder};
pub use schema::{MirrorRecord, RangeFieldExtractor, RecordSchema};
