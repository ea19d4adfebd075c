use serde::{Deserialize, Serialize};

pub mod config;
pub mod error;
pub mod host;
pub mod key;

pub use config::MirrorConfig;
pub use error::{ErrorMessage, MirrorError, MirrorResult};
pub use host::MirrorHost;
pub use key::{
    IntKeySerializer, KeySerializer, KeyType, LongKeySerializer, StringKeySerializer,
};

/// Response header a replica sets when the caller's partition mapping is out of date.
pub const CACHE_UPDATE_HEADER: &str = "X-Cache-Update";
/// Structured-field boolean `true`, the only value the header is ever set to.
pub const CACHE_UPDATE_VALUE: &str = "?1";

/// Body shape of every successful mirror read: `{"value": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorValue<T> {
    pub value: T,
}

impl<T> MirrorValue<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Returns true when a header value carries the cache-update flag.
pub fn is_cache_update(value: &str) -> bool {
    value.trim() == CACHE_UPDATE_VALUE
}
