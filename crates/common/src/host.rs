use std::fmt;
use std::hash::{Hash, Hasher};

use url::Url;

use crate::config::MirrorConfig;
use crate::error::{MirrorError, MirrorResult};

/// Addressable mirror replica (or load-balanced mirror service).
///
/// Two hosts are the same replica iff their normalized `host:port` authority
/// matches; scheme and sub-paths take no part in equality. Any path component
/// of the parsed address is ignored, request targets always start at `/`.
#[derive(Debug, Clone)]
pub struct MirrorHost {
    base: Url,
    authority: String,
    mirror_path: String,
    streams_path: String,
}

impl MirrorHost {
    /// Parses `host:port`, `host` or `http(s)://host:port` using default paths.
    pub fn parse(address: &str) -> MirrorResult<Self> {
        Self::parse_with(address, &MirrorConfig::default())
    }

    pub fn parse_with(address: &str, config: &MirrorConfig) -> MirrorResult<Self> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(MirrorError::configuration("mirror address must not be empty"));
        }

        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };
        let url = Url::parse(&candidate).map_err(|e| {
            MirrorError::configuration(format!("invalid mirror address '{address}': {e}"))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(MirrorError::configuration(format!(
                "unsupported scheme '{}' in mirror address '{address}'",
                url.scheme()
            )));
        }
        let host = url.host_str().ok_or_else(|| {
            MirrorError::configuration(format!("mirror address '{address}' has no host"))
        })?;
        let port = url.port_or_known_default().ok_or_else(|| {
            MirrorError::configuration(format!("mirror address '{address}' has no port"))
        })?;
        let authority = format!("{}:{}", host.to_ascii_lowercase(), port);

        let mut base = url.clone();
        base.set_path("/");
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self {
            base,
            authority,
            mirror_path: config.mirror_path.clone(),
            streams_path: config.streams_path.clone(),
        })
    }

    /// Load-balanced service address of the mirror for `topic`.
    pub fn for_topic(topic: &str, config: &MirrorConfig) -> MirrorResult<Self> {
        Self::parse_with(&config.service_name(topic), config)
    }

    /// Normalized `host:port`.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `GET /mirror/{key}`
    pub fn for_key(&self, key: &str) -> Url {
        self.endpoint(&self.mirror_path, &[key])
    }

    /// `GET /mirror/keys?ids=k1,k2`
    pub fn for_keys<I, S>(&self, keys: I) -> Url
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = keys
            .into_iter()
            .map(|k| k.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(",");
        let mut url = self.endpoint(&self.mirror_path, &["keys"]);
        url.query_pairs_mut().append_pair("ids", &ids);
        url
    }

    /// `GET /mirror`
    pub fn for_all(&self) -> Url {
        self.endpoint(&self.mirror_path, &[])
    }

    /// `GET /mirror/range/{key}?from=F&to=T`
    pub fn for_range(&self, key: &str, from: &str, to: &str) -> Url {
        let mut url = self.endpoint(&self.mirror_path, &["range", key]);
        url.query_pairs_mut()
            .append_pair("from", from)
            .append_pair("to", to);
        url
    }

    /// `GET /streams/partitions`, outside the mirror sub-path.
    pub fn partitions_url(&self) -> Url {
        self.endpoint(&self.streams_path, &["partitions"])
    }

    /// Same path and query as `target`, addressed to this host.
    pub fn rebase(&self, target: &Url) -> Url {
        let mut url = self.base.clone();
        url.set_path(target.path());
        url.set_query(target.query());
        url
    }

    /// `prefix` may span several segments (`api/mirror`); `segments` are escaped as one each.
    fn endpoint(&self, prefix: &str, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(prefix.split('/').filter(|s| !s.is_empty()))
                .extend(segments);
        }
        url
    }
}

impl PartialEq for MirrorHost {
    fn eq(&self, other: &Self) -> bool {
        self.authority == other.authority
    }
}

impl Eq for MirrorHost {}

impl Hash for MirrorHost {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.authority.hash(state);
    }
}

impl fmt::Display for MirrorHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.base.scheme(), self.authority)
    }
}

impl std::str::FromStr for MirrorHost {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
