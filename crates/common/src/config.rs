use serde::{Deserialize, Serialize};

pub const DEFAULT_MIRROR_HOST_PREFIX: &str = "quick-mirror-";
pub const DEFAULT_MIRROR_PATH: &str = "mirror";
pub const DEFAULT_STREAMS_PATH: &str = "streams";
pub const DEFAULT_MIRROR_PORT: u16 = 8080;

/// Naming conventions shared by every mirror deployment.
///
/// With prefix `quick-mirror-` and topic `purchases`, the load-balanced
/// service for that topic lives at `http://quick-mirror-purchases/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub prefix: String,
    pub mirror_path: String,
    pub streams_path: String,
    pub port: u16,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_MIRROR_HOST_PREFIX.to_string(),
            mirror_path: DEFAULT_MIRROR_PATH.to_string(),
            streams_path: DEFAULT_STREAMS_PATH.to_string(),
            port: DEFAULT_MIRROR_PORT,
        }
    }
}

impl MirrorConfig {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Reads `MIRROR_HOST_PREFIX` and `MIRROR_PORT`, keeping defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(prefix) = std::env::var("MIRROR_HOST_PREFIX") {
            config.prefix = prefix;
        }
        if let Some(port) = std::env::var("MIRROR_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
        {
            config.port = port;
        }
        config
    }

    /// Absolute route of the mirror endpoints, e.g. `/api/mirror`.
    pub fn mirror_route(&self) -> String {
        route(&self.mirror_path)
    }

    /// Absolute route of the streams endpoints, e.g. `/streams`.
    pub fn streams_route(&self) -> String {
        route(&self.streams_path)
    }

    /// Service name of the mirror for `topic`.
    pub fn service_name(&self, topic: &str) -> String {
        format!("{}{}", self.prefix, topic)
    }
}

fn route(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}
