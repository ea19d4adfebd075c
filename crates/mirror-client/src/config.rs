use std::time::Duration;

use common::{MirrorConfig, MirrorError, MirrorHost, MirrorResult};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for one client of one mirrored topic.
#[derive(Debug, Clone)]
pub struct MirrorClientConfig {
    /// Load-balanced mirror service. Bootstraps the routing table and is the
    /// fallback target when a replica cannot be reached.
    pub service_address: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Partition count the topic is known to have; the first snapshot must match it.
    pub expected_partitions: Option<u32>,
    pub mirror: MirrorConfig,
}

impl MirrorClientConfig {
    pub fn new(service_address: impl Into<String>) -> Self {
        Self {
            service_address: service_address.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            expected_partitions: None,
            mirror: MirrorConfig::default(),
        }
    }

    /// Service address derived from the topic name, e.g. `quick-mirror-purchases`.
    pub fn for_topic(topic: &str, mirror: MirrorConfig) -> Self {
        let mut config = Self::new(mirror.service_name(topic));
        config.mirror = mirror;
        config
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_expected_partitions(mut self, partitions: u32) -> Self {
        self.expected_partitions = Some(partitions);
        self
    }

    pub fn with_mirror_config(mut self, mirror: MirrorConfig) -> Self {
        self.mirror = mirror;
        self
    }

    /// Reads `MIRROR_SERVICE_ADDRESS` (required), `MIRROR_CONNECT_TIMEOUT_MS`,
    /// `MIRROR_REQUEST_TIMEOUT_MS` and `MIRROR_PARTITIONS`.
    pub fn from_env() -> MirrorResult<Self> {
        let address = std::env::var("MIRROR_SERVICE_ADDRESS")
            .map_err(|_| MirrorError::configuration("MIRROR_SERVICE_ADDRESS is not set"))?;
        let mut config = Self::new(address).with_mirror_config(MirrorConfig::from_env());

        if let Some(ms) = env_number::<u64>("MIRROR_CONNECT_TIMEOUT_MS")? {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_number::<u64>("MIRROR_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = Duration::from_millis(ms);
        }
        config.expected_partitions = env_number::<u32>("MIRROR_PARTITIONS")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MirrorResult<()> {
        MirrorHost::parse_with(&self.service_address, &self.mirror)?;
        if self.expected_partitions == Some(0) {
            return Err(MirrorError::configuration(
                "a mirrored topic needs at least one partition",
            ));
        }
        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(MirrorError::configuration("timeouts must be non-zero"));
        }
        Ok(())
    }

    pub fn service_host(&self) -> MirrorResult<MirrorHost> {
        MirrorHost::parse_with(&self.service_address, &self.mirror)
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> MirrorResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| MirrorError::configuration(format!("{name} has invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}
