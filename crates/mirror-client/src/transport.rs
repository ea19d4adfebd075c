use bytes::Bytes;
use common::{is_cache_update, MirrorError, MirrorHost, MirrorResult, CACHE_UPDATE_HEADER};
use url::Url;

use crate::config::MirrorClientConfig;

/// Status, body and cache-update flag of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
    pub cache_update: bool,
}

/// Connection-pooling HTTP client shared by a router and its request manager.
///
/// Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct MirrorTransport {
    client: reqwest::Client,
}

impl MirrorTransport {
    pub fn new(config: &MirrorClientConfig) -> MirrorResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| MirrorError::configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Issues a GET. Any failure before a status line arrives, including
    /// timeouts, is reported as [`MirrorError::Unreachable`].
    pub async fn get(&self, host: &MirrorHost, url: Url) -> MirrorResult<RawResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(host, e))?;

        let status = response.status().as_u16();
        let cache_update = response
            .headers()
            .get(CACHE_UPDATE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(is_cache_update)
            .unwrap_or(false);
        let body = response.bytes().await.map_err(|e| classify(host, e))?;

        Ok(RawResponse {
            status,
            body,
            cache_update,
        })
    }
}

fn classify(host: &MirrorHost, err: reqwest::Error) -> MirrorError {
    if err.is_builder() {
        MirrorError::configuration(format!("invalid request for {host}: {err}"))
    } else {
        MirrorError::unreachable(host.authority(), err.to_string())
    }
}
