use bytes::Bytes;
use common::{ErrorMessage, MirrorError, MirrorHost};
use tracing::{debug, warn};
use url::Url;

use crate::transport::{MirrorTransport, RawResponse};

/// Result of one successful read.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    /// `None` when the replica answered 404.
    pub body: Option<Bytes>,
    /// The routing table that chose the replica may be out of date.
    pub stale: bool,
    /// Replica or fallback service that produced the answer.
    pub answered_by: MirrorHost,
}

impl ResponseEnvelope {
    /// Reads a reply received directly from `host`, without fallback.
    pub fn from_raw(host: &MirrorHost, response: RawResponse) -> Result<Self, FailedRequest> {
        interpret(host, response, false)
    }
}

/// Failed read. Still carries the staleness signal so the caller can refresh.
#[derive(Debug)]
pub struct FailedRequest {
    pub error: MirrorError,
    pub stale: bool,
    pub answered_by: MirrorHost,
}

impl From<FailedRequest> for MirrorError {
    fn from(failed: FailedRequest) -> Self {
        failed.error
    }
}

/// Issues reads against replicas, falling back to the load-balanced service
/// once when a replica cannot be reached.
#[derive(Debug, Clone)]
pub struct MirrorRequestManager {
    transport: MirrorTransport,
    fallback: MirrorHost,
}

impl MirrorRequestManager {
    pub fn new(transport: MirrorTransport, fallback: MirrorHost) -> Self {
        Self {
            transport,
            fallback,
        }
    }

    pub fn fallback(&self) -> &MirrorHost {
        &self.fallback
    }

    pub async fn make_request(
        &self,
        host: &MirrorHost,
        url: Url,
    ) -> Result<ResponseEnvelope, FailedRequest> {
        debug!(host = %host, url = %url, "mirror request");
        let target = self.fallback.rebase(&url);

        match self.transport.get(host, url).await {
            Ok(response) => interpret(host, response, false),
            Err(err) if err.is_unreachable() => {
                warn!(
                    host = %host,
                    fallback = %self.fallback,
                    error = %err,
                    "mirror replica unreachable, retrying against fallback service"
                );
                match self.transport.get(&self.fallback, target).await {
                    // Reaching the fallback means the routing table is wrong.
                    Ok(response) => interpret(&self.fallback, response, true),
                    Err(fallback_err) => Err(FailedRequest {
                        error: MirrorError::remote_unavailable(
                            self.fallback.authority(),
                            fallback_err.to_string(),
                        ),
                        stale: true,
                        answered_by: self.fallback.clone(),
                    }),
                }
            }
            Err(err) => Err(FailedRequest {
                error: err,
                stale: false,
                answered_by: host.clone(),
            }),
        }
    }
}

fn interpret(
    host: &MirrorHost,
    response: RawResponse,
    via_fallback: bool,
) -> Result<ResponseEnvelope, FailedRequest> {
    let stale = via_fallback || response.cache_update;
    match response.status {
        200 if response.body.is_empty() => Err(FailedRequest {
            error: MirrorError::protocol(format!("{host} answered 200 with an empty body")),
            stale,
            answered_by: host.clone(),
        }),
        200 => Ok(ResponseEnvelope {
            body: Some(response.body),
            stale,
            answered_by: host.clone(),
        }),
        404 => Ok(ResponseEnvelope {
            body: None,
            stale,
            answered_by: host.clone(),
        }),
        status => Err(FailedRequest {
            error: MirrorError::remote(
                host.authority(),
                status,
                ErrorMessage::detail_from_body(&response.body),
            ),
            stale,
            answered_by: host.clone(),
        }),
    }
}
