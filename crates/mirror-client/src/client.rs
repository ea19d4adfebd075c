use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use common::{KeySerializer, MirrorError, MirrorHost, MirrorResult};
use futures::future::join_all;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::MirrorClientConfig;
use crate::parser::{parse_list, parse_value};
use crate::partition::DefaultPartitionFinder;
use crate::request::{MirrorRequestManager, ResponseEnvelope};
use crate::routing::PartitionRouter;
use crate::transport::MirrorTransport;

/// Partition-aware reads against one mirrored topic.
///
/// A stale signal on any response schedules a routing refresh; the next
/// operation performs it before resolving hosts. Concurrent operations that
/// see the same signal share one refresh.
pub struct MirrorQueryClient<K: ?Sized, V> {
    router: PartitionRouter<K>,
    requests: MirrorRequestManager,
    needs_refresh: AtomicBool,
    refresh_hint: Mutex<Option<MirrorHost>>,
    _value: PhantomData<fn() -> V>,
}

impl<K, V> MirrorQueryClient<K, V>
where
    K: Display + ?Sized,
    V: DeserializeOwned,
{
    /// Loads the routing table from the configured service. Fails if it cannot.
    pub async fn connect(
        config: &MirrorClientConfig,
        serializer: Arc<dyn KeySerializer<K>>,
    ) -> MirrorResult<Self> {
        config.validate()?;
        let service = config.service_host()?;
        let transport = MirrorTransport::new(config)?;
        let router = PartitionRouter::connect(
            transport.clone(),
            service.clone(),
            config.mirror.clone(),
            serializer,
            Arc::new(DefaultPartitionFinder),
            config.expected_partitions,
        )
        .await?;
        Ok(Self::from_parts(
            router,
            MirrorRequestManager::new(transport, service),
        ))
    }

    pub fn from_parts(router: PartitionRouter<K>, requests: MirrorRequestManager) -> Self {
        Self {
            router,
            requests,
            needs_refresh: AtomicBool::new(false),
            refresh_hint: Mutex::new(None),
            _value: PhantomData,
        }
    }

    pub fn router(&self) -> &PartitionRouter<K> {
        &self.router
    }

    /// True while a stale signal has been seen but not yet acted on.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh.load(Ordering::Acquire)
    }

    /// Point lookup. `Ok(None)` when the key does not exist.
    pub async fn get(&self, key: &K) -> MirrorResult<Option<V>> {
        self.refresh_if_needed().await;
        let host = self.router.find_host(key)?;
        let envelope = self.exchange(&host, host.for_key(&key.to_string())).await?;
        match envelope.body {
            Some(body) => parse_value(&body),
            None => Ok(None),
        }
    }

    /// Every value on every replica.
    pub async fn get_all(&self) -> MirrorResult<Vec<V>> {
        self.refresh_if_needed().await;
        let hosts = self.router.all_hosts();
        let responses = join_all(hosts.iter().map(|host| self.exchange(host, host.for_all()))).await;
        collect_lists(responses)
    }

    /// Values for `keys`, one batched request per owning replica. Absent keys are skipped.
    pub async fn get_list<'a, I>(&self, keys: I) -> MirrorResult<Vec<V>>
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        self.refresh_if_needed().await;

        let mut groups: Vec<(MirrorHost, Vec<String>)> = Vec::new();
        for key in keys {
            let host = self.router.find_host(key)?;
            let text = key.to_string();
            match groups.iter_mut().find(|(owner, _)| *owner == host) {
                Some((_, batch)) => batch.push(text),
                None => groups.push((host, vec![text])),
            }
        }
        if groups.is_empty() {
            return Ok(Vec::new());
        }

        debug!(hosts = groups.len(), "batched key lookup");
        let responses = join_all(
            groups
                .iter()
                .map(|(host, batch)| self.exchange(host, host.for_keys(batch))),
        )
        .await;
        collect_lists(responses)
    }

    /// Values of `key` whose range field lies in `[from, to]`.
    pub async fn get_range(&self, key: &K, from: &str, to: &str) -> MirrorResult<Vec<V>> {
        self.refresh_if_needed().await;
        let host = self.router.find_host(key)?;
        let url = host.for_range(&key.to_string(), from, to);
        let envelope = self.exchange(&host, url).await?;
        match envelope.body {
            Some(body) => parse_list(&body),
            None => Ok(Vec::new()),
        }
    }

    /// Refreshes the routing table now, regardless of pending signals.
    pub async fn refresh(&self) -> MirrorResult<()> {
        self.needs_refresh.store(false, Ordering::Release);
        let preferred = self.take_hint();
        self.router.refresh(preferred.as_ref()).await
    }

    async fn exchange(&self, host: &MirrorHost, url: Url) -> MirrorResult<ResponseEnvelope> {
        match self.requests.make_request(host, url).await {
            Ok(envelope) => {
                if envelope.stale {
                    self.mark_stale(&envelope.answered_by);
                }
                Ok(envelope)
            }
            Err(failed) => {
                if failed.stale {
                    self.mark_stale(&failed.answered_by);
                }
                Err(failed.into())
            }
        }
    }

    fn mark_stale(&self, answered_by: &MirrorHost) {
        *self
            .refresh_hint
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(answered_by.clone());
        if !self.needs_refresh.swap(true, Ordering::AcqRel) {
            info!(host = %answered_by, "partition mapping marked stale");
        }
    }

    fn take_hint(&self) -> Option<MirrorHost> {
        self.refresh_hint
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    async fn refresh_if_needed(&self) {
        if !self.needs_refresh.swap(false, Ordering::AcqRel) {
            return;
        }
        let preferred = self.take_hint();
        if let Err(err) = self.router.refresh(preferred.as_ref()).await {
            warn!(error = %err, "partition mapping refresh failed, keeping current table");
            // A rejected snapshot waits for the next stale signal.
            if !is_connectivity_failure(&err) {
                return;
            }
            match preferred {
                Some(host) => self.mark_stale(&host),
                None => self.needs_refresh.store(true, Ordering::Release),
            }
        }
    }
}

fn is_connectivity_failure(err: &MirrorError) -> bool {
    match err {
        MirrorError::Unreachable { .. } | MirrorError::RemoteUnavailable { .. } => true,
        MirrorError::Remote { status, .. } => *status >= 500,
        _ => false,
    }
}

fn collect_lists<V: DeserializeOwned>(
    responses: Vec<MirrorResult<ResponseEnvelope>>,
) -> MirrorResult<Vec<V>> {
    let mut values = Vec::new();
    for response in responses {
        if let Some(body) = response?.body {
            values.extend(parse_list::<V>(&body)?);
        }
    }
    Ok(values)
}
