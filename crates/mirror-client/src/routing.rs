use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use common::{ErrorMessage, KeySerializer, MirrorConfig, MirrorError, MirrorHost, MirrorResult};
use tracing::{debug, info, warn};

use crate::partition::PartitionFinder;
use crate::transport::MirrorTransport;

/// Complete partition to replica assignment of one topic.
///
/// Only constructed from a snapshot that covers every partition in
/// `[0, partition_count)`, so lookups of in-range partitions cannot miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    hosts: Vec<MirrorHost>,
}

impl RoutingTable {
    pub fn from_hosts(assignment: BTreeMap<u32, MirrorHost>) -> MirrorResult<Self> {
        if assignment.is_empty() {
            return Err(MirrorError::configuration("partition snapshot is empty"));
        }
        let count = assignment.len();
        for (expected, partition) in assignment.keys().enumerate() {
            if *partition as usize != expected {
                return Err(MirrorError::configuration(format!(
                    "partition snapshot with {count} entries is missing partition {expected}"
                )));
            }
        }
        Ok(Self {
            hosts: assignment.into_values().collect(),
        })
    }

    /// Parses the `/streams/partitions` body shape `{id: "host:port"}`.
    pub fn from_snapshot(
        snapshot: BTreeMap<u32, String>,
        config: &MirrorConfig,
    ) -> MirrorResult<Self> {
        let assignment = snapshot
            .into_iter()
            .map(|(partition, address)| {
                MirrorHost::parse_with(&address, config).map(|host| (partition, host))
            })
            .collect::<MirrorResult<BTreeMap<_, _>>>()?;
        Self::from_hosts(assignment)
    }

    pub fn partition_count(&self) -> u32 {
        self.hosts.len() as u32
    }

    pub fn host_for(&self, partition: u32) -> Option<&MirrorHost> {
        self.hosts.get(partition as usize)
    }

    /// Distinct replicas in partition order.
    pub fn distinct_hosts(&self) -> Vec<MirrorHost> {
        let mut hosts: Vec<MirrorHost> = Vec::new();
        for host in &self.hosts {
            if !hosts.contains(host) {
                hosts.push(host.clone());
            }
        }
        hosts
    }

    pub fn to_snapshot(&self) -> BTreeMap<u32, String> {
        self.hosts
            .iter()
            .enumerate()
            .map(|(partition, host)| (partition as u32, host.authority().to_string()))
            .collect()
    }
}

/// Resolves keys to the replica owning their partition.
///
/// The table is an immutable snapshot behind an atomic pointer. Lookups load
/// the pointer without locking; refreshes fetch the new snapshot first and
/// then swap the pointer in one store.
pub struct PartitionRouter<K: ?Sized> {
    transport: MirrorTransport,
    bootstrap: MirrorHost,
    mirror: MirrorConfig,
    serializer: Arc<dyn KeySerializer<K>>,
    finder: Arc<dyn PartitionFinder>,
    table: ArcSwap<RoutingTable>,
}

impl<K: ?Sized> PartitionRouter<K> {
    /// Fetches the initial table from `bootstrap`. Fails if that fetch fails.
    pub async fn connect(
        transport: MirrorTransport,
        bootstrap: MirrorHost,
        mirror: MirrorConfig,
        serializer: Arc<dyn KeySerializer<K>>,
        finder: Arc<dyn PartitionFinder>,
        expected_partitions: Option<u32>,
    ) -> MirrorResult<Self> {
        let table = fetch_table(&transport, &bootstrap, &mirror).await?;
        if let Some(expected) = expected_partitions {
            if table.partition_count() != expected {
                return Err(MirrorError::configuration(format!(
                    "mirror at {bootstrap} reports {} partitions, expected {expected}",
                    table.partition_count()
                )));
            }
        }
        info!(
            host = %bootstrap,
            partitions = table.partition_count(),
            replicas = table.distinct_hosts().len(),
            "loaded partition mapping"
        );
        Ok(Self::with_table(
            transport, bootstrap, mirror, serializer, finder, table,
        ))
    }

    pub fn with_table(
        transport: MirrorTransport,
        bootstrap: MirrorHost,
        mirror: MirrorConfig,
        serializer: Arc<dyn KeySerializer<K>>,
        finder: Arc<dyn PartitionFinder>,
        table: RoutingTable,
    ) -> Self {
        Self {
            transport,
            bootstrap,
            mirror,
            serializer,
            finder,
            table: ArcSwap::from_pointee(table),
        }
    }

    /// Current snapshot. Never torn: refreshes replace it wholesale.
    pub fn table(&self) -> Arc<RoutingTable> {
        self.table.load_full()
    }

    pub fn partition_of(&self, key: &K) -> MirrorResult<u32> {
        let bytes = self.serializer.serialize(key)?;
        self.finder
            .partition_for(&bytes, self.table().partition_count())
    }

    pub fn find_host(&self, key: &K) -> MirrorResult<MirrorHost> {
        let bytes = self.serializer.serialize(key)?;
        let table = self.table();
        let partition = self.finder.partition_for(&bytes, table.partition_count())?;
        let host = table.host_for(partition).cloned().ok_or_else(|| {
            MirrorError::configuration(format!("no replica assigned to partition {partition}"))
        })?;
        debug!(partition, host = %host, "resolved key");
        Ok(host)
    }

    pub fn all_hosts(&self) -> Vec<MirrorHost> {
        self.table().distinct_hosts()
    }

    /// Re-fetches the mapping and swaps it in.
    ///
    /// Candidates are tried in order: `preferred`, the replicas of the current
    /// table, then the bootstrap service. The first complete snapshot wins,
    /// whatever its partition count. If no candidate yields one the current
    /// table stays in place and the last error is returned.
    pub async fn refresh(&self, preferred: Option<&MirrorHost>) -> MirrorResult<()> {
        let current = self.table();
        let mut candidates: Vec<MirrorHost> = Vec::new();
        if let Some(host) = preferred {
            candidates.push(host.clone());
        }
        for host in current
            .distinct_hosts()
            .into_iter()
            .chain(std::iter::once(self.bootstrap.clone()))
        {
            if !candidates.contains(&host) {
                candidates.push(host);
            }
        }

        let mut last_error = None;
        for host in &candidates {
            match fetch_table(&self.transport, host, &self.mirror).await {
                Ok(table) => {
                    if table.partition_count() != current.partition_count() {
                        warn!(
                            host = %host,
                            previous = current.partition_count(),
                            partitions = table.partition_count(),
                            "partition count changed"
                        );
                    }
                    let changed = *current != table;
                    self.install(table);
                    info!(host = %host, changed, "refreshed partition mapping");
                    return Ok(());
                }
                Err(err) => {
                    debug!(host = %host, error = %err, "partition mapping fetch failed");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| MirrorError::configuration("no replica to refresh from")))
    }

    fn install(&self, table: RoutingTable) {
        self.table.store(Arc::new(table));
    }
}

async fn fetch_table(
    transport: &MirrorTransport,
    host: &MirrorHost,
    mirror: &MirrorConfig,
) -> MirrorResult<RoutingTable> {
    let response = transport.get(host, host.partitions_url()).await?;
    if response.status != 200 {
        return Err(MirrorError::remote(
            host.authority(),
            response.status,
            ErrorMessage::detail_from_body(&response.body),
        ));
    }
    if response.body.is_empty() {
        return Err(MirrorError::protocol(format!(
            "{host} returned an empty partition mapping body"
        )));
    }
    let snapshot: BTreeMap<u32, String> = serde_json::from_slice(&response.body)
        .map_err(|e| MirrorError::protocol(format!("invalid partition mapping from {host}: {e}")))?;
    RoutingTable::from_snapshot(snapshot, mirror)
}
