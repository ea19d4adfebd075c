use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use common::{KeySerializer, KeyType, MirrorConfig, MirrorError, MirrorHost, MirrorResult};
use mirror_client::parser::{parse_list, parse_value};
use mirror_client::{
    DefaultPartitionFinder, FailedRequest, MirrorClientConfig, MirrorRequestManager,
    MirrorTransport, PartitionFinder, ResponseEnvelope, RoutingTable,
};
use range_index::{MirrorRecord, RangeIndexer, RecordSchema};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::config::ServiceConfig;
use crate::store::MirrorStore;

const FORWARD_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const FORWARD_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A read result plus whether another replica produced it.
///
/// A forwarded answer means the caller routed to the wrong replica, so the
/// HTTP layer marks it with the cache-update header.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer<T> {
    pub value: T,
    pub forwarded: bool,
}

impl<T> Answer<T> {
    fn local(value: T) -> Self {
        Self {
            value,
            forwarded: false,
        }
    }

    fn forwarded(value: T) -> Self {
        Self {
            value,
            forwarded: true,
        }
    }
}

#[derive(Debug)]
struct RangeSupport {
    schema: RecordSchema,
    indexer: RangeIndexer,
}

#[derive(Deserialize)]
struct SeedRecord {
    key: Value,
    value: Value,
}

/// One replica of a mirrored topic.
///
/// Holds the records of the partitions assigned to it and forwards reads for
/// other partitions to their owner.
pub struct MirrorService {
    topic: String,
    key_type: KeyType,
    local: MirrorHost,
    table: RoutingTable,
    finder: Arc<dyn PartitionFinder>,
    range: Option<RangeSupport>,
    store: MirrorStore,
    transport: MirrorTransport,
    fallback: Option<MirrorRequestManager>,
    mirror: MirrorConfig,
}

impl MirrorService {
    pub fn new(
        topic: impl Into<String>,
        key_type: KeyType,
        local: MirrorHost,
        table: RoutingTable,
        transport: MirrorTransport,
    ) -> Self {
        Self {
            topic: topic.into(),
            key_type,
            local,
            table,
            finder: Arc::new(DefaultPartitionFinder),
            range: None,
            store: MirrorStore::new(),
            transport,
            fallback: None,
            mirror: MirrorConfig::default(),
        }
    }

    /// Enables range queries over `field` of records matching `schema`.
    pub fn with_range(mut self, schema: RecordSchema, field: &str) -> MirrorResult<Self> {
        let indexer = RangeIndexer::new(&schema, field)?;
        self.range = Some(RangeSupport { schema, indexer });
        Ok(self)
    }

    /// Forwarded reads that cannot reach the owner are retried here once.
    pub fn with_fallback(mut self, fallback: MirrorHost) -> Self {
        self.fallback = Some(MirrorRequestManager::new(self.transport.clone(), fallback));
        self
    }

    /// Path names the HTTP surface is mounted under.
    pub fn with_mirror_config(mut self, mirror: MirrorConfig) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn with_partition_finder(mut self, finder: Arc<dyn PartitionFinder>) -> Self {
        self.finder = finder;
        self
    }

    /// Builds a replica from its deployment file, loading the range schema
    /// and seeding records when configured.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let local = MirrorHost::parse_with(&config.advertised_host, &config.mirror)?;
        let table = RoutingTable::from_snapshot(config.partitions.clone(), &config.mirror)
            .context("invalid partition assignment")?;
        let transport = MirrorTransport::new(
            &MirrorClientConfig::new(config.advertised_host.clone())
                .with_connect_timeout(FORWARD_CONNECT_TIMEOUT)
                .with_request_timeout(FORWARD_REQUEST_TIMEOUT)
                .with_mirror_config(config.mirror.clone()),
        )?;

        let mut service = Self::new(&config.topic, config.key_type, local, table, transport)
            .with_mirror_config(config.mirror.clone());
        if let Some(address) = &config.fallback_address {
            service = service.with_fallback(MirrorHost::parse_with(address, &config.mirror)?);
        }
        if let Some(range) = &config.range {
            let schema = range.load_schema()?;
            service = service
                .with_range(schema, &range.field)
                .with_context(|| format!("range field {} is unusable", range.field))?;
        }
        if let Some(records) = &config.records {
            let count = service.load_records(records)?;
            info!(topic = %service.topic, count, "seeded mirror records");
        }
        Ok(service)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn local_host(&self) -> &MirrorHost {
        &self.local
    }

    pub fn mirror_config(&self) -> &MirrorConfig {
        &self.mirror
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn store(&self) -> &MirrorStore {
        &self.store
    }

    pub fn range_field(&self) -> Option<&str> {
        self.range.as_ref().map(|range| range.indexer.field())
    }

    /// `None` when this replica owns `key`, else the owning replica.
    pub fn owner_of(&self, key: &str) -> MirrorResult<Option<MirrorHost>> {
        let bytes = self.key_type.serialize(key)?;
        let partition = self
            .finder
            .partition_for(&bytes, self.table.partition_count())?;
        let owner = self.table.host_for(partition).ok_or_else(|| {
            MirrorError::configuration(format!("no replica assigned to partition {partition}"))
        })?;
        if *owner == self.local {
            Ok(None)
        } else {
            Ok(Some(owner.clone()))
        }
    }

    /// Stores a decoded record under `key` and, with a range field
    /// configured, under its range index key.
    pub fn ingest(&self, key: &str, record: &MirrorRecord) -> MirrorResult<()> {
        self.key_type.serialize(key)?;
        let value = record.to_json()?;
        if let Some(range) = &self.range {
            let index = range.indexer.create_index(key, record)?;
            debug!(%key, %index, "indexed range record");
            self.store.put_range(index, value.clone());
        }
        self.store.put(key, value);
        Ok(())
    }

    /// Stores a JSON value, decoding it through the range schema if there is one.
    pub fn ingest_json(&self, key: &str, value: Value) -> MirrorResult<()> {
        match &self.range {
            Some(range) => {
                let record = range.schema.record_from_json(value)?;
                self.ingest(key, &record)
            }
            None => {
                self.key_type.serialize(key)?;
                self.store.put(key, value);
                Ok(())
            }
        }
    }

    /// Ingests JSON lines of `{"key": ..., "value": {...}}`. Blank lines are skipped.
    pub fn load_records(&self, path: &Path) -> Result<usize> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let mut count = 0;
        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let seed: SeedRecord = serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid record", path.display(), number + 1))?;
            let key = match seed.key {
                Value::String(key) => key,
                other => other.to_string(),
            };
            self.ingest_json(&key, seed.value)
                .with_context(|| format!("{}:{}: cannot ingest {key}", path.display(), number + 1))?;
            count += 1;
        }
        Ok(count)
    }

    pub async fn get(&self, key: &str) -> MirrorResult<Answer<Option<Value>>> {
        match self.owner_of(key)? {
            None => Ok(Answer::local(self.store.get(key))),
            Some(owner) => {
                let url = owner.for_key(key);
                let value = match self.forward(&owner, url).await? {
                    Some(body) => parse_value(&body)?,
                    None => None,
                };
                Ok(Answer::forwarded(value))
            }
        }
    }

    /// Values of every listed key that exists, local ones first.
    pub async fn get_many(&self, ids: &[String]) -> MirrorResult<Answer<Vec<Value>>> {
        if ids.is_empty() {
            return Err(MirrorError::invalid_argument("no ids given"));
        }

        let mut values = Vec::new();
        let mut remote: Vec<(MirrorHost, Vec<&str>)> = Vec::new();
        for id in ids {
            match self.owner_of(id)? {
                None => values.extend(self.store.get(id)),
                Some(owner) => match remote.iter_mut().find(|(host, _)| *host == owner) {
                    Some((_, batch)) => batch.push(id.as_str()),
                    None => remote.push((owner, vec![id.as_str()])),
                },
            }
        }

        let forwarded = !remote.is_empty();
        for (owner, batch) in remote {
            let url = owner.for_keys(&batch);
            if let Some(body) = self.forward(&owner, url).await? {
                values.extend(parse_list::<Value>(&body)?);
            }
        }
        Ok(Answer { value: values, forwarded })
    }

    /// Local values only.
    pub fn get_all(&self) -> Vec<Value> {
        self.store.values()
    }

    /// Records of `key` whose range field lies in `[from, to]`.
    pub async fn get_range(
        &self,
        key: &str,
        from: &str,
        to: &str,
    ) -> MirrorResult<Answer<Vec<Value>>> {
        let range = self.range.as_ref().ok_or_else(|| {
            MirrorError::invalid_argument(format!(
                "range queries are not enabled for topic {}",
                self.topic
            ))
        })?;
        let (lower, upper) = range.indexer.scan_bounds(key, from, to)?;

        match self.owner_of(key)? {
            None => {
                debug!(%key, %lower, %upper, "range scan");
                Ok(Answer::local(self.store.scan(&lower, &upper)))
            }
            Some(owner) => {
                let url = owner.for_range(key, from, to);
                let values = match self.forward(&owner, url).await? {
                    Some(body) => parse_list(&body)?,
                    None => Vec::new(),
                };
                Ok(Answer::forwarded(values))
            }
        }
    }

    pub fn partitions(&self) -> BTreeMap<u32, String> {
        self.table.to_snapshot()
    }

    async fn forward(
        &self,
        owner: &MirrorHost,
        url: Url,
    ) -> MirrorResult<Option<Bytes>> {
        debug!(owner = %owner, url = %url, "forwarding read to partition owner");
        let envelope = match &self.fallback {
            Some(requests) => requests.make_request(owner, url).await,
            None => match self.transport.get(owner, url).await {
                Ok(response) => ResponseEnvelope::from_raw(owner, response),
                Err(error) => Err(FailedRequest {
                    error,
                    stale: false,
                    answered_by: owner.clone(),
                }),
            },
        }?;
        Ok(envelope.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracing_test::traced_test;

    const READING_AVSC: &str = r#"{
      "type": "record",
      "name": "Reading",
      "fields": [
        {"name": "sensor", "type": "string"},
        {"name": "at", "type": "long"}
      ]
    }"#;

    fn single_replica(key_type: KeyType) -> MirrorService {
        let local = MirrorHost::parse("replica-0:8080").unwrap();
        let table = RoutingTable::from_hosts([(0, local.clone())].into_iter().collect()).unwrap();
        let transport = MirrorTransport::new(&MirrorClientConfig::new("replica-0:8080")).unwrap();
        MirrorService::new("readings", key_type, local, table, transport)
    }

    fn with_readings(service: MirrorService) -> MirrorService {
        service
            .with_range(RecordSchema::parse_avro(READING_AVSC).unwrap(), "at")
            .unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn ingest_indexes_range_field() {
        let service = with_readings(single_replica(KeyType::String));
        for at in [30, 10, 20] {
            service
                .ingest_json("s1", json!({"sensor": "s1", "at": at}))
                .unwrap();
        }
        assert!(logs_contain("indexed range record"));

        let answer = service.get_range("s1", "10", "20").await.unwrap();
        let at: Vec<i64> = answer
            .value
            .iter()
            .map(|v| v["at"].as_i64().unwrap())
            .collect();
        assert_eq!(at, vec![10, 20]);
        assert!(!answer.forwarded);
        assert_eq!(service.get_all().len(), 1);
    }

    #[test]
    fn record_without_range_field_is_rejected() {
        let service = with_readings(single_replica(KeyType::String));
        assert!(service.ingest_json("s1", json!({"sensor": "s1"})).is_err());
        assert!(service.store().is_empty());
    }

    #[test]
    fn owner_of_splits_partitions() {
        let local = MirrorHost::parse("replica-0:8080").unwrap();
        let other = MirrorHost::parse("replica-1:8080").unwrap();
        let table = RoutingTable::from_hosts(
            [(0, local.clone()), (1, other.clone())].into_iter().collect(),
        )
        .unwrap();
        let transport = MirrorTransport::new(&MirrorClientConfig::new("replica-0:8080")).unwrap();
        let service = MirrorService::new("readings", KeyType::Long, local, table, transport);

        let owners: Vec<Option<MirrorHost>> = (0..32)
            .map(|key| service.owner_of(&key.to_string()).unwrap())
            .collect();
        assert!(owners.iter().any(Option::is_none));
        assert!(owners.contains(&Some(other)));
    }

    #[tokio::test]
    async fn argument_errors() {
        let service = single_replica(KeyType::Int);
        assert!(matches!(
            service.get_many(&[]).await,
            Err(MirrorError::InvalidArgument { .. })
        ));
        assert!(matches!(
            service.get_range("1", "1", "2").await,
            Err(MirrorError::InvalidArgument { .. })
        ));
        assert!(matches!(
            service.ingest_json("one", json!(1)),
            Err(MirrorError::InvalidArgument { .. })
        ));
    }
}
