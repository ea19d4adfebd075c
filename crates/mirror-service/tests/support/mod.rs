#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::{KeySerializer, KeyType, MirrorConfig, MirrorHost, StringKeySerializer};
use mirror_client::{
    DefaultPartitionFinder, MirrorClientConfig, MirrorQueryClient, MirrorTransport,
    PartitionFinder, RoutingTable,
};
use mirror_service::{MirrorServer, MirrorService};
use range_index::RecordSchema;
use serde_json::Value;
use tokio::net::TcpListener;

pub const PURCHASE_AVSC: &str = r#"{
  "type": "record",
  "name": "Purchase",
  "fields": [
    {"name": "id", "type": "string"},
    {"name": "timestamp", "type": "int"},
    {"name": "amount", "type": "long"}
  ]
}"#;

pub async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind replica listener");
    let addr = listener.local_addr().expect("local addr");
    (listener, addr)
}

/// Address nothing listens on.
pub fn dead_address() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr")
}

pub fn replica(
    local: SocketAddr,
    partitions: &[(u32, SocketAddr)],
    key_type: KeyType,
) -> MirrorService {
    let mirror = MirrorConfig::default();
    let snapshot = partitions
        .iter()
        .map(|(partition, addr)| (*partition, addr.to_string()))
        .collect();
    let table = RoutingTable::from_snapshot(snapshot, &mirror).expect("valid assignment");
    let transport = MirrorTransport::new(
        &MirrorClientConfig::new(local.to_string())
            .with_connect_timeout(Duration::from_millis(500))
            .with_request_timeout(Duration::from_secs(2)),
    )
    .expect("transport");
    let host = MirrorHost::parse(&local.to_string()).expect("host");
    MirrorService::new("purchases", key_type, host, table, transport)
}

pub fn with_purchase_range(service: MirrorService) -> MirrorService {
    let schema = RecordSchema::parse_avro(PURCHASE_AVSC).expect("schema");
    service
        .with_range(schema, "timestamp")
        .expect("timestamp is a range field")
}

/// Serves `service` on `listener` in the background.
pub fn start(service: MirrorService, listener: TcpListener) -> Arc<MirrorService> {
    let server = MirrorServer::new(service, "unused");
    let handle = Arc::clone(server.service());
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    handle
}

pub fn key_for_partition(partition: u32, count: u32) -> String {
    (0..10_000)
        .map(|i| format!("purchase-{i}"))
        .find(|key| {
            DefaultPartitionFinder
                .partition_for(key.as_bytes(), count)
                .unwrap()
                == partition
        })
        .expect("some key maps to every partition")
}

pub async fn string_client(service: SocketAddr) -> MirrorQueryClient<str, Value> {
    let serializer: Arc<dyn KeySerializer<str>> = Arc::new(StringKeySerializer);
    let config = MirrorClientConfig::new(service.to_string())
        .with_connect_timeout(Duration::from_millis(500));
    MirrorQueryClient::connect(&config, serializer)
        .await
        .expect("client connects")
}
