mod support;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{KeySerializer, MirrorConfig, MirrorError, MirrorHost, StringKeySerializer};
use mirror_client::{
    DefaultPartitionFinder, MirrorClientConfig, MirrorQueryClient, MirrorTransport,
    PartitionFinder, PartitionRouter, RoutingTable,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use support::{client_config, connect, dead_address, StubReplica};

fn offline_router(replicas: u32, partitions: u32) -> PartitionRouter<str> {
    let hosts: BTreeMap<u32, MirrorHost> = (0..partitions)
        .map(|p| {
            let host = MirrorHost::parse(&format!("replica-{}:8080", p % replicas)).unwrap();
            (p, host)
        })
        .collect();
    let transport = MirrorTransport::new(&MirrorClientConfig::new("localhost:1")).unwrap();
    let serializer: Arc<dyn KeySerializer<str>> = Arc::new(StringKeySerializer);
    PartitionRouter::with_table(
        transport,
        MirrorHost::parse("localhost:1").unwrap(),
        MirrorConfig::default(),
        serializer,
        Arc::new(DefaultPartitionFinder),
        RoutingTable::from_hosts(hosts).unwrap(),
    )
}

proptest! {
    #[test]
    fn every_key_resolves_to_its_partition_owner(
        key in "[a-zA-Z0-9_-]{0,32}",
        replicas in 1u32..4,
        partitions in 1u32..12,
    ) {
        let router = offline_router(replicas, partitions);
        let expected = DefaultPartitionFinder
            .partition_for(key.as_bytes(), partitions)
            .unwrap();

        prop_assert_eq!(router.partition_of(&key).unwrap(), expected);
        let host = router.find_host(&key).unwrap();
        let table = router.table();
        prop_assert_eq!(Some(&host), table.host_for(expected));
        prop_assert_eq!(router.find_host(&key).unwrap(), host);
    }
}

#[test]
fn all_hosts_are_distinct() {
    let router = offline_router(3, 9);
    let hosts = router.all_hosts();
    assert_eq!(hosts.len(), 3);
    assert_eq!(hosts[0].authority(), "replica-0:8080");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn startup_fails_when_service_unreachable() {
    let err = connect(dead_address()).await.err().expect("connect fails");
    assert!(err.is_unreachable(), "{err:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn startup_fails_on_empty_mapping() {
    let lb = StubReplica::new();
    let lb_addr = lb.spawn().await;

    let err = connect(lb_addr).await.err().expect("connect fails");
    assert!(matches!(err, MirrorError::Configuration { .. }), "{err:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn startup_checks_expected_partition_count() {
    let lb = StubReplica::new();
    let lb_addr = lb.spawn().await;
    lb.set_partitions(&[(0, lb_addr)]);

    let serializer: Arc<dyn KeySerializer<str>> = Arc::new(StringKeySerializer);
    let config = client_config(lb_addr).with_expected_partitions(3);
    let result = MirrorQueryClient::<str, Value>::connect(&config, serializer).await;

    assert!(matches!(result, Err(MirrorError::Configuration { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn table_follows_partition_count_growth() {
    let lb = StubReplica::new();
    let lb_addr = lb.spawn().await;
    lb.set_partitions(&[(0, lb_addr)]);
    lb.insert("k", json!("v"));

    let client = connect(lb_addr).await.unwrap();
    assert_eq!(client.router().table().partition_count(), 1);

    lb.set_partitions(&[(0, lb_addr), (1, lb_addr)]);
    lb.set_stale(true);
    assert_eq!(client.get("k").await.unwrap(), Some(json!("v")));
    lb.set_stale(false);

    for _ in 0..5 {
        assert_eq!(client.get("k").await.unwrap(), Some(json!("v")));
    }
    assert_eq!(client.router().table().partition_count(), 2);
    assert_eq!(lb.partition_requests(), 2);
    assert!(!client.needs_refresh());

    let key = "k".to_string();
    assert_eq!(
        client.router().partition_of(&key).unwrap(),
        DefaultPartitionFinder.partition_for(key.as_bytes(), 2).unwrap()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_snapshot_is_not_refetched_on_every_read() {
    let lb = StubReplica::new();
    let lb_addr = lb.spawn().await;
    lb.set_partitions(&[(0, lb_addr), (1, lb_addr)]);
    lb.insert("k", json!("v"));

    let client = connect(lb_addr).await.unwrap();
    lb.set_partitions(&[(0, lb_addr), (2, lb_addr)]);
    lb.set_stale(true);
    client.get("k").await.unwrap();
    lb.set_stale(false);

    for _ in 0..3 {
        assert_eq!(client.get("k").await.unwrap(), Some(json!("v")));
    }
    assert_eq!(lb.partition_requests(), 2);
    assert!(!client.needs_refresh());
    assert_eq!(client.router().table().partition_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lookups_racing_a_refresh_see_whole_tables() {
    let lb = StubReplica::new();
    let lb_addr = lb.spawn().await;
    let other = dead_address();
    let old = [(0, lb_addr), (1, lb_addr)];
    let new = [(0, other), (1, other), (2, other)];
    lb.set_partitions(&old);

    let client = connect(lb_addr).await.unwrap();
    let old_table = client.router().table();
    let keys: Vec<String> = (0..32).map(|i| format!("key-{i}")).collect();

    for round in 0..20 {
        lb.set_partitions(if round % 2 == 0 { &new[..] } else { &old[..] });
        let (refreshed, lookups) = tokio::join!(client.refresh(), async {
            let mut seen = Vec::new();
            for key in &keys {
                let table = client.router().table();
                seen.push((table.clone(), client.router().find_host(key.as_str()).unwrap()));
                tokio::task::yield_now().await;
            }
            seen
        });
        refreshed.unwrap();

        for (table, _) in &lookups {
            let count = table.partition_count();
            assert!(count == 2 || count == 3, "torn table with {count} partitions");
            let hosts = table.distinct_hosts();
            assert_eq!(hosts.len(), 1);
            if count == 2 {
                assert_eq!(**table, *old_table);
            } else {
                assert_eq!(hosts[0].authority(), other.to_string());
            }
        }
        for (_, host) in &lookups {
            let address = host.authority().to_string();
            assert!(address == lb_addr.to_string() || address == other.to_string());
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_header_from_replica_refreshes_once() {
    let h1 = StubReplica::new();
    let a1 = h1.spawn().await;
    h1.set_partitions(&[(0, a1)]);
    h1.insert("k", json!("v"));

    let client = connect(a1).await.unwrap();
    h1.set_stale(true);
    assert_eq!(client.get("k").await.unwrap(), Some(json!("v")));
    assert!(client.needs_refresh());
    assert_eq!(h1.partition_requests(), 1);

    h1.set_stale(false);
    assert_eq!(client.get("k").await.unwrap(), Some(json!("v")));
    assert_eq!(client.get("k").await.unwrap(), Some(json!("v")));
    assert_eq!(h1.partition_requests(), 2);
    assert!(!client.needs_refresh());
}
