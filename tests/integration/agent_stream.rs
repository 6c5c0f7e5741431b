//! Agent server and monitor feed talking over a real socket

use std::sync::Arc;
use std::time::{Duration, Instant};

use fleetwatch::{
    agent::{AgentState, PublisherHandle, RequestCounter, Sampler, server::spawn_agent_server},
    monitor::{AgentFeed, ServerEntry, StatusColor},
};
use tokio::sync::broadcast;

use crate::helpers::*;

async fn start_agent(requests: Arc<RequestCounter>) -> (std::net::SocketAddr, PublisherHandle) {
    let (snapshot_tx, _) = broadcast::channel(16);
    let publisher = PublisherHandle::spawn(
        Sampler::new(StaticSource::default()),
        requests.clone(),
        snapshot_tx.clone(),
        Duration::from_millis(50),
    );
    let addr = spawn_agent_server(local_addr(0), AgentState { requests, snapshot_tx })
        .await
        .unwrap();
    (addr, publisher)
}

#[tokio::test]
async fn test_feed_receives_agent_snapshots() {
    let (addr, publisher) = start_agent(Arc::new(RequestCounter::new())).await;

    let entry = Arc::new(ServerEntry::new("server-01", "127.0.0.1", 4001));
    let feed = AgentFeed::new(
        entry.clone(),
        &create_test_agent_endpoint(addr.port()),
        &create_test_feed_config(),
    );
    let task = feed.spawn();

    let watched = &entry;
    wait_until(Duration::from_secs(3), || async move {
        watched.metrics().await.snapshot.memory_load == 50
    })
    .await;

    let metrics = entry.metrics().await;
    assert!(metrics.agent_connected);
    assert_eq!(metrics.snapshot.disk_usage, 42);
    assert_eq!(entry.color().await, StatusColor::Healthy);
    assert!(!entry.trend().await.is_empty());

    task.abort();
    publisher.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_inbound_requests_are_counted() {
    let started_at = Instant::now()
        .checked_sub(Duration::from_secs(2))
        .unwrap();
    let requests = Arc::new(RequestCounter::starting_at(started_at));
    let (addr, publisher) = start_agent(requests.clone()).await;

    let client = reqwest::Client::new();
    for path in ["/", "/", "/orders", "/orders/42"] {
        let response = client
            .get(format!("http://{addr}{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.text().await.unwrap(), "OK");
    }
    assert_eq!(requests.pending(), 4);

    // four requests over a window of just over two seconds
    let snapshot = publisher.publish_now().await.unwrap();
    assert_eq!(snapshot.requests_per_second, 2);
    assert_eq!(requests.pending(), 0);

    publisher.shutdown().await.unwrap();
}
