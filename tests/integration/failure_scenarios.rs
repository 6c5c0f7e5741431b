//! Failure tests for the monitor
//!
//! These tests verify that one failing server never leaks into another:
//! - Dead worker endpoints
//! - Dead or misbehaving agents

use std::sync::Arc;
use std::time::Duration;

use fleetwatch::{
    MetricSnapshot,
    config::ProbeConfig,
    monitor::{AgentFeed, LivenessProber, ServerEntry, ServerTable, StatusColor, prober::UNREACHABLE_LATENCY_MS},
};
use futures::SinkExt;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn loaded_snapshot() -> MetricSnapshot {
    MetricSnapshot {
        memory_load: 60,
        cpu_load: 70,
        disk_usage: 30,
        requests_per_second: 12,
    }
}

#[tokio::test]
async fn test_probe_failure_is_isolated() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Hello World!"))
        .mount(&mock_server)
        .await;
    let live_port = url::Url::parse(&mock_server.uri())
        .unwrap()
        .port()
        .unwrap();

    let table = Arc::new(ServerTable::from_config(&[
        create_test_server_config("server-x", closed_port(), 5001),
        create_test_server_config("server-y", live_port, 5002),
    ]));
    let x = table.get("server-x").unwrap().clone();
    let y = table.get("server-y").unwrap().clone();
    x.apply_snapshot(loaded_snapshot()).await;

    let config = ProbeConfig {
        timeout_secs: 1,
        ..ProbeConfig::default()
    };
    let prober = LivenessProber::new(table.clone(), &config).unwrap();
    let outcomes = prober.probe_all().await;

    assert_eq!(outcomes.len(), 2);
    assert!(!outcomes[0].is_reachable());
    assert!(outcomes[1].is_reachable());

    let x_liveness = x.liveness().await;
    assert_eq!(x_liveness.latency_ms, UNREACHABLE_LATENCY_MS);
    assert_eq!(x_liveness.status_code, 0);
    assert_eq!(x.metrics().await.snapshot, loaded_snapshot());

    let y_liveness = y.liveness().await;
    assert_eq!(y_liveness.status_code, 200);
    assert!(y_liveness.latency_ms < UNREACHABLE_LATENCY_MS);
    assert_eq!(y.color().await, StatusColor::Healthy);
    assert_eq!(y.metrics().await.snapshot, MetricSnapshot::default());
}

#[tokio::test]
async fn test_server_error_counts_against_health() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    let port = url::Url::parse(&mock_server.uri())
        .unwrap()
        .port()
        .unwrap();

    let table = Arc::new(ServerTable::from_config(&[create_test_server_config(
        "server-01",
        port,
        5001,
    )]));
    let prober = LivenessProber::new(table.clone(), &ProbeConfig::default()).unwrap();
    prober.probe_all().await;

    let entry = table.get("server-01").unwrap();
    let liveness = entry.liveness().await;
    assert_eq!(liveness.status_code, 500);
    assert_eq!(liveness.latency_ms, UNREACHABLE_LATENCY_MS);
    // latency 1.5 + status 1.5 of 9
    assert_eq!(entry.color().await, StatusColor::Warning);
}

/// Accept one monitor and send it `frames`.
///
/// With `resend_every` the last frame is repeated like a live agent would;
/// without it the socket stays open and silent.
async fn fake_agent(frames: Vec<&'static str>, resend_every: Option<Duration>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        for frame in &frames {
            socket.send(Message::Text(frame.to_string())).await.unwrap();
        }

        match (resend_every, frames.last()) {
            (Some(period), Some(last)) => loop {
                tokio::time::sleep(period).await;
                if socket.send(Message::Text(last.to_string())).await.is_err() {
                    break;
                }
            },
            _ => tokio::time::sleep(Duration::from_secs(10)).await,
        }
    });

    port
}

#[tokio::test]
async fn test_malformed_snapshots_fall_back_to_zero() {
    let port = fake_agent(
        vec![
            "{ not json",
            r#"{"event":"monitoring-stats","data":{"memoryLoad":"lots","cpuLoad":-5,"diskUsage":88}}"#,
        ],
        None,
    )
    .await;

    let entry = Arc::new(ServerEntry::new("server-01", "127.0.0.1", 4001));
    let task = AgentFeed::new(
        entry.clone(),
        &create_test_agent_endpoint(port),
        &create_test_feed_config(),
    )
    .spawn();

    let watched = &entry;
    wait_until(Duration::from_secs(2), || async move {
        !watched.trend().await.is_empty()
    })
    .await;

    assert_eq!(
        entry.metrics().await.snapshot,
        MetricSnapshot {
            memory_load: 0,
            cpu_load: 0,
            disk_usage: 88,
            requests_per_second: 0,
        }
    );
    // the unreadable frame never reached the scorer
    assert_eq!(entry.trend().await.len(), 1);

    task.abort();
}

#[tokio::test]
async fn test_dead_agent_does_not_affect_others() {
    let live_port = fake_agent(
        vec![
            r#"{"event":"monitoring-stats","data":{"memoryLoad":10,"cpuLoad":15,"diskUsage":20,"requestsPerSecond":1}}"#,
        ],
        Some(Duration::from_millis(100)),
    )
    .await;

    let live = Arc::new(ServerEntry::new("server-01", "127.0.0.1", 4001));
    let dead = Arc::new(ServerEntry::new("server-02", "127.0.0.1", 4002));
    dead.apply_snapshot(loaded_snapshot()).await;

    let tasks = [
        AgentFeed::new(
            live.clone(),
            &create_test_agent_endpoint(live_port),
            &create_test_feed_config(),
        )
        .spawn(),
        AgentFeed::new(
            dead.clone(),
            &create_test_agent_endpoint(closed_port()),
            &create_test_feed_config(),
        )
        .spawn(),
    ];

    let (watched_live, watched_dead) = (&live, &dead);
    wait_until(Duration::from_secs(2), || async move {
        watched_live.metrics().await.snapshot.cpu_load == 15
            && watched_dead.color().await == StatusColor::AgentUnreachable
    })
    .await;

    assert!(live.metrics().await.agent_connected);
    assert_eq!(live.color().await, StatusColor::Healthy);

    // last known metrics survive the outage
    assert!(!dead.metrics().await.agent_connected);
    assert_eq!(dead.metrics().await.snapshot, loaded_snapshot());

    for task in tasks {
        task.abort();
    }
}

#[tokio::test]
async fn test_silent_agent_is_marked_unreachable() {
    let port = fake_agent(
        vec![
            r#"{"event":"monitoring-stats","data":{"memoryLoad":20,"cpuLoad":25,"diskUsage":30,"requestsPerSecond":2}}"#,
        ],
        None,
    )
    .await;

    let entry = Arc::new(ServerEntry::new("server-01", "127.0.0.1", 4001));
    let task = AgentFeed::new(
        entry.clone(),
        &create_test_agent_endpoint(port),
        &create_test_feed_config(),
    )
    .spawn();

    let watched = &entry;
    wait_until(Duration::from_secs(2), || async move {
        watched.metrics().await.snapshot.cpu_load == 25
    })
    .await;
    assert_eq!(entry.color().await, StatusColor::Healthy);

    // the socket stays open, only the frames stop
    wait_until(Duration::from_secs(3), || async move {
        !watched.metrics().await.agent_connected
            && watched.color().await == StatusColor::AgentUnreachable
    })
    .await;

    assert_eq!(entry.metrics().await.snapshot.cpu_load, 25);

    task.abort();
}
