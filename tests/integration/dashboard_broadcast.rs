//! Dashboard clients receiving the full server table

use std::sync::Arc;
use std::time::Duration;

use fleetwatch::{
    MetricSnapshot,
    monitor::{Broadcaster, DashboardState, ServerTable, StatusColor, server::spawn_dashboard_server},
    protocol::{HEARTBEAT, Heartbeat, IncomingFrame},
};
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::helpers::*;

async fn start_dashboard() -> (std::net::SocketAddr, Arc<ServerTable>) {
    let servers = vec![
        create_test_server_config("server-01", 4001, 5001),
        create_test_server_config("server-02", 4002, 5002),
        create_test_server_config("server-03", 4003, 5003),
    ];
    let table = Arc::new(ServerTable::from_config(&servers));
    let config = create_test_dashboard_config();

    let (heartbeat_tx, _) = broadcast::channel(16);
    let state = DashboardState {
        table: table.clone(),
        heartbeat_tx: heartbeat_tx.clone(),
    };
    let addr = spawn_dashboard_server(&config, state).await.unwrap();
    Broadcaster::new(table.clone(), heartbeat_tx, config.broadcast_interval()).spawn();

    (addr, table)
}

async fn next_heartbeat(addr: std::net::SocketAddr) -> Heartbeat {
    let (mut stream, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let message = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("no heartbeat received")
        .unwrap()
        .unwrap();

    let Message::Text(text) = message else {
        panic!("expected a text frame, got {message:?}");
    };
    let frame = IncomingFrame::parse(&text).unwrap();
    assert_eq!(frame.event, HEARTBEAT);
    serde_json::from_value(frame.data).unwrap()
}

#[tokio::test]
async fn test_client_gets_full_table() {
    let (addr, table) = start_dashboard().await;
    table
        .get("server-02")
        .unwrap()
        .apply_snapshot(MetricSnapshot {
            memory_load: 96,
            cpu_load: 97,
            disk_usage: 40,
            requests_per_second: 3,
        })
        .await;

    let heartbeat = next_heartbeat(addr).await;

    assert_eq!(heartbeat.servers.len(), 3);
    let server = &heartbeat.servers[1];
    assert_eq!(server.name, "server-02");
    assert_eq!(server.cpu_load, 97);
    assert_eq!(server.status, "#00cc00");
    assert_eq!(server.score_trend.len(), 1);
}

#[tokio::test]
async fn test_late_client_is_in_sync_after_first_frame() {
    let (addr, table) = start_dashboard().await;

    // let a few heartbeats go by before anyone connects
    tokio::time::sleep(Duration::from_millis(200)).await;
    table.get("server-03").unwrap().record_probe(9999, 0).await;

    let heartbeat = next_heartbeat(addr).await;

    let names: Vec<_> = heartbeat.servers.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["server-01", "server-02", "server-03"]);
    assert_eq!(heartbeat.servers[2].latency, 9999);
    assert_eq!(heartbeat.servers[2].status_code, 0);
}

#[tokio::test]
async fn test_servers_endpoint() {
    let (addr, _table) = start_dashboard().await;

    let heartbeat: Heartbeat = reqwest::get(format!("http://{addr}/api/servers"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(heartbeat.servers.len(), 3);
    assert!(
        heartbeat
            .servers
            .iter()
            .all(|s| s.health == StatusColor::Unknown && s.score_trend.is_empty())
    );
}
