use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fleetwatch::{
    config::{Config, read_config_file},
    monitor::{
        AgentFeed, Broadcaster, DashboardState, LivenessProber, ServerTable,
        server::spawn_dashboard_server,
    },
    util::get_log_level,
};
use tokio::sync::broadcast;
use tracing::{debug, info, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    dotenv::dotenv().ok();

    let level = get_log_level();
    let filter = filter::Targets::new().with_targets(vec![
        ("fleetwatch", level),
        ("fleetwatch_monitor", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;
    let table = Arc::new(ServerTable::from_config(&config.servers));

    let (heartbeat_tx, _) = broadcast::channel(16);
    let state = DashboardState {
        table: table.clone(),
        heartbeat_tx: heartbeat_tx.clone(),
    };
    spawn_dashboard_server(&config.dashboard, state)
        .await
        .context("failed to start dashboard server")?;

    dispatch_feeds(&config, &table);

    LivenessProber::new(table.clone(), &config.probe)?.spawn();
    Broadcaster::new(table, heartbeat_tx, config.dashboard.broadcast_interval()).spawn();

    tokio::signal::ctrl_c().await?;
    info!("shutting down monitor");

    Ok(())
}

fn dispatch_feeds(config: &Config, table: &ServerTable) {
    for server in &config.servers {
        let Some(entry) = table.get(&server.name) else {
            continue;
        };

        let feed = AgentFeed::new(entry.clone(), &server.agent, &config.feed);
        debug!("starting agent feed for {} ({})", server.name, feed.url());
        feed.spawn();
    }
}
