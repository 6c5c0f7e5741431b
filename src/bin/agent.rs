use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fleetwatch::{
    agent::{
        AgentState, CgroupSource, PublisherHandle, RequestCounter, Sampler, SystemBackend,
        server::spawn_agent_server,
    },
    util::{get_agent_addr, get_agent_port, get_cgroup_root, get_log_level, get_system_backend},
};
use tokio::sync::broadcast;
use tracing::{info, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Address to listen on (defaults to AGENT_ADDR or 0.0.0.0)
    #[arg(long)]
    addr: Option<IpAddr>,

    /// Port to listen on (defaults to AGENT_PORT or 5001)
    #[arg(short, long)]
    port: Option<u16>,

    /// cgroup v2 directory to read counters from
    #[arg(long)]
    cgroup_root: Option<PathBuf>,

    /// How memory size and disk usage are queried (defaults to SYSTEM_BACKEND or native)
    #[arg(long, value_enum)]
    system_backend: Option<SystemBackend>,

    /// Milliseconds between snapshots
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
}

fn init() {
    dotenv::dotenv().ok();

    let level = get_log_level();
    let filter = filter::Targets::new()
        .with_target("fleetwatch", level)
        .with_target("fleetwatch_agent", level)
        .with_target("tower_http", level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(true),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let backend = args.system_backend.unwrap_or_else(get_system_backend);
    let source =
        CgroupSource::new(args.cgroup_root.unwrap_or_else(get_cgroup_root)).with_backend(backend);
    info!(
        "reading counters from {} ({backend:?} system backend)",
        source.root().display()
    );

    let requests = Arc::new(RequestCounter::new());
    let (snapshot_tx, _) = broadcast::channel(16);

    let publisher = PublisherHandle::spawn(
        Sampler::new(source),
        requests.clone(),
        snapshot_tx.clone(),
        Duration::from_millis(args.interval_ms),
    );

    let bind_addr = SocketAddr::new(
        args.addr.unwrap_or_else(get_agent_addr),
        args.port.unwrap_or_else(get_agent_port),
    );
    spawn_agent_server(bind_addr, AgentState { requests, snapshot_tx }).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down agent");
    publisher.shutdown().await?;

    Ok(())
}
