use fleetwatch::{
    util::{get_log_level, get_server_addr, get_server_port},
    worker::{LoadProfile, spawn_stress},
};
use rocket::{figment::Figment, get, launch, routes};
use tracing::instrument;
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[get("/")]
fn index() -> &'static str {
    "Hello World!"
}

#[get("/memory-load")]
#[instrument]
async fn memory_load() -> &'static str {
    spawn_stress(LoadProfile::Memory)
}

#[get("/cpu-load")]
#[instrument]
async fn cpu_load() -> &'static str {
    spawn_stress(LoadProfile::Cpu)
}

#[get("/max-load")]
#[instrument]
async fn max_load() -> &'static str {
    spawn_stress(LoadProfile::Max)
}

fn init() {
    dotenv::dotenv().ok();

    let level = get_log_level();
    let filter = filter::Targets::new().with_targets(vec![
        ("fleetwatch", level),
        ("fleetwatch_worker", level),
    ]);
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

fn get_config() -> Figment {
    rocket::Config::figment()
        .merge(("port", get_server_port()))
        .merge(("address", get_server_addr()))
}

#[launch]
fn rocket() -> _ {
    init();
    let figment = get_config();

    rocket::custom(figment).mount("/", routes![index, memory_load, cpu_load, max_load])
}
