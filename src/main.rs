use std::sync::Arc;
use std::time::Duration;

use actix_web::web::{Data, PayloadConfig};
use actix_web::{web, App, HttpServer};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crash_collector::config::{Args, Settings};
use crash_collector::handler::{self, AppState};
use crash_collector::health;
use crash_collector::lifecycle::Lifecycle;
use crash_collector::pipeline::Pipeline;
use crash_collector::publish::{CrashPublish, MemoryCrashPublish};
use crash_collector::stats::{self, StatsLog};
use crash_collector::storage::{CrashStorage, MemoryCrashStorage};
use crash_collector::throttle::{RuleThrottler, Throttler};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let settings = Settings::from_args(args);

    PrometheusBuilder::new()
        .install()
        .expect("failed to install prometheus metrics recorder");

    info!(bind = %settings.bind, db_path = %settings.db_path, "starting crash collector");

    let stats = Arc::new(StatsLog::open(&settings.db_path).expect("failed to open stats db"));

    // Reference backends: an operator wires in a real object store and
    // message queue here in place of the in-memory ones.
    let storage: Arc<dyn CrashStorage> = Arc::new(MemoryCrashStorage::new());
    let publisher: Arc<dyn CrashPublish> = Arc::new(MemoryCrashPublish::new());
    let throttler: Arc<dyn Throttler> = Arc::new(RuleThrottler::accept_all());

    let pipeline = Pipeline::start(
        settings.concurrent_crashmovers,
        Arc::clone(&storage),
        Arc::clone(&publisher),
        Arc::clone(&stats),
    );
    let queue = Arc::clone(&pipeline.queue);

    let lifecycle = Arc::new(Lifecycle::new(
        Arc::clone(&queue),
        Arc::clone(&storage),
        Arc::clone(&publisher),
    ));

    let app_state = Data::new(AppState {
        settings: settings.clone(),
        queue: Arc::clone(&queue),
        throttler,
        stats: Arc::clone(&stats),
    });
    let stats_data = Data::new(stats);
    let lifecycle_data = Data::new(Arc::clone(&lifecycle));

    let bind_addr = settings.bind.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(stats_data.clone())
            .app_data(lifecycle_data.clone())
            .app_data(PayloadConfig::new(250 * 1024 * 1024))
            .route("/submit", web::post().to(handler::submit))
            .route("/stats", web::get().to(stats::stats_handler))
            .route("/health", web::get().to(health::health))
            .route("/__version__", web::get().to(health::version))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    actix_rt::spawn(server);

    // Drain-based shutdown: stop listening, then wait for the pipeline
    // to finish everything already in flight before exiting, per
    // spec.md §4.F/§5. A real deployment hooks this to SIGTERM; here
    // we simply poll has_work_to_do after the process receives a
    // Ctrl-C.
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, draining crashmover queue");
    server_handle.stop(true).await;
    while lifecycle.has_work_to_do() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    info!("drain complete, exiting");

    Ok(())
}
