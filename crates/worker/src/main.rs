use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use retouch_core::clock::{Clock, SystemClock};
use retouch_core::handler::TaskHandler;
use retouch_core::notify::Notifier;
use retouch_core::task::TaskKind;
use retouch_events::{ChatConfig, ChatDelivery, LogNotifier};
use retouch_vendors::{VendorApi, VendorHandler};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use retouch_worker::config::WorkerConfig;
use retouch_worker::coordinator::SideEffectCoordinator;
use retouch_worker::dispatcher::Dispatcher;
use retouch_worker::housekeeping;
use retouch_worker::ledger::PgBalanceLedger;
use retouch_worker::scheduler::{SchedulerDeps, TaskScheduler};
use retouch_worker::server::{self, AppState};
use retouch_worker::store::PgTaskStore;

/// Upper bound on waiting for in-flight executions at shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config =
        WorkerConfig::from_env().unwrap_or_else(|e| panic!("Invalid configuration: {e}"));

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "retouch_worker=debug,retouch_vendors=debug,retouch_events=debug,tower_http=info".into()
    });
    if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    tracing::info!(
        stats_host = %config.stats_host,
        stats_port = config.stats_port,
        max_concurrent = config.scheduler.max_concurrent,
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = retouch_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    retouch_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    retouch_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Handlers ---
    let vendor = Arc::new(
        VendorApi::new(
            config.vendor_api_url.clone(),
            config.vendor_api_key.clone(),
            config.vendor_timeout,
        )
        .expect("Failed to build vendor HTTP client"),
    );
    let handlers: HashMap<TaskKind, Arc<dyn TaskHandler>> = TaskKind::ALL
        .into_iter()
        .map(|kind| {
            let handler: Arc<dyn TaskHandler> =
                Arc::new(VendorHandler::new(Arc::clone(&vendor), vendor_endpoint(kind)));
            (kind, handler)
        })
        .collect();
    let dispatcher = Arc::new(Dispatcher::new(handlers));
    tracing::info!(vendor = %vendor.base_url(), "Task handlers registered");

    // --- Notifications ---
    let notifier: Arc<dyn Notifier> = match ChatConfig::from_env() {
        Some(chat) => {
            tracing::info!(api_url = %chat.api_url, "Chat delivery enabled");
            Arc::new(ChatDelivery::new(chat).expect("Failed to build chat HTTP client"))
        }
        None => {
            tracing::warn!("CHAT_BOT_TOKEN not set, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    // --- Scheduler ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(PgTaskStore::new(pool.clone()));
    let coordinator = Arc::new(SideEffectCoordinator::new(
        store.clone(),
        Arc::new(PgBalanceLedger::new(pool.clone())),
        notifier,
        Arc::clone(&clock),
    ));
    let scheduler = TaskScheduler::new(
        SchedulerDeps {
            store,
            dispatcher,
            coordinator,
            clock,
        },
        config.scheduler.clone(),
    );

    let cancel = CancellationToken::new();
    let scheduler_handle = tokio::spawn(Arc::clone(&scheduler).run(cancel.clone()));
    let housekeeping_handle = tokio::spawn(housekeeping::run(
        pool.clone(),
        config.housekeeping.clone(),
        cancel.clone(),
    ));

    // --- Stats server ---
    let app = server::router(AppState {
        scheduler: Arc::clone(&scheduler),
        pool: Some(pool),
    });
    let addr = SocketAddr::new(
        config.stats_host.parse().expect("Invalid STATS_HOST address"),
        config.stats_port,
    );
    tracing::info!(%addr, "Starting stats server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Stats server stopped, shutting down scheduler");
    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), scheduler_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), housekeeping_handle).await;

    let in_flight = scheduler.stats().in_flight;
    tracing::info!(in_flight, "Waiting for in-flight tasks");
    if tokio::time::timeout(DRAIN_TIMEOUT, scheduler.drain()).await.is_err() {
        tracing::warn!(
            in_flight = scheduler.stats().in_flight,
            "Drain timed out; unfinished tasks stay in processing",
        );
    }

    tracing::info!("Graceful shutdown complete");
}

/// Vendor path for each task kind.
fn vendor_endpoint(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Restore => "restore",
        TaskKind::Stylize => "stylize",
        TaskKind::EraStyle => "era-style",
        TaskKind::Generate => "generate",
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
