//! `dagflow-server`: binds the management API (C4), runs the scheduler
//! loop (C3) against the configured node executor, and serves both out
//! of one process.
//!
//! Grounded on the original `orchestrator-server.rs` - same tracing
//! setup, migration-then-health-check startup sequence, and server
//! identity stamp via `ConfigurationRepository`. Dropped: the SSL/LDAP/
//! security-mode machinery, which belonged to the teacher's multi-tenant
//! deployment story and has no counterpart in this engine's scope.

use std::net::SocketAddr;
use std::sync::Arc;

use dagflow_engine::auth::AuthInterceptor;
use dagflow_engine::config::EngineConfig;
use dagflow_engine::db::repositories::ConfigurationRepository;
use dagflow_engine::db::DatabaseConnection;
use dagflow_engine::dispatch::grpc::TonicDispatchClient;
use dagflow_engine::events::{DbEventLogger, EventLogger, FanOutEventLogger, StdoutEventLogger};
use dagflow_engine::scheduler::Scheduler;
use dagflow_engine::services::{router, ManagementApi};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    tracing::info!("loading configuration");
    let config = EngineConfig::from_env()?;
    tracing::info!(node_target = %config.node_target, workflow_port = config.workflow_port, "configuration loaded");

    let db = DatabaseConnection::new(&config.database_url).await?;
    tracing::info!("running migrations");
    db.run_migrations().await?;
    db.health_check().await?;

    let pool = db.pool().clone();
    stamp_server_identity(&pool, &config.server_name).await?;

    let auth = AuthInterceptor::from_env_var(&config.api_tokens);
    let events: Arc<dyn EventLogger> = Arc::new(FanOutEventLogger::new(vec![
        Box::new(StdoutEventLogger),
        Box::new(DbEventLogger::new(pool.clone())),
    ]));

    tracing::info!(target = %config.node_target, "connecting to node executor");
    let dispatch = TonicDispatchClient::connect(config.node_target.clone()).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Arc::new(Scheduler::new(
        pool.clone(),
        Arc::new(dispatch),
        events.clone(),
        config.poll_interval,
    ));
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    let api = Arc::new(ManagementApi::new(pool, auth, events));
    let app = router(api);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.workflow_port).parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("management API listening on {}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("management API stopped, signalling scheduler shutdown");
    let _ = shutdown_tx.send(true);
    let _ = scheduler_handle.await;

    tracing::info!("dagflow-server shut down gracefully");
    Ok(())
}

/// Stamp this process's operational identity into the `configuration`
/// table: a fixed, operator-chosen name and a UUID generated once and
/// reused across restarts.
async fn stamp_server_identity(
    pool: &dagflow_engine::db::DatabasePool,
    server_name: &str,
) -> Result<(), sqlx::Error> {
    ConfigurationRepository::set(pool, "server.name", server_name, "string").await?;

    let uuid = match ConfigurationRepository::get(pool, "server.uuid").await? {
        Some(existing) => existing.value,
        None => {
            let generated = uuid::Uuid::new_v4().to_string();
            ConfigurationRepository::set(pool, "server.uuid", &generated, "string").await?;
            generated
        }
    };
    tracing::info!(server.name = %server_name, server.uuid = %uuid, "server identity stamped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL-C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received CTRL-C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
