use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;

use rfp_backend::{
    app, config,
    config::{DispatchMode, EmailBackend, StorageBackend},
    db,
    dispatch::{
        Dispatcher, InlineDispatcher, JobQueue, JobRunner, LocalExecutor, QueueBackedDispatcher,
        QueueWorker, RedisJobQueue,
    },
    logging,
    services::{
        CapturingChannel, ConsoleChannel, DocumentStore, LocalDocumentStore, NotificationChannel,
        SendGridChannel,
    },
    store::{MemoryStore, PgStore, RfpStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = config::Settings::from_env()?;

    // Initialize logging
    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        storage = ?settings.storage_backend,
        dispatch = ?settings.dispatch_mode,
        "Starting RFP backend"
    );

    // Repository
    let store: Arc<dyn RfpStore> = match settings.storage_backend {
        StorageBackend::Postgres => {
            let url = settings.database_url.as_deref().unwrap_or_default();
            let pool = db::create_pool(url, settings.database_max_connections).await?;
            if settings.run_migrations {
                db::run_migrations(&pool).await?;
            }
            Arc::new(PgStore::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory repository; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Notification channel
    let channel: Arc<dyn NotificationChannel> = match settings.email_backend {
        EmailBackend::SendGrid => Arc::new(SendGridChannel::new(
            settings.sendgrid_key.clone().unwrap_or_default(),
            settings.sendgrid_from.clone(),
            settings.sendgrid_timeout(),
        )?),
        EmailBackend::Capture => Arc::new(CapturingChannel::new()),
        EmailBackend::Console => Arc::new(ConsoleChannel),
    };

    // Dispatcher
    let runner = Arc::new(JobRunner::new(
        store.clone(),
        channel,
        settings.retry_policy(),
    ));
    let local = LocalExecutor::start(runner.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut worker_handle = None;

    let (dispatcher, queue): (Arc<dyn Dispatcher>, Option<Arc<dyn JobQueue>>) =
        match settings.dispatch_mode {
            DispatchMode::Inline => (
                Arc::new(InlineDispatcher::with_executor(runner.clone(), local.clone())),
                None,
            ),
            DispatchMode::Queue => {
                let url = settings.redis_url.as_deref().unwrap_or_default();
                match RedisJobQueue::connect(url, &settings.dispatch_queue).await {
                    Ok(queue) => {
                        let queue: Arc<dyn JobQueue> = Arc::new(queue);

                        if settings.embedded_worker {
                            let worker = QueueWorker::new(queue.clone(), runner.clone());
                            worker_handle = Some(tokio::spawn(worker.run(shutdown_rx)));
                        }
                        (
                            Arc::new(QueueBackedDispatcher::with_executor(
                                queue.clone(),
                                runner.clone(),
                                local.clone(),
                            )),
                            Some(queue),
                        )
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Redis job queue unavailable, dispatching inline");
                        (
                            Arc::new(InlineDispatcher::with_executor(runner.clone(), local.clone())),
                            None,
                        )
                    }
                }
            }
        };

    // Document store
    let blobs: Arc<dyn DocumentStore> = Arc::new(LocalDocumentStore::new(
        &settings.uploads_dir,
        settings.upload_handle_ttl_seconds,
    ));

    // Create application state
    let state = app::AppState::new(settings.clone(), store, dispatcher, blobs, queue);

    // Build application
    let app = app::create_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the embedded worker, then let queued local jobs finish
    let _ = shutdown_tx.send(true);
    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Queue worker panicked");
        }
    }
    local.close();
    let grace = settings.shutdown_grace();
    if !runner.wait_idle(grace).await {
        tracing::warn!(
            in_flight = runner.in_flight(),
            grace_secs = grace.as_secs(),
            "Background jobs still running at shutdown"
        );
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
