use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use conveyor_core::api::{self, AppState};
use conveyor_core::bus::EventBus;
use conveyor_core::executors::email::EmailExecutor;
use conveyor_core::executors::ExecutorRegistry;
use conveyor_core::health::HealthMonitor;
use conveyor_core::job::JobType;
use conveyor_core::queue_manager::QueueManager;
use conveyor_core::scheduler::Scheduler;
use conveyor_core::shutdown::ShutdownCoordinator;
use conveyor_core::store::JobStore;
use conveyor_core::worker_pool::WorkerPool;
use conveyor_core::Config;

#[tokio::main]
async fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    conveyor_core::logging::init(&config.log_level);
    tracing::info!(port = config.port, worker_pool_size = config.worker_pool_size, "starting conveyor");

    let store = Arc::new(JobStore::new(
        config.queue_max_size,
        config.max_job_attempts,
        config.retry_backoff_base_ms,
    ));
    let bus = Arc::new(EventBus::new());
    let queue_manager = Arc::new(QueueManager::new(store, Arc::clone(&bus)));

    let email_executor = match EmailExecutor::from_config(
        config.smtp_host.as_deref(),
        config.smtp_port,
        config.smtp_username.as_deref(),
        config.smtp_password.as_deref(),
        &config.smtp_from,
    ) {
        Ok(executor) => executor,
        Err(err) => {
            tracing::error!(error = %err, "failed to configure email executor");
            std::process::exit(1);
        }
    };
    let registry = Arc::new(ExecutorRegistry::new().register(JobType::SendEmail, Arc::new(email_executor)));

    let worker_pool = WorkerPool::new(
        registry,
        config.worker_pool_size,
        Duration::from_millis(config.worker_init_timeout_ms),
    );
    if let Err(err) = worker_pool.initialize().await {
        tracing::error!(error = %err, "failed to initialize worker pool");
        std::process::exit(1);
    }

    let scheduler = Scheduler::new(
        Arc::clone(&queue_manager),
        Arc::clone(&worker_pool),
        Duration::from_millis(config.poll_interval_ms),
    );
    let scheduler_handle = tokio::spawn(Arc::clone(&scheduler).run());

    let health_monitor = HealthMonitor::new(Arc::clone(&bus), Arc::clone(&queue_manager), Arc::clone(&worker_pool));
    health_monitor.spawn_summary_loop(Duration::from_secs(config.health_log_interval_secs));

    let state = AppState {
        queue_manager: Arc::clone(&queue_manager),
        health_monitor,
    };
    let app = api::router(state);

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, "failed to bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!(port = config.port, "listening");

    let mut coordinator = ShutdownCoordinator::new(Duration::from_secs(config.shutdown_timeout_secs));
    {
        let scheduler = Arc::clone(&scheduler);
        coordinator.register("pause_scheduler", move || {
            let scheduler = Arc::clone(&scheduler);
            async move {
                scheduler.pause();
                scheduler.wait_for_active_executions().await;
            }
        });
    }
    {
        let worker_pool = Arc::clone(&worker_pool);
        coordinator.register("shutdown_worker_pool", move || {
            let worker_pool = Arc::clone(&worker_pool);
            async move {
                worker_pool.shutdown().await;
            }
        });
    }
    let coordinator = Arc::new(coordinator);
    let shutdown_ok = Arc::new(AtomicBool::new(true));

    // Steps 1 and 2 of the mandated teardown order (pause the scheduler and
    // drain the worker pool) run to completion *inside* the future handed to
    // `with_graceful_shutdown`, before it resolves. Only once this future
    // returns does axum stop accepting connections and drain the transport
    // (step 3), so no job already past the in-flight check can be dispatched
    // while the transport is still closing.
    let server = {
        let coordinator = Arc::clone(&coordinator);
        let shutdown_ok = Arc::clone(&shutdown_ok);
        axum::serve(listener, app).with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("shutdown signal received, draining scheduler and worker pool before closing the transport");
            let ok = coordinator.run().await;
            shutdown_ok.store(ok, Ordering::SeqCst);
        })
    };

    if let Err(err) = server.await {
        tracing::error!(error = %err, "http server exited with error");
        if is_unrecoverable(&err) {
            tracing::error!("unrecoverable OS error in accept loop, exiting immediately");
            std::process::exit(1);
        }
    }
    tracing::info!("http transport stopped");

    scheduler.stop();
    scheduler_handle.abort();

    // The transport can also exit without ever receiving a signal (e.g. a
    // recoverable accept-loop error); run the ordered teardown here as a
    // fallback so scheduler/pool shutdown still happens.
    let success = if coordinator.is_shutting_down() {
        shutdown_ok.load(Ordering::SeqCst)
    } else {
        coordinator.run().await
    };
    if !success {
        tracing::error!("shutdown did not complete within the deadline");
        std::process::exit(1);
    }

    std::process::exit(0);
}

/// `ENOSPC`, `EMFILE`, `ENOMEM` bubbling out of the accept loop are
/// treated as unrecoverable: retrying accept() in a tight loop under
/// resource exhaustion just burns CPU without ever succeeding.
fn is_unrecoverable(err: &std::io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::ENOSPC) | Some(libc::EMFILE) | Some(libc::ENOMEM)
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
