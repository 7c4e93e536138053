#![forbid(unsafe_code)]

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use mediahub::{app, config, initialize_state, telemetry};
use opentelemetry::global;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Path given with `--config <path>`, then `CONFIG_PATH`.
fn config_path() -> Option<PathBuf> {
    std::env::args()
        .skip_while(|arg| arg != "--config")
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("CONFIG_PATH").map(PathBuf::from))
}

fn setup_subscriber(endpoint: Option<&str>) {
    let logs = endpoint.and_then(|endpoint| {
        telemetry::setup_logging(endpoint)
            .inspect_err(|err| eprintln!("cannot export logs: {err}"))
            .ok()
    });

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediahub=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(logs)
        .init();

    if let Some(endpoint) = endpoint {
        match telemetry::setup_tracer(endpoint) {
            Ok(provider) => {
                global::set_tracer_provider(provider);
            },
            Err(err) => tracing::warn!(error = %err, "cannot export traces"),
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let endpoint = std::env::var(OTLP_ENDPOINT).ok();
    setup_subscriber(endpoint.as_deref());

    let mut loader = config::Loader::default();
    if let Some(path) = config_path() {
        loader = loader.path(path);
    }
    let config = match loader.read() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            std::process::exit(1);
        },
    };

    let mut state = match initialize_state(Arc::clone(&config)).await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "cannot initialize application state");
            std::process::exit(1);
        },
    };

    match telemetry::setup_metrics_recorder() {
        Ok(handle) => state.metrics = Some(handle),
        Err(err) => tracing::warn!(error = %err, "metrics are disabled"),
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "cannot bind address");
            std::process::exit(1);
        },
    };

    tracing::info!(%addr, name = %config.name, "server listening");

    if let Err(err) = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %err, "server stopped");
    }
}
