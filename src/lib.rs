//! Mediahub is the account and session backend of a media-sharing service.
#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod crypto;
mod database;
pub mod error;
mod router;
pub mod session;
pub mod telemetry;
pub mod token;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
use error::ServerError;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

/// MUST NEVER be used in production.
#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    let config = Arc::new(config::Configuration {
        name: "mediahub".into(),
        port: 8000,
        token: token::test_config(),
        postgres: None,
        argon2: None,
        cookie: config::Cookie::default(),
    });

    let store = user::CredentialStore::new(
        Arc::new(user::MemoryUserRepository::new()),
        Arc::new(crypto::cheap_password_manager()),
    );
    let tokens = token::TokenService::new(
        &config.name,
        &config.token,
        Arc::new(clock::SystemClock),
    )
    .unwrap();

    AppState {
        config,
        sessions: Arc::new(session::SessionManager::new(store.clone(), tokens)),
        store,
        metrics: None,
    }
}

/// MUST NEVER be used in production.
#[cfg(test)]
pub(crate) async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    body: String,
    headers: &[(header::HeaderName, String)],
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    for (name, value) in headers {
        request = request.header(name, value);
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub store: user::CredentialStore,
    pub sessions: Arc<session::SessionManager>,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE, header::SET_COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `GET /metrics` goes to `metrics`.
        .route("/metrics", get(router::status::metrics))
        .nest("/api/v1/users", router::users::router(state.clone()))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state(
    config: Arc<config::Configuration>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let repository: Arc<dyn user::UserRepository> = match config.postgres {
        Some(ref postgres) => {
            let pool = database::connect(postgres).await?;

            // execute migrations scripts on start.
            sqlx::migrate!().run(&pool).await?;

            Arc::new(user::PgUserRepository::new(pool))
        },
        None => {
            tracing::warn!(
                "missing `postgres` entry on `config.yaml` file, users are kept in memory"
            );
            Arc::new(user::MemoryUserRepository::new())
        },
    };

    let pwd = Arc::new(crypto::PasswordManager::new(config.argon2.clone())?);
    let store = user::CredentialStore::new(repository, pwd);

    let tokens = token::TokenService::new(
        &config.name,
        &config.token,
        Arc::new(clock::SystemClock),
    )?;
    let sessions = Arc::new(session::SessionManager::new(store.clone(), tokens));

    Ok(AppState {
        config,
        store,
        sessions,
        metrics: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_status() {
        let response = make_request(
            app(test_state()),
            Method::GET,
            "/status.json",
            String::new(),
            &[],
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["name"], "mediahub");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let response = make_request(
            app(test_state()),
            Method::GET,
            "/metrics",
            String::new(),
            &[],
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let response = make_request(
            app(test_state()),
            Method::GET,
            "/api/v1/users/me",
            String::new(),
            &[],
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_initialize_state_in_memory() {
        let config = Arc::new(config::Configuration {
            name: "mediahub".into(),
            port: 8000,
            token: token::test_config(),
            postgres: None,
            argon2: Some(config::Argon2 {
                memory_cost: 1024,
                iterations: 1,
                parallelism: 1,
                hash_length: 32,
            }),
            cookie: config::Cookie::default(),
        });

        let state = initialize_state(config).await.unwrap();
        assert!(state.metrics.is_none());
        assert_eq!(state.sessions.tokens().lifetime(token::TokenKind::Access), 900);
    }
}
