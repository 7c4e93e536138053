//! PostgreSQL connection pool.
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use crate::config::Postgres;

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "mediahub";
pub const DEFAULT_POOL_SIZE: u32 = 10;
const DEFAULT_PORT: u16 = 5432;

/// Build connect options from the `postgres` section.
fn connect_options(config: &Postgres) -> PgConnectOptions {
    let (host, port) = match config.address.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().unwrap_or(DEFAULT_PORT)),
        None => (config.address.as_str(), DEFAULT_PORT),
    };

    PgConnectOptions::new()
        .host(host)
        .port(port)
        .username(config.username.as_deref().unwrap_or(DEFAULT_CREDENTIALS))
        .password(config.password.as_deref().unwrap_or(DEFAULT_CREDENTIALS))
        .database(config.database.as_deref().unwrap_or(DEFAULT_DATABASE_NAME))
}

/// Init database connections.
pub async fn connect(config: &Postgres) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size.unwrap_or(DEFAULT_POOL_SIZE))
        .connect_with(connect_options(config))
        .await?;

    tracing::info!(hostname = %config.address, "postgres connected");

    Ok(pool)
}
