use std::{str::FromStr, time::Duration};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::LedgerError;

pub mod audit;
pub mod schema;
pub mod stores;
pub mod substations;
pub mod technical;

#[derive(Debug, Clone)]
pub struct DbOptions {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

/// Open a pool against an on-disk ledger. The schema is not applied here; see
/// [`schema::create_schema`].
pub async fn connect(opts: &DbOptions) -> Result<SqlitePool, LedgerError> {
    let connect = SqliteConnectOptions::from_str(&opts.url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(opts.busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(opts.max_connections)
        .connect_with(connect)
        .await?;

    tracing::info!(url = %opts.url, max_connections = opts.max_connections, "ledger database connected");
    Ok(pool)
}

/// Ephemeral ledger with the schema already applied.
///
/// An in-memory SQLite database lives only as long as its connection, so the
/// pool is pinned to a single connection that is never recycled.
pub async fn in_memory() -> Result<SqlitePool, LedgerError> {
    let connect = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(connect)
        .await?;

    schema::create_schema(&pool).await?;
    Ok(pool)
}
