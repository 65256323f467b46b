// src/store/mod.rs

//! SQLite pool construction and startup schema initialization.
//! Business code assumes the schema exists; nothing below this layer creates
//! tables on the fly.

pub mod migration;

use anyhow::Result;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Connect to SQLite and run the idempotent migrations.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    migration::run_migrations(&pool).await?;

    Ok(pool)
}
