// src/reservation/sweep.rs

//! Deactivates reservations past their expiry. Expiry already encodes the
//! staleness window, so the sweep never touches a row a live commit could
//! still be guarding.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::CoreError;

pub async fn sweep_expired(pool: &SqlitePool) -> Result<u64, CoreError> {
    let result = sqlx::query("UPDATE reservations SET active = 0 WHERE active = 1 AND expires_at <= ?")
        .bind(Utc::now())
        .execute(pool)
        .await?;

    let swept = result.rows_affected();
    if swept > 0 {
        info!(swept, "expired reservations released");
    }
    Ok(swept)
}
