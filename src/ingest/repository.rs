use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::Device;

pub async fn find_device_by_token_hash(pool: &PgPool, token_hash: &str) -> Result<Option<Device>, DbError> {
    let device = sqlx::query_as(
        "SELECT device_id, point_id, register_id, token_hash, is_enabled, created_at, last_seen_at \
         FROM devices WHERE token_hash = $1",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;
    Ok(device)
}

pub async fn touch_last_seen(pool: &PgPool, device_id: Uuid) -> Result<(), DbError> {
    sqlx::query("UPDATE devices SET last_seen_at = now() WHERE device_id = $1")
        .bind(device_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_chunk(
    pool: &PgPool,
    chunk_id: Uuid,
    device_id: Uuid,
    point_id: Uuid,
    register_id: Uuid,
    start_ts: DateTime<Utc>,
    end_ts: DateTime<Utc>,
    duration_sec: i32,
    codec: &str,
    sample_rate: i32,
    channels: i32,
    file_path: &str,
    file_size_bytes: i64,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO audio_chunks
            (chunk_id, device_id, point_id, register_id, start_ts, end_ts, duration_sec,
             codec, sample_rate, channels, file_path, file_size_bytes, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'QUEUED')
        "#,
    )
    .bind(chunk_id)
    .bind(device_id)
    .bind(point_id)
    .bind(register_id)
    .bind(start_ts)
    .bind(end_ts)
    .bind(duration_sec)
    .bind(codec)
    .bind(sample_rate)
    .bind(channels)
    .bind(file_path)
    .bind(file_size_bytes)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_chunk_path(pool: &PgPool, chunk_id: Uuid) -> Result<Option<String>, DbError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT file_path FROM audio_chunks WHERE chunk_id = $1")
        .bind(chunk_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(p,)| p))
}

pub async fn create_device(
    pool: &PgPool,
    device_id: Uuid,
    point_id: Uuid,
    register_id: Uuid,
    token_hash: &str,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO devices (device_id, point_id, register_id, token_hash, is_enabled) VALUES ($1, $2, $3, $4, true)",
    )
    .bind(device_id)
    .bind(point_id)
    .bind(register_id)
    .bind(token_hash)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_devices(pool: &PgPool) -> Result<Vec<Device>, DbError> {
    let rows = sqlx::query_as(
        "SELECT device_id, point_id, register_id, token_hash, is_enabled, created_at, last_seen_at \
         FROM devices ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn set_device_enabled(pool: &PgPool, device_id: Uuid, enabled: bool) -> Result<bool, DbError> {
    let result = sqlx::query("UPDATE devices SET is_enabled = $2 WHERE device_id = $1")
        .bind(device_id)
        .bind(enabled)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
