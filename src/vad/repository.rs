use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::Chunk;

use super::dialogue_builder::ContinuationInput;

/// Claims up to `batch_size` QUEUED chunks, oldest first, skipping rows
/// another worker already holds. Returns them already transitioned to
/// PROCESSING with `processing_started_at` stamped.
pub async fn claim_queued_chunks(pool: &PgPool, batch_size: u32) -> Result<Vec<Chunk>, DbError> {
    let mut tx = pool.begin().await?;
    let rows: Vec<Chunk> = sqlx::query_as(
        r#"
        SELECT chunk_id, device_id, point_id, register_id, start_ts, end_ts,
               duration_sec, codec, sample_rate, channels, file_path,
               file_size_bytes, status, error_message, processing_started_at, created_at
        FROM audio_chunks
        WHERE status = 'QUEUED'
        ORDER BY start_ts ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(batch_size as i64)
    .fetch_all(&mut *tx)
    .await?;

    let ids: Vec<Uuid> = rows.iter().map(|r| r.chunk_id).collect();
    if !ids.is_empty() {
        sqlx::query(
            r#"
            UPDATE audio_chunks
            SET status = 'PROCESSING', processing_started_at = now()
            WHERE chunk_id = ANY($1)
            "#,
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(rows)
}

pub async fn finish_chunk_done(pool: &PgPool, chunk_id: Uuid) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE audio_chunks
        SET status = 'DONE', processing_started_at = NULL, error_message = NULL
        WHERE chunk_id = $1
        "#,
    )
    .bind(chunk_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn finish_chunk_error(pool: &PgPool, chunk_id: Uuid, error: &str) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE audio_chunks
        SET status = 'ERROR', processing_started_at = NULL, error_message = $2
        WHERE chunk_id = $1
        "#,
    )
    .bind(chunk_id)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns chunks stuck PROCESSING longer than `stuck_timeout_sec` to
/// QUEUED. Returns the number of rows requeued.
pub async fn requeue_stuck_chunks(pool: &PgPool, stuck_timeout_sec: f64) -> Result<u64, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE audio_chunks
        SET status = 'QUEUED', processing_started_at = NULL
        WHERE status = 'PROCESSING'
          AND processing_started_at < now() - ($1 * interval '1 second')
        "#,
    )
    .bind(stuck_timeout_sec)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn save_speech_segments(
    tx: &mut Transaction<'_, Postgres>,
    chunk_id: Uuid,
    segments: &[(i64, i64)],
) -> Result<(), DbError> {
    for &(start_ms, end_ms) in segments {
        sqlx::query(
            "INSERT INTO speech_segments (chunk_id, start_ms, end_ms) VALUES ($1, $2, $3)",
        )
        .bind(chunk_id)
        .bind(start_ms)
        .bind(end_ms)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Loads the device's continuation row `FOR UPDATE`, joined to the open
/// dialogue's `start_ts` when one exists. Must be called inside the same
/// transaction that will later persist the stitching result.
pub async fn load_continuation_for_update(
    tx: &mut Transaction<'_, Postgres>,
    device_id: Uuid,
) -> Result<ContinuationInput, DbError> {
    let row: Option<(Option<Uuid>, Option<DateTime<Utc>>)> = sqlx::query_as(
        r#"
        SELECT open_dialogue_id, last_speech_end_ts
        FROM device_dialogue_state
        WHERE device_id = $1
        FOR UPDATE
        "#,
    )
    .bind(device_id)
    .fetch_optional(&mut **tx)
    .await?;

    let (open_dialogue_id, last_speech_end_ts) = row.unwrap_or((None, None));

    let open_dialogue = match open_dialogue_id {
        Some(dialogue_id) => {
            let start_ts: Option<(DateTime<Utc>,)> =
                sqlx::query_as("SELECT start_ts FROM dialogues WHERE dialogue_id = $1")
                    .bind(dialogue_id)
                    .fetch_optional(&mut **tx)
                    .await?;
            start_ts.map(|(ts,)| (dialogue_id, ts))
        }
        None => None,
    };

    Ok(ContinuationInput {
        open_dialogue,
        last_speech_end_ts,
    })
}

pub async fn upsert_continuation(
    tx: &mut Transaction<'_, Postgres>,
    device_id: Uuid,
    open_dialogue_id: Option<Uuid>,
    last_speech_end_ts: Option<DateTime<Utc>>,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO device_dialogue_state (device_id, open_dialogue_id, last_speech_end_ts, updated_at)
        VALUES ($1, $2, $3, now())
        ON CONFLICT (device_id) DO UPDATE SET
            open_dialogue_id = EXCLUDED.open_dialogue_id,
            last_speech_end_ts = EXCLUDED.last_speech_end_ts,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(device_id)
    .bind(open_dialogue_id)
    .bind(last_speech_end_ts)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn create_dialogue(
    tx: &mut Transaction<'_, Postgres>,
    dialogue_id: Uuid,
    device_id: Uuid,
    point_id: Uuid,
    register_id: Uuid,
    start_ts: DateTime<Utc>,
    end_ts: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO dialogues (dialogue_id, device_id, point_id, register_id, start_ts, end_ts, source, asr_state, analysis_state)
        VALUES ($1, $2, $3, $4, $5, $6, 'vad', 'PENDING', 'PENDING')
        "#,
    )
    .bind(dialogue_id)
    .bind(device_id)
    .bind(point_id)
    .bind(register_id)
    .bind(start_ts)
    .bind(end_ts)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_dialogue_end_ts(
    tx: &mut Transaction<'_, Postgres>,
    dialogue_id: Uuid,
    end_ts: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query("UPDATE dialogues SET end_ts = $2 WHERE dialogue_id = $1")
        .bind(dialogue_id)
        .bind(end_ts)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Depth of the QUEUED backlog, logged periodically by the metrics emitter.
pub async fn count_queued_chunks(pool: &PgPool) -> Result<i64, DbError> {
    let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM audio_chunks WHERE status = 'QUEUED'")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn add_dialogue_segment(
    tx: &mut Transaction<'_, Postgres>,
    dialogue_id: Uuid,
    chunk_id: Uuid,
    start_ms: i64,
    end_ms: i64,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO dialogue_segments (dialogue_id, chunk_id, start_ms, end_ms)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(dialogue_id)
    .bind(chunk_id)
    .bind(start_ms)
    .bind(end_ms)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
