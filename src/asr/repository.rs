use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{Dialogue, DialogueSegmentWithChunk};

pub async fn claim_pending_dialogues(pool: &PgPool, batch_size: u32) -> Result<Vec<Dialogue>, DbError> {
    let mut tx = pool.begin().await?;
    let rows: Vec<Dialogue> = sqlx::query_as(
        r#"
        SELECT dialogue_id, device_id, point_id, register_id, start_ts, end_ts, source,
               asr_state, analysis_state, asr_model, asr_pass, analysis_model,
               analysis_prompt_version, asr_processing_started_at, analysis_processing_started_at,
               asr_error_message, analysis_error_message
        FROM dialogues
        WHERE asr_state = 'PENDING'
        ORDER BY start_ts ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(batch_size as i64)
    .fetch_all(&mut *tx)
    .await?;

    let ids: Vec<Uuid> = rows.iter().map(|r| r.dialogue_id).collect();
    if !ids.is_empty() {
        sqlx::query(
            "UPDATE dialogues SET asr_state = 'PROCESSING', asr_processing_started_at = now() WHERE dialogue_id = ANY($1)",
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(rows)
}

pub async fn fetch_segments_for_dialogue(
    pool: &PgPool,
    dialogue_id: Uuid,
) -> Result<Vec<DialogueSegmentWithChunk>, DbError> {
    let rows = sqlx::query_as(
        r#"
        SELECT ds.dialogue_id, ds.chunk_id, ds.start_ms, ds.end_ms,
               c.start_ts AS chunk_start_ts, c.file_path
        FROM dialogue_segments ds
        JOIN audio_chunks c ON c.chunk_id = ds.chunk_id
        WHERE ds.dialogue_id = $1
        ORDER BY c.start_ts ASC, ds.start_ms ASC
        "#,
    )
    .bind(dialogue_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn save_transcript(
    pool: &PgPool,
    dialogue_id: Uuid,
    language: &str,
    full_text: &str,
    segments_json: serde_json::Value,
    avg_logprob: f32,
    no_speech_prob: f32,
    model_name: &str,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO dialogue_transcripts (dialogue_id, language, full_text, segments_json, avg_logprob, no_speech_prob, model_name)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (dialogue_id) DO UPDATE SET
            language = EXCLUDED.language,
            full_text = EXCLUDED.full_text,
            segments_json = EXCLUDED.segments_json,
            avg_logprob = EXCLUDED.avg_logprob,
            no_speech_prob = EXCLUDED.no_speech_prob,
            model_name = EXCLUDED.model_name
        "#,
    )
    .bind(dialogue_id)
    .bind(language)
    .bind(full_text)
    .bind(segments_json)
    .bind(avg_logprob as f64)
    .bind(no_speech_prob as f64)
    .bind(model_name)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn finish_asr_done(pool: &PgPool, dialogue_id: Uuid, model_name: &str, pass: &str) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE dialogues
        SET asr_state = 'DONE', asr_processing_started_at = NULL, asr_error_message = NULL,
            asr_model = $2, asr_pass = $3
        WHERE dialogue_id = $1
        "#,
    )
    .bind(dialogue_id)
    .bind(model_name)
    .bind(pass)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn finish_asr_error(pool: &PgPool, dialogue_id: Uuid, error: &str) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE dialogues SET asr_state = 'ERROR', asr_processing_started_at = NULL, asr_error_message = $2 WHERE dialogue_id = $1",
    )
    .bind(dialogue_id)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn count_pending_dialogues(pool: &PgPool) -> Result<i64, DbError> {
    let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM dialogues WHERE asr_state = 'PENDING'")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn requeue_stuck_asr(pool: &PgPool, stuck_timeout_sec: f64) -> Result<u64, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE dialogues
        SET asr_state = 'PENDING', asr_processing_started_at = NULL
        WHERE asr_state = 'PROCESSING'
          AND asr_processing_started_at < now() - ($1 * interval '1 second')
        "#,
    )
    .bind(stuck_timeout_sec)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
