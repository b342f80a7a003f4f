use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{Dialogue, Transcript, UpsellAnalysis};

pub async fn claim_pending_analysis(pool: &PgPool, batch_size: u32) -> Result<Vec<Dialogue>, DbError> {
    let mut tx = pool.begin().await?;
    let rows: Vec<Dialogue> = sqlx::query_as(
        r#"
        SELECT dialogue_id, device_id, point_id, register_id, start_ts, end_ts, source,
               asr_state, analysis_state, asr_model, asr_pass, analysis_model,
               analysis_prompt_version, asr_processing_started_at, analysis_processing_started_at,
               asr_error_message, analysis_error_message
        FROM dialogues
        WHERE analysis_state = 'PENDING' AND asr_state = 'DONE'
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
            "UPDATE dialogues SET analysis_state = 'PROCESSING', analysis_processing_started_at = now() WHERE dialogue_id = ANY($1)",
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(rows)
}

pub async fn fetch_transcript(pool: &PgPool, dialogue_id: Uuid) -> Result<Option<Transcript>, DbError> {
    let row = sqlx::query_as(
        "SELECT dialogue_id, language, full_text, segments_json, avg_logprob, no_speech_prob, model_name \
         FROM dialogue_transcripts WHERE dialogue_id = $1",
    )
    .bind(dialogue_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn save_analysis(
    pool: &PgPool,
    dialogue_id: Uuid,
    analysis: &UpsellAnalysis,
) -> Result<(), DbError> {
    let categories = serde_json::to_value(&analysis.categories).unwrap_or_else(|_| serde_json::json!([]));
    let evidence_quotes = serde_json::to_value(&analysis.evidence_quotes).unwrap_or_else(|_| serde_json::json!([]));
    let attempted = serde_json::to_value(analysis.attempted)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "uncertain".to_string());
    let customer_reaction = serde_json::to_value(analysis.customer_reaction)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "unclear".to_string());

    sqlx::query(
        r#"
        INSERT INTO dialogue_upsell_analysis
            (dialogue_id, attempted, quality_score, categories, closing_question, customer_reaction, evidence_quotes, summary, confidence)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (dialogue_id) DO UPDATE SET
            attempted = EXCLUDED.attempted,
            quality_score = EXCLUDED.quality_score,
            categories = EXCLUDED.categories,
            closing_question = EXCLUDED.closing_question,
            customer_reaction = EXCLUDED.customer_reaction,
            evidence_quotes = EXCLUDED.evidence_quotes,
            summary = EXCLUDED.summary,
            confidence = EXCLUDED.confidence
        "#,
    )
    .bind(dialogue_id)
    .bind(attempted)
    .bind(analysis.quality_score)
    .bind(categories)
    .bind(analysis.closing_question)
    .bind(customer_reaction)
    .bind(evidence_quotes)
    .bind(&analysis.summary)
    .bind(analysis.confidence)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn finish_analysis_done(pool: &PgPool, dialogue_id: Uuid, model: &str, prompt_version: &str) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE dialogues
        SET analysis_state = 'DONE', analysis_processing_started_at = NULL, analysis_error_message = NULL,
            analysis_model = $2, analysis_prompt_version = $3
        WHERE dialogue_id = $1
        "#,
    )
    .bind(dialogue_id)
    .bind(model)
    .bind(prompt_version)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn finish_analysis_skipped(pool: &PgPool, dialogue_id: Uuid, reason: &str) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE dialogues SET analysis_state = 'SKIPPED', analysis_processing_started_at = NULL, analysis_error_message = $2 WHERE dialogue_id = $1",
    )
    .bind(dialogue_id)
    .bind(reason)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn finish_analysis_error(pool: &PgPool, dialogue_id: Uuid, error: &str) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE dialogues SET analysis_state = 'ERROR', analysis_processing_started_at = NULL, analysis_error_message = $2 WHERE dialogue_id = $1",
    )
    .bind(dialogue_id)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn count_pending_analysis(pool: &PgPool) -> Result<i64, DbError> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT count(*) FROM dialogues WHERE analysis_state = 'PENDING' AND asr_state = 'DONE'",
    )
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub async fn requeue_stuck_analysis(pool: &PgPool, stuck_timeout_sec: f64) -> Result<u64, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE dialogues
        SET analysis_state = 'PENDING', analysis_processing_started_at = NULL
        WHERE analysis_state = 'PROCESSING'
          AND analysis_processing_started_at < now() - ($1 * interval '1 second')
        "#,
    )
    .bind(stuck_timeout_sec)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
