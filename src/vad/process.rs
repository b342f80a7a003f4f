use std::path::Path;

use chrono::Duration;
use sqlx::PgPool;
use uuid::Uuid;

use crate::audio_codec;
use crate::config::VadWorkerConfig;
use crate::error::VadError;
use crate::models::Chunk;

use super::dialogue_builder::{plan_stitch, DialogueGroup};
use super::framing::{audio_to_frames, frames_to_segments};
use super::repository;
use super::VoiceActivityDetector;

const MIN_SPEECH_MS: u32 = 100;
const MIN_SILENCE_MS: u32 = 300;

/// Reads the chunk's blob, retrying a missing file up to `max_retries`
/// times with exponential backoff (`retry_delay_sec * 2^attempt`) before
/// surfacing `NotFound`. A blob that exists but can't be read for some
/// other reason is not retried.
async fn read_blob_with_retry(blob_path: &Path, chunk_id: Uuid, config: &VadWorkerConfig) -> Result<Vec<u8>, VadError> {
    for attempt in 0..config.max_retries {
        match crate::blob::read_blob(blob_path).await {
            Ok(bytes) => return Ok(bytes),
            Err(crate::error::BlobError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                if attempt + 1 < config.max_retries {
                    let delay = config.retry_delay_sec * 2f64.powi(attempt as i32);
                    tracing::warn!(%chunk_id, attempt = attempt + 1, delay_sec = delay, "blob not found, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs_f64(delay)).await;
                } else {
                    return Err(VadError::Blob(crate::error::BlobError::NotFound(chunk_id)));
                }
            }
            Err(other) => return Err(VadError::Blob(other)),
        }
    }
    Err(VadError::Blob(crate::error::BlobError::NotFound(chunk_id)))
}

/// Runs the full per-chunk pipeline described for the VAD worker: decode,
/// frame, smooth into segments, persist segments, then stitch into
/// dialogues and update the device's continuation — all inside the
/// transaction that also transitions the chunk to DONE.
pub async fn process_chunk(
    pool: &PgPool,
    storage_root: &Path,
    vad: &mut dyn VoiceActivityDetector,
    config: &VadWorkerConfig,
    chunk: &Chunk,
) -> Result<(), VadError> {
    let blob_path = storage_root.join(&chunk.file_path);
    let bytes = read_blob_with_retry(&blob_path, chunk.chunk_id, config).await?;

    let decoded = audio_codec::decode_to_pcm16_mono_16k(&bytes)?;
    let frames = audio_to_frames(&decoded.samples, decoded.sample_rate, config.vad_frame_ms);

    let mut speech_flags = Vec::with_capacity(frames.len());
    for frame in &frames {
        speech_flags.push(vad.is_speech(frame, decoded.sample_rate)?);
    }

    let relative_segments = frames_to_segments(
        &speech_flags,
        config.vad_frame_ms,
        MIN_SPEECH_MS,
        MIN_SILENCE_MS,
    );

    let absolute_segments: Vec<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> =
        relative_segments
            .iter()
            .map(|seg| {
                (
                    chunk.start_ts + Duration::milliseconds(seg.start_ms),
                    chunk.start_ts + Duration::milliseconds(seg.end_ms),
                )
            })
            .collect();

    let mut tx = pool.begin().await?;

    repository::save_speech_segments(
        &mut tx,
        chunk.chunk_id,
        &relative_segments
            .iter()
            .map(|s| (s.start_ms, s.end_ms))
            .collect::<Vec<_>>(),
    )
    .await?;

    let continuation = repository::load_continuation_for_update(&mut tx, chunk.device_id).await?;

    let silence_gap = Duration::milliseconds((config.silence_gap_sec * 1000.0) as i64);
    let max_dialogue = Duration::milliseconds((config.max_dialogue_sec * 1000.0) as i64);

    let plan = plan_stitch(
        &continuation,
        chunk.end_ts,
        &absolute_segments,
        silence_gap,
        max_dialogue,
        Uuid::new_v4,
    );

    for group in &plan.groups {
        match group {
            DialogueGroup::Continue { dialogue_id, new_end_ts, .. } => {
                repository::update_dialogue_end_ts(&mut tx, *dialogue_id, *new_end_ts).await?;
            }
            DialogueGroup::New { dialogue_id, start_ts, end_ts, .. } => {
                repository::create_dialogue(
                    &mut tx,
                    *dialogue_id,
                    chunk.device_id,
                    chunk.point_id,
                    chunk.register_id,
                    *start_ts,
                    *end_ts,
                )
                .await?;
            }
        }
        for (seg_start, seg_end) in group.segments() {
            let start_ms = (*seg_start - chunk.start_ts).num_milliseconds();
            let end_ms = (*seg_end - chunk.start_ts).num_milliseconds();
            repository::add_dialogue_segment(
                &mut tx,
                group.dialogue_id(),
                chunk.chunk_id,
                start_ms,
                end_ms,
            )
            .await?;
        }
    }

    repository::upsert_continuation(
        &mut tx,
        chunk.device_id,
        plan.final_open_dialogue_id,
        plan.final_last_speech_end_ts,
    )
    .await?;

    sqlx::query(
        "UPDATE audio_chunks SET status = 'DONE', processing_started_at = NULL, error_message = NULL WHERE chunk_id = $1",
    )
    .bind(chunk.chunk_id)
    .execute(&mut *tx)
    .await
    .map_err(crate::error::DbError::from)?;

    tx.commit().await.map_err(crate::error::DbError::from)?;

    Ok(())
}
