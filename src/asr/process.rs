use std::collections::HashMap;

use crate::config::AsrWorkerConfig;
use crate::error::AsrError;
use crate::models::Dialogue;

use super::audio_assembler;
use super::audio_fetcher::AudioFetcher;
use super::heuristics::{needs_accurate_pass, TranscriptQuality};
use super::repository;
use super::transcribe::{AsrEngine, AsrPass};

pub async fn process_dialogue(
    pool: &sqlx::PgPool,
    fetcher: &AudioFetcher,
    engine: &dyn AsrEngine,
    config: &AsrWorkerConfig,
    dialogue: &Dialogue,
) -> Result<(), AsrError> {
    let segments = repository::fetch_segments_for_dialogue(pool, dialogue.dialogue_id).await?;

    let mut chunk_bytes = HashMap::new();
    for seg in &segments {
        if !chunk_bytes.contains_key(&seg.chunk_id) {
            let bytes = fetcher.fetch(seg.chunk_id).await?;
            chunk_bytes.insert(seg.chunk_id, bytes);
        }
    }

    let assembled = audio_assembler::assemble(&segments, &chunk_bytes).await?;

    let fast_result = engine.transcribe(&assembled.wav_path, AsrPass::Fast).await;

    let result = match fast_result {
        Ok(fast) => {
            let quality = TranscriptQuality {
                text: &fast.text,
                avg_logprob: fast.avg_logprob,
                no_speech_prob: fast.no_speech_prob,
                audio_duration_sec: assembled.duration_sec,
            };
            if needs_accurate_pass(
                quality,
                config.min_duration_for_accurate,
                config.avg_logprob_threshold,
                config.min_text_length_ratio,
            ) {
                let accurate = engine.transcribe(&assembled.wav_path, AsrPass::Accurate).await;
                match accurate {
                    Ok(accurate) => (accurate, AsrPass::Accurate),
                    Err(_) => (fast, AsrPass::Fast),
                }
            } else {
                (fast, AsrPass::Fast)
            }
        }
        Err(err) => {
            audio_assembler::cleanup(&assembled).await;
            for seg in &segments {
                fetcher.cleanup(seg.chunk_id).await;
            }
            return Err(err);
        }
    };

    let (transcription, pass) = result;

    let segments_json = serde_json::to_value(&transcription.segments)
        .map_err(|e| AsrError::Assembly(format!("failed to serialize segments: {e}")))?;

    repository::save_transcript(
        pool,
        dialogue.dialogue_id,
        &config.language,
        &transcription.text,
        segments_json,
        transcription.avg_logprob,
        transcription.no_speech_prob,
        &transcription.model_name,
    )
    .await?;

    repository::finish_asr_done(pool, dialogue.dialogue_id, &transcription.model_name, pass.as_str()).await?;

    audio_assembler::cleanup(&assembled).await;
    for seg in &segments {
        fetcher.cleanup(seg.chunk_id).await;
    }

    Ok(())
}
