use std::collections::HashMap;
use std::path::PathBuf;

use uuid::Uuid;

use crate::audio_codec;
use crate::error::AsrError;
use crate::models::DialogueSegmentWithChunk;

/// Extracts each dialogue segment's span out of its owning chunk's decoded
/// PCM and concatenates them in order into one temp WAV file. The joined
/// file's own duration (not `end_ts - start_ts`) is what downstream ASR
/// quality heuristics treat as the dialogue's audio duration.
pub struct AssembledAudio {
    pub wav_path: PathBuf,
    pub duration_sec: f64,
}

pub async fn assemble(
    segments: &[DialogueSegmentWithChunk],
    chunk_bytes: &HashMap<Uuid, Vec<u8>>,
) -> Result<AssembledAudio, AsrError> {
    if segments.is_empty() {
        return Err(AsrError::Assembly("dialogue has no segments".to_string()));
    }

    let mut joined: Vec<i16> = Vec::new();
    for seg in segments {
        let bytes = chunk_bytes
            .get(&seg.chunk_id)
            .ok_or_else(|| AsrError::Assembly(format!("missing fetched bytes for chunk {}", seg.chunk_id)))?;
        let decoded = audio_codec::decode_to_pcm16_mono_16k(bytes)
            .map_err(|e| AsrError::Assembly(e.to_string()))?;
        let slice = audio_codec::slice_ms(&decoded.samples, decoded.sample_rate, seg.start_ms, seg.end_ms);
        joined.extend_from_slice(&slice);
    }

    let duration_sec = joined.len() as f64 / audio_codec::TARGET_SAMPLE_RATE as f64;

    let tmp = tempfile::Builder::new()
        .prefix("dialogue_")
        .suffix(".wav")
        .tempfile()
        .map_err(|e| AsrError::Assembly(format!("failed to create temp file: {e}")))?;
    let (_, wav_path) = tmp
        .keep()
        .map_err(|e| AsrError::Assembly(format!("failed to persist temp file: {e}")))?;

    audio_codec::write_wav(&wav_path, &joined, audio_codec::TARGET_SAMPLE_RATE)
        .map_err(|e| AsrError::Assembly(e.to_string()))?;

    Ok(AssembledAudio {
        wav_path,
        duration_sec,
    })
}

pub async fn cleanup(assembled: &AssembledAudio) {
    let _ = tokio::fs::remove_file(&assembled.wav_path).await;
}
