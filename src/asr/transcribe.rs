use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AsrError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsrPass {
    Fast,
    Accurate,
}

impl AsrPass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AsrPass::Fast => "fast",
            AsrPass::Accurate => "accurate",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_ms: i64,
    pub end_ms: i64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    pub avg_logprob: f32,
    pub no_speech_prob: f32,
    pub model_name: String,
}

/// The out-of-scope external collaborator: an ASR engine that turns a mono
/// 16kHz WAV file into text plus the quality signals the heuristic in
/// [`super::heuristics`] inspects.
#[async_trait]
pub trait AsrEngine: Send + Sync {
    async fn transcribe(&self, wav_path: &std::path::Path, pass: AsrPass) -> Result<TranscriptionResult, AsrError>;
}

/// whisper.cpp-backed implementation (via `whisper-rs`), the same engine
/// family the meeting-assistant codebase this was built from already
/// depended on. Loads the fast/accurate models lazily and keeps them
/// resident for the life of the worker process.
pub struct WhisperAsrEngine {
    fast_model_path: std::path::PathBuf,
    accurate_model_path: std::path::PathBuf,
    language: String,
    beam_size: u32,
    fast_ctx: parking_lot::Mutex<Option<std::sync::Arc<whisper_rs::WhisperContext>>>,
    accurate_ctx: parking_lot::Mutex<Option<std::sync::Arc<whisper_rs::WhisperContext>>>,
}

impl WhisperAsrEngine {
    pub fn new(
        fast_model_path: impl Into<std::path::PathBuf>,
        accurate_model_path: impl Into<std::path::PathBuf>,
        language: impl Into<String>,
        beam_size: u32,
    ) -> Self {
        Self {
            fast_model_path: fast_model_path.into(),
            accurate_model_path: accurate_model_path.into(),
            language: language.into(),
            beam_size,
            fast_ctx: parking_lot::Mutex::new(None),
            accurate_ctx: parking_lot::Mutex::new(None),
        }
    }

    fn context_for(&self, pass: AsrPass) -> Result<std::sync::Arc<whisper_rs::WhisperContext>, AsrError> {
        let (slot, path) = match pass {
            AsrPass::Fast => (&self.fast_ctx, &self.fast_model_path),
            AsrPass::Accurate => (&self.accurate_ctx, &self.accurate_model_path),
        };
        let mut guard = slot.lock();
        if let Some(ctx) = guard.as_ref() {
            return Ok(ctx.clone());
        }
        let ctx = whisper_rs::WhisperContext::new_with_params(
            path.to_str().ok_or_else(|| AsrError::Transcribe("invalid model path".into()))?,
            whisper_rs::WhisperContextParameters::default(),
        )
        .map_err(|e| AsrError::Transcribe(format!("failed to load whisper model: {e}")))?;
        let ctx = std::sync::Arc::new(ctx);
        *guard = Some(ctx.clone());
        Ok(ctx)
    }
}

#[async_trait]
impl AsrEngine for WhisperAsrEngine {
    async fn transcribe(&self, wav_path: &std::path::Path, pass: AsrPass) -> Result<TranscriptionResult, AsrError> {
        let ctx = self.context_for(pass)?;
        let wav_path = wav_path.to_path_buf();
        let language = self.language.clone();
        let beam_size = self.beam_size;
        let model_name = match pass {
            AsrPass::Fast => "whisper-fast",
            AsrPass::Accurate => "whisper-accurate",
        }
        .to_string();

        tokio::task::spawn_blocking(move || -> Result<TranscriptionResult, AsrError> {
            let reader = hound::WavReader::open(&wav_path)
                .map_err(|e| AsrError::Assembly(format!("failed to read wav: {e}")))?;
            let samples: Vec<f32> = reader
                .into_samples::<i16>()
                .filter_map(|s| s.ok())
                .map(|s| s as f32 / i16::MAX as f32)
                .collect();

            let mut state = ctx
                .create_state()
                .map_err(|e| AsrError::Transcribe(format!("failed to create whisper state: {e}")))?;

            let mut params =
                whisper_rs::FullParams::new(whisper_rs::SamplingStrategy::BeamSearch {
                    beam_size: beam_size as i32,
                    patience: -1.0,
                });
            params.set_language(Some(&language));
            params.set_print_progress(false);
            params.set_print_special(false);
            params.set_print_realtime(false);

            state
                .full(params, &samples)
                .map_err(|e| AsrError::Transcribe(format!("whisper inference failed: {e}")))?;

            let num_segments = state
                .full_n_segments()
                .map_err(|e| AsrError::Transcribe(format!("{e}")))?;

            let mut text = String::new();
            let mut segments = Vec::new();
            let mut logprob_sum = 0.0f32;
            let mut no_speech_sum = 0.0f32;

            for i in 0..num_segments {
                let seg_text = state
                    .full_get_segment_text(i)
                    .map_err(|e| AsrError::Transcribe(format!("{e}")))?;
                let t0 = state.full_get_segment_t0(i).unwrap_or(0);
                let t1 = state.full_get_segment_t1(i).unwrap_or(0);
                text.push_str(&seg_text);

                let n_tokens = state.full_n_tokens(i).unwrap_or(0);
                let mut seg_logprob_sum = 0.0f32;
                for t in 0..n_tokens {
                    if let Ok(prob) = state.full_get_token_prob(i, t) {
                        seg_logprob_sum += prob.ln();
                    }
                }
                let seg_avg_logprob = if n_tokens > 0 {
                    seg_logprob_sum / n_tokens as f32
                } else {
                    0.0
                };
                logprob_sum += seg_avg_logprob;
                no_speech_sum += state.full_get_segment_no_speech_prob(i).unwrap_or(0.0);

                segments.push(TranscriptSegment {
                    start_ms: t0 * 10,
                    end_ms: t1 * 10,
                    text: seg_text,
                });
            }

            let denom = num_segments.max(1) as f32;
            Ok(TranscriptionResult {
                text: text.trim().to_string(),
                segments,
                avg_logprob: logprob_sum / denom,
                no_speech_prob: no_speech_sum / denom,
                model_name,
            })
        })
        .await
        .map_err(|e| AsrError::Transcribe(format!("worker task panicked: {e}")))?
    }
}
