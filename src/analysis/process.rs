use crate::config::AnalysisWorkerConfig;
use crate::error::{truncate_error, AnalysisError};
use crate::models::{Dialogue, UpsellAnalysis};

use super::llm_client::UpsellLlmClient;
use super::prefilter;
use super::repository;

const MAX_EVIDENCE_QUOTES: usize = 3;
const MAX_QUOTE_LEN: usize = 100;
const MAX_SUMMARY_LEN: usize = 200;

fn error_message(err: &AnalysisError) -> String {
    match err {
        AnalysisError::Llm(e) => truncate_error(e, 1000),
        AnalysisError::InvalidResponse(msg) => msg.chars().take(1000).collect(),
        AnalysisError::Db(e) => truncate_error(e, 1000),
    }
}

/// Validates and clamps a model response to the bounds the schema is
/// supposed to have already enforced. Models drift from their own schema
/// under load. `quality_score` outside its valid range is a response we
/// cannot trust at all and is rejected rather than coerced; `confidence` is
/// advisory and is clamped instead, matching the schema's own validators.
fn validate_and_clamp(mut analysis: UpsellAnalysis) -> Result<UpsellAnalysis, AnalysisError> {
    if !(0..=3).contains(&analysis.quality_score) {
        return Err(AnalysisError::InvalidResponse(format!(
            "quality_score {} out of range 0..=3",
            analysis.quality_score
        )));
    }

    analysis.evidence_quotes.truncate(MAX_EVIDENCE_QUOTES);
    for quote in &mut analysis.evidence_quotes {
        if quote.len() > MAX_QUOTE_LEN {
            *quote = quote.chars().take(MAX_QUOTE_LEN).collect();
        }
    }
    if analysis.summary.len() > MAX_SUMMARY_LEN {
        analysis.summary = analysis.summary.chars().take(MAX_SUMMARY_LEN).collect();
    }
    analysis.confidence = analysis.confidence.map(|c| c.clamp(0.0, 1.0));
    Ok(analysis)
}

pub async fn process_dialogue(
    pool: &sqlx::PgPool,
    llm: &dyn UpsellLlmClient,
    config: &AnalysisWorkerConfig,
    dialogue: &Dialogue,
) -> Result<(), AnalysisError> {
    let transcript = repository::fetch_transcript(pool, dialogue.dialogue_id)
        .await?
        .ok_or_else(|| AnalysisError::InvalidResponse("no transcript found for dialogue".to_string()))?;

    let duration_sec = (dialogue.end_ts - dialogue.start_ts).num_milliseconds() as f64 / 1000.0;

    if config.prefilter_enabled {
        if let Some(reason) = prefilter::should_skip(
            &transcript.full_text,
            duration_sec,
            config.prefilter_min_text_len,
            config.prefilter_min_duration_sec,
            &config.prefilter_upsell_markers,
        ) {
            repository::finish_analysis_skipped(pool, dialogue.dialogue_id, reason).await?;
            return Ok(());
        }
    }

    let result = llm
        .analyze(&transcript.full_text, duration_sec, dialogue.point_id, dialogue.register_id)
        .await;

    let analysis = match result {
        Ok(a) => a,
        Err(err) => {
            let message = error_message(&err);
            repository::finish_analysis_error(pool, dialogue.dialogue_id, &message).await?;
            return Err(err);
        }
    };

    let analysis = match validate_and_clamp(analysis) {
        Ok(a) => a,
        Err(err) => {
            let message = error_message(&err);
            repository::finish_analysis_error(pool, dialogue.dialogue_id, &message).await?;
            return Err(err);
        }
    };

    repository::save_analysis(pool, dialogue.dialogue_id, &analysis).await?;
    repository::finish_analysis_done(pool, dialogue.dialogue_id, &config.openai_model, &config.prompt_version).await?;

    Ok(())
}
