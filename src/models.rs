use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum ChunkState {
    Queued,
    Processing,
    Done,
    Error,
}

impl ChunkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkState::Queued => "QUEUED",
            ChunkState::Processing => "PROCESSING",
            ChunkState::Done => "DONE",
            ChunkState::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum AsrState {
    Pending,
    Processing,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum AnalysisState {
    Pending,
    Processing,
    Done,
    Skipped,
    Error,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Device {
    pub device_id: Uuid,
    pub point_id: Uuid,
    pub register_id: Uuid,
    pub token_hash: String,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Chunk {
    pub chunk_id: Uuid,
    pub device_id: Uuid,
    pub point_id: Uuid,
    pub register_id: Uuid,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub duration_sec: i32,
    pub codec: String,
    pub sample_rate: i32,
    pub channels: i32,
    pub file_path: String,
    pub file_size_bytes: i64,
    pub status: String,
    pub error_message: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A raw speech span detected inside one chunk, in ms offsets from the
/// chunk's own start.
#[derive(Debug, Clone, Copy)]
pub struct SpeechSegment {
    pub start_ms: i64,
    pub end_ms: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Dialogue {
    pub dialogue_id: Uuid,
    pub device_id: Uuid,
    pub point_id: Uuid,
    pub register_id: Uuid,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub source: String,
    pub asr_state: String,
    pub analysis_state: String,
    pub asr_model: Option<String>,
    pub asr_pass: Option<String>,
    pub analysis_model: Option<String>,
    pub analysis_prompt_version: Option<String>,
    pub asr_processing_started_at: Option<DateTime<Utc>>,
    pub analysis_processing_started_at: Option<DateTime<Utc>>,
    pub asr_error_message: Option<String>,
    pub analysis_error_message: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DialogueSegmentRow {
    pub dialogue_id: Uuid,
    pub chunk_id: Uuid,
    pub start_ms: i64,
    pub end_ms: i64,
}

/// A dialogue segment joined to its owning chunk's file metadata, as fetched
/// by the ASR worker's assembly step.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DialogueSegmentWithChunk {
    pub dialogue_id: Uuid,
    pub chunk_id: Uuid,
    pub start_ms: i64,
    pub end_ms: i64,
    pub chunk_start_ts: DateTime<Utc>,
    pub file_path: String,
}

#[derive(Debug, Clone)]
pub struct DeviceContinuation {
    pub device_id: Uuid,
    pub open_dialogue_id: Option<Uuid>,
    pub last_speech_end_ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Transcript {
    pub dialogue_id: Uuid,
    pub language: String,
    pub full_text: String,
    pub segments_json: serde_json::Value,
    pub avg_logprob: Option<f64>,
    pub no_speech_prob: Option<f64>,
    pub model_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attempted {
    Yes,
    No,
    Uncertain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerReaction {
    Accepted,
    Rejected,
    Unclear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsellCategory {
    CoffeeSize,
    Dessert,
    Pastry,
    AddOns,
    Syrup,
    Combo,
    Takeaway,
    Other,
}

impl UpsellCategory {
    pub const ALL: [UpsellCategory; 8] = [
        UpsellCategory::CoffeeSize,
        UpsellCategory::Dessert,
        UpsellCategory::Pastry,
        UpsellCategory::AddOns,
        UpsellCategory::Syrup,
        UpsellCategory::Combo,
        UpsellCategory::Takeaway,
        UpsellCategory::Other,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsellAnalysis {
    pub attempted: Attempted,
    pub quality_score: i32,
    pub categories: Vec<UpsellCategory>,
    pub closing_question: bool,
    pub customer_reaction: CustomerReaction,
    pub evidence_quotes: Vec<String>,
    pub summary: String,
    pub confidence: Option<f64>,
}
