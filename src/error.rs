use thiserror::Error;

/// Errors raised while talking to the durable store.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Errors raised while reading or writing the blob store.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("blob not found for chunk {0}")]
    NotFound(uuid::Uuid),
    #[error("fetch from ingest acceptor failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Errors raised by the VAD + dialogue-stitching stage.
#[derive(Debug, Error)]
pub enum VadError {
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("voice activity detector failed: {0}")]
    Detector(String),
}

/// Errors raised by the ASR stage.
#[derive(Debug, Error)]
pub enum AsrError {
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("transcription failed: {0}")]
    Transcribe(String),
    #[error("audio assembly failed: {0}")]
    Assembly(String),
}

/// Errors raised by the analysis (upsell-evaluator) stage.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("llm request failed: {0}")]
    Llm(#[from] reqwest::Error),
    #[error("llm response did not match the expected schema: {0}")]
    InvalidResponse(String),
}

/// Errors raised by the ingest acceptor's HTTP handlers.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error("unauthorized")]
    Unauthorized,
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("device not found")]
    DeviceNotFound,
    #[error("a device for this point/register already exists")]
    Conflict,
}

/// Top-level error composing every stage's error type. Binaries report this
/// via `anyhow`'s `Display` chain and exit non-zero; library code returns
/// the narrower per-stage error where a caller needs to match on a variant.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Vad(#[from] VadError),
    #[error(transparent)]
    Asr(#[from] AsrError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// Truncates an error's display string to the column width the schema
/// allows for stored error messages.
pub fn truncate_error(err: &(dyn std::error::Error + 'static), max_len: usize) -> String {
    let full = err.to_string();
    if full.len() <= max_len {
        full
    } else {
        full.chars().take(max_len).collect()
    }
}
