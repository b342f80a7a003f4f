use std::env;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_or_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn clamp<T: PartialOrd>(value: T, lo: T, hi: T) -> T {
    if value < lo {
        lo
    } else if value > hi {
        hi
    } else {
        value
    }
}

/// Fields every binary needs: where the durable store and blob store live,
/// and how loud to log. Loaded once at process startup and never mutated.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    pub database_url: String,
    pub audio_storage_dir: String,
    pub log_level: String,
}

impl SharedConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable not found"))?,
            audio_storage_dir: env_or_string("AUDIO_STORAGE_DIR", "./audio_storage"),
            log_level: env_or_string("LOG_LEVEL", "info"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub shared: SharedConfig,
    pub admin_token: String,
    pub internal_token: String,
    pub max_upload_size_bytes: u64,
    pub host: String,
    pub port: u16,
    pub cors_enabled: bool,
}

impl IngestConfig {
    pub fn load() -> anyhow::Result<Self> {
        let shared = SharedConfig::load()?;
        Ok(Self {
            admin_token: env::var("ADMIN_TOKEN")
                .map_err(|_| anyhow::anyhow!("ADMIN_TOKEN environment variable not found"))?,
            internal_token: env::var("INTERNAL_TOKEN")
                .map_err(|_| anyhow::anyhow!("INTERNAL_TOKEN environment variable not found"))?,
            max_upload_size_bytes: env_or("MAX_UPLOAD_SIZE_BYTES", 10 * 1024 * 1024u64),
            host: env_or_string("IA_HOST", "0.0.0.0"),
            port: env_or("IA_PORT", 8080u16),
            cors_enabled: env_or("CORS_ENABLED", false),
            shared,
        })
    }
}

#[derive(Debug, Clone)]
pub struct VadWorkerConfig {
    pub shared: SharedConfig,
    pub vad_aggressiveness: u8,
    pub vad_frame_ms: u32,
    pub silence_gap_sec: f64,
    pub max_dialogue_sec: f64,
    pub max_retries: u32,
    pub retry_delay_sec: f64,
    pub stuck_timeout_sec: f64,
    pub recovery_interval_sec: f64,
    pub poll_interval_sec: f64,
    pub batch_size: u32,
}

impl VadWorkerConfig {
    pub fn load() -> anyhow::Result<Self> {
        let shared = SharedConfig::load()?;
        Ok(Self {
            vad_aggressiveness: clamp(env_or("VAD_AGGRESSIVENESS", 2u8), 0, 3),
            vad_frame_ms: env_or("VAD_FRAME_MS", 30u32),
            silence_gap_sec: env_or("SILENCE_GAP_SEC", 12.0f64),
            max_dialogue_sec: env_or("MAX_DIALOGUE_SEC", 120.0f64),
            max_retries: env_or("MAX_RETRIES", 3u32),
            retry_delay_sec: env_or("RETRY_DELAY_SEC", 2.0f64),
            stuck_timeout_sec: env_or("STUCK_TIMEOUT_SEC", 600.0f64),
            recovery_interval_sec: env_or("RECOVERY_INTERVAL_SEC", 60.0f64),
            poll_interval_sec: clamp(env_or("POLL_INTERVAL_SEC", 5.0f64), 1.0, 300.0),
            batch_size: clamp(env_or("BATCH_SIZE", 10u32), 1, 50),
            shared,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AsrWorkerConfig {
    pub shared: SharedConfig,
    pub ingest_internal_base_url: String,
    pub internal_token: String,
    pub whisper_model_fast: String,
    pub whisper_model_accurate: String,
    pub beam_size: u32,
    pub language: String,
    pub avg_logprob_threshold: f32,
    pub min_text_length_ratio: f32,
    pub min_duration_for_accurate: f64,
    pub asr_stuck_timeout_sec: f64,
    pub recovery_interval_sec: f64,
    pub poll_interval_sec: f64,
    pub batch_size: u32,
    pub http_timeout_sec: u64,
}

impl AsrWorkerConfig {
    pub fn load() -> anyhow::Result<Self> {
        let shared = SharedConfig::load()?;
        Ok(Self {
            ingest_internal_base_url: env::var("INGEST_INTERNAL_BASE_URL").map_err(|_| {
                anyhow::anyhow!("INGEST_INTERNAL_BASE_URL environment variable not found")
            })?,
            internal_token: env::var("INTERNAL_TOKEN")
                .map_err(|_| anyhow::anyhow!("INTERNAL_TOKEN environment variable not found"))?,
            whisper_model_fast: env_or_string("WHISPER_MODEL_FAST", "base.en"),
            whisper_model_accurate: env_or_string("WHISPER_MODEL_ACCURATE", "small.en"),
            beam_size: env_or("BEAM_SIZE", 5u32),
            language: env_or_string("LANGUAGE", "en"),
            avg_logprob_threshold: env_or("AVG_LOGPROB_THRESHOLD", -0.7f32),
            min_text_length_ratio: env_or("MIN_TEXT_LENGTH_RATIO", 0.5f32),
            min_duration_for_accurate: env_or("MIN_DURATION_FOR_ACCURATE", 15.0f64),
            asr_stuck_timeout_sec: env_or("ASR_STUCK_TIMEOUT_SEC", 600.0f64),
            recovery_interval_sec: env_or("RECOVERY_INTERVAL_SEC", 60.0f64),
            poll_interval_sec: clamp(env_or("POLL_INTERVAL_SEC", 5.0f64), 1.0, 300.0),
            batch_size: clamp(env_or("BATCH_SIZE", 5u32), 1, 50),
            http_timeout_sec: env_or("HTTP_TIMEOUT_SEC", 60u64),
            shared,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisWorkerConfig {
    pub shared: SharedConfig,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_timeout_sec: u64,
    pub openai_max_retries: u32,
    pub prompt_version: String,
    pub prefilter_enabled: bool,
    pub prefilter_min_text_len: usize,
    pub prefilter_min_duration_sec: f64,
    pub prefilter_upsell_markers: Vec<String>,
    pub analysis_stuck_timeout_sec: f64,
    pub recovery_interval_sec: f64,
    pub poll_interval_sec: f64,
    pub batch_size: u32,
}

impl AnalysisWorkerConfig {
    pub fn load() -> anyhow::Result<Self> {
        let shared = SharedConfig::load()?;
        let markers = env_or_string(
            "PREFILTER_UPSELL_MARKERS",
            "coffee,dessert,pastry,combo,size,syrup,anything else,would you like",
        );
        Ok(Self {
            openai_api_key: env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not found"))?,
            openai_model: env_or_string("OPENAI_MODEL", "gpt-4o-mini"),
            openai_timeout_sec: env_or("OPENAI_TIMEOUT_SEC", 60u64),
            openai_max_retries: env_or("OPENAI_MAX_RETRIES", 3u32),
            prompt_version: env_or_string("PROMPT_VERSION", "v1"),
            prefilter_enabled: env_or("PREFILTER_ENABLED", true),
            prefilter_min_text_len: env_or("PREFILTER_MIN_TEXT_LEN", 10usize),
            prefilter_min_duration_sec: env_or("PREFILTER_MIN_DURATION_SEC", 6.0f64),
            prefilter_upsell_markers: markers
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            analysis_stuck_timeout_sec: env_or("ANALYSIS_STUCK_TIMEOUT_SEC", 600.0f64),
            recovery_interval_sec: env_or("RECOVERY_INTERVAL_SEC", 60.0f64),
            poll_interval_sec: clamp(env_or("POLL_INTERVAL_SEC", 5.0f64), 1.0, 300.0),
            batch_size: clamp(env_or("BATCH_SIZE", 10u32), 1, 50),
            shared,
        })
    }
}
