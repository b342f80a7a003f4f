use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

use crate::error::BlobError;

/// Fetches chunk audio bytes from the ingest acceptor's internal endpoint,
/// caching them under `cache_dir/chunks/{chunk_id}.ogg` so a dialogue that
/// references the same chunk multiple times only fetches it once. Retries
/// a bounded number of times on transient failure before surfacing an
/// error (the only retry class named for this stage).
pub struct AudioFetcher {
    client: Client,
    base_url: String,
    internal_token: String,
    cache_dir: PathBuf,
    max_retries: u32,
    retry_base: Duration,
}

impl AudioFetcher {
    pub fn new(base_url: impl Into<String>, internal_token: impl Into<String>, cache_dir: impl Into<PathBuf>, timeout_sec: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_sec))
                .build()
                .expect("reqwest client builds"),
            base_url: base_url.into(),
            internal_token: internal_token.into(),
            cache_dir: cache_dir.into(),
            max_retries: 3,
            retry_base: Duration::from_secs(2),
        }
    }

    fn cache_path(&self, chunk_id: Uuid) -> PathBuf {
        self.cache_dir.join("chunks").join(format!("{chunk_id}.ogg"))
    }

    pub async fn fetch(&self, chunk_id: Uuid) -> Result<Vec<u8>, BlobError> {
        let cache_path = self.cache_path(chunk_id);
        if let Ok(bytes) = fs::read(&cache_path).await {
            return Ok(bytes);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch_remote(chunk_id).await {
                Ok(bytes) => {
                    if let Some(parent) = cache_path.parent() {
                        let _ = fs::create_dir_all(parent).await;
                    }
                    let _ = fs::write(&cache_path, &bytes).await;
                    return Ok(bytes);
                }
                Err(err) if attempt < self.max_retries => {
                    warn!(%chunk_id, attempt, error = %err, "chunk fetch failed, retrying");
                    tokio::time::sleep(self.retry_base * attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_remote(&self, chunk_id: Uuid) -> Result<Vec<u8>, BlobError> {
        let url = format!("{}/api/v1/internal/chunks/{chunk_id}/file", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.internal_token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound(chunk_id));
        }
        if !response.status().is_success() {
            return Err(BlobError::Decode(format!(
                "internal fetch returned {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn cleanup(&self, chunk_id: Uuid) {
        let _ = fs::remove_file(self.cache_path(chunk_id)).await;
    }
}

pub fn default_cache_dir(storage_root: &Path) -> PathBuf {
    storage_root.join("asr_cache")
}
