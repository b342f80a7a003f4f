use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::config::AnalysisWorkerConfig;
use crate::error::AnalysisError;
use crate::models::UpsellAnalysis;

use super::prompt::{schema_embedded_json_mode_prompt, upsell_analysis_schema, user_prompt, SYSTEM_PROMPT};

/// Error substrings that indicate the model/provider rejected the
/// schema-constrained call rather than some transient failure. Seeing one of
/// these is what triggers the JSON-mode fallback, not a blanket retry.
const SCHEMA_UNSUPPORTED_MARKERS: [&str; 3] = ["json_schema", "structured", "format"];

#[async_trait]
pub trait UpsellLlmClient: Send + Sync {
    async fn analyze(
        &self,
        transcript: &str,
        duration_sec: f64,
        point_id: Uuid,
        register_id: Uuid,
    ) -> Result<UpsellAnalysis, AnalysisError>;
}

pub struct OpenAiUpsellClient {
    client: Client,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl OpenAiUpsellClient {
    pub fn new(config: &AnalysisWorkerConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.openai_timeout_sec))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
            max_retries: config.openai_max_retries,
        }
    }

    async fn post_chat(&self, body: &Value) -> Result<Value, AnalysisError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let response = self
                .client
                .post("https://api.openai.com/v1/chat/completions")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    return resp.json::<Value>().await.map_err(AnalysisError::Llm);
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.as_u16() == 429 && attempt < self.max_retries {
                        let backoff = Duration::from_secs(2u64.pow(attempt).min(30));
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(AnalysisError::InvalidResponse(format!(
                        "openai returned {status}: {text}"
                    )));
                }
                Err(err) if err.is_connect() || err.is_timeout() => {
                    if attempt < self.max_retries {
                        let backoff = Duration::from_secs(2u64.pow(attempt).min(30));
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(AnalysisError::Llm(err));
                }
                Err(err) => return Err(AnalysisError::Llm(err)),
            }
        }
    }

    fn schema_request(&self, transcript: &str, duration_sec: f64, point_id: Uuid, register_id: Uuid) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt(transcript, duration_sec, point_id, register_id)}
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "upsell_analysis",
                    "strict": true,
                    "schema": upsell_analysis_schema()
                }
            },
            "temperature": 0.0
        })
    }

    fn json_mode_request(&self, transcript: &str, duration_sec: f64, point_id: Uuid, register_id: Uuid) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": schema_embedded_json_mode_prompt(transcript, duration_sec, point_id, register_id)}
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0.0
        })
    }

    fn extract_content(response: &Value) -> Result<&str, AnalysisError> {
        response
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| AnalysisError::InvalidResponse("response had no message content".to_string()))
    }
}

#[async_trait]
impl UpsellLlmClient for OpenAiUpsellClient {
    async fn analyze(
        &self,
        transcript: &str,
        duration_sec: f64,
        point_id: Uuid,
        register_id: Uuid,
    ) -> Result<UpsellAnalysis, AnalysisError> {
        let schema_body = self.schema_request(transcript, duration_sec, point_id, register_id);
        let primary = self.post_chat(&schema_body).await;

        let content = match primary {
            Ok(response) => Self::extract_content(&response)?.to_string(),
            Err(AnalysisError::InvalidResponse(msg))
                if SCHEMA_UNSUPPORTED_MARKERS.iter().any(|m| msg.to_lowercase().contains(m)) =>
            {
                let fallback_body = self.json_mode_request(transcript, duration_sec, point_id, register_id);
                let response = self.post_chat(&fallback_body).await?;
                Self::extract_content(&response)?.to_string()
            }
            Err(other) => return Err(other),
        };

        serde_json::from_str::<UpsellAnalysis>(&content)
            .map_err(|e| AnalysisError::InvalidResponse(format!("could not parse model output as the expected shape: {e}")))
    }
}
