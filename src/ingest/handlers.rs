use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::blob;
use crate::config::IngestConfig;
use crate::error::{DbError, IngestError};

use super::auth::{hash_token, tokens_match};
use super::repository;

pub struct AppState {
    pub pool: sqlx::PgPool,
    pub config: IngestConfig,
    pub storage_root: std::path::PathBuf,
}

pub type SharedState = Arc<AppState>;

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = match &self {
            IngestError::Unauthorized => StatusCode::UNAUTHORIZED,
            IngestError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            IngestError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            IngestError::DeviceNotFound => StatusCode::NOT_FOUND,
            IngestError::Conflict => StatusCode::CONFLICT,
            IngestError::Db(_) | IngestError::Blob(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "ingest request failed");
        }
        (status, self.to_string()).into_response()
    }
}

/// True if `err` is a Postgres unique-violation (SQLSTATE 23505).
fn is_unique_violation(err: &DbError) -> bool {
    match err {
        DbError::Sqlx(sqlx::Error::Database(db_err)) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn authenticate_device(state: &AppState, headers: &HeaderMap) -> Result<crate::models::Device, IngestError> {
    let token = bearer_token(headers).ok_or(IngestError::Unauthorized)?;
    let hash = hash_token(token);
    let device = repository::find_device_by_token_hash(&state.pool, &hash)
        .await?
        .ok_or(IngestError::Unauthorized)?;
    if !device.is_enabled {
        return Err(IngestError::Unauthorized);
    }
    Ok(device)
}

fn authenticate_admin(state: &AppState, headers: &HeaderMap) -> Result<(), IngestError> {
    let token = bearer_token(headers).ok_or(IngestError::Unauthorized)?;
    if tokens_match(token, &state.config.admin_token) {
        Ok(())
    } else {
        Err(IngestError::Unauthorized)
    }
}

fn authenticate_internal(state: &AppState, headers: &HeaderMap) -> Result<(), IngestError> {
    let token = bearer_token(headers).ok_or(IngestError::Unauthorized)?;
    if tokens_match(token, &state.config.internal_token) {
        Ok(())
    } else {
        Err(IngestError::Unauthorized)
    }
}

#[derive(Serialize)]
pub struct ChunkAcceptedResponse {
    pub status: &'static str,
    pub chunk_id: Uuid,
    pub stored_path: String,
    pub queued: bool,
}

#[derive(Default)]
struct ChunkFields {
    point_id: Option<Uuid>,
    register_id: Option<Uuid>,
    device_id: Option<Uuid>,
    start_ts: Option<DateTime<Utc>>,
    end_ts: Option<DateTime<Utc>>,
    codec: Option<String>,
    sample_rate: Option<i32>,
    channels: Option<i32>,
    file: Option<Bytes>,
}

pub async fn post_chunk(
    State(state): State<SharedState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<ChunkAcceptedResponse>, IngestError> {
    let device = authenticate_device(&state, &headers).await?;

    let mut fields = ChunkFields::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| IngestError::Invalid(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "point_id" => fields.point_id = parse_field(field).await?,
            "register_id" => fields.register_id = parse_field(field).await?,
            "device_id" => fields.device_id = parse_field(field).await?,
            "start_ts" => fields.start_ts = parse_field(field).await?,
            "end_ts" => fields.end_ts = parse_field(field).await?,
            "codec" => fields.codec = parse_field(field).await?,
            "sample_rate" => fields.sample_rate = parse_field(field).await?,
            "channels" => fields.channels = parse_field(field).await?,
            "file" => {
                let bytes = field.bytes().await.map_err(|e| IngestError::Invalid(e.to_string()))?;
                if bytes.len() as u64 > state.config.max_upload_size_bytes {
                    return Err(IngestError::PayloadTooLarge);
                }
                fields.file = Some(bytes);
            }
            _ => {}
        }
    }

    let point_id = fields.point_id.ok_or_else(|| IngestError::Invalid("missing point_id".into()))?;
    let register_id = fields.register_id.ok_or_else(|| IngestError::Invalid("missing register_id".into()))?;
    let claimed_device_id = fields.device_id.ok_or_else(|| IngestError::Invalid("missing device_id".into()))?;
    let start_ts = fields.start_ts.ok_or_else(|| IngestError::Invalid("missing start_ts".into()))?;
    let end_ts = fields.end_ts.ok_or_else(|| IngestError::Invalid("missing end_ts".into()))?;
    let codec = fields.codec.ok_or_else(|| IngestError::Invalid("missing codec".into()))?;
    let sample_rate = fields.sample_rate.ok_or_else(|| IngestError::Invalid("missing sample_rate".into()))?;
    let channels = fields.channels.ok_or_else(|| IngestError::Invalid("missing channels".into()))?;
    let file = fields.file.ok_or_else(|| IngestError::Invalid("missing file part".into()))?;

    if claimed_device_id != device.device_id || point_id != device.point_id || register_id != device.register_id {
        return Err(IngestError::Invalid("device/point/register do not match the authenticated device".into()));
    }
    if end_ts <= start_ts {
        return Err(IngestError::Invalid("end_ts must be after start_ts".into()));
    }
    if file.is_empty() {
        return Err(IngestError::Invalid("file part is empty".into()));
    }

    let chunk_id = Uuid::new_v4();
    let relative_path = blob::relative_blob_path(point_id, register_id, start_ts, chunk_id);
    let full_path = state.storage_root.join(&relative_path);

    blob::write_atomic(&full_path, &file).await?;

    let duration_sec = (end_ts - start_ts).num_seconds() as i32;
    let insert_result = repository::insert_chunk(
        &state.pool,
        chunk_id,
        device.device_id,
        point_id,
        register_id,
        start_ts,
        end_ts,
        duration_sec,
        &codec,
        sample_rate,
        channels,
        &relative_path.to_string_lossy(),
        file.len() as i64,
    )
    .await;

    if let Err(err) = insert_result {
        blob::cleanup_orphan(&full_path).await;
        return Err(err.into());
    }

    let _ = repository::touch_last_seen(&state.pool, device.device_id).await;

    Ok(Json(ChunkAcceptedResponse {
        status: "ok",
        chunk_id,
        stored_path: relative_path.to_string_lossy().to_string(),
        queued: true,
    }))
}

async fn parse_field<T: std::str::FromStr>(field: axum::extract::multipart::Field<'_>) -> Result<Option<T>, IngestError> {
    let text = field.text().await.map_err(|e| IngestError::Invalid(e.to_string()))?;
    text.parse::<T>()
        .map(Some)
        .map_err(|_| IngestError::Invalid(format!("could not parse field value: {text}")))
}

pub async fn get_internal_chunk_file(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(chunk_id): Path<Uuid>,
) -> Result<Response, IngestError> {
    authenticate_internal(&state, &headers)?;

    let relative_path = repository::fetch_chunk_path(&state.pool, chunk_id)
        .await?
        .ok_or(IngestError::DeviceNotFound)?;
    let full_path = state.storage_root.join(&relative_path);
    let bytes = blob::read_blob(&full_path).await?;

    Ok(([(axum::http::header::CONTENT_TYPE, "audio/ogg")], bytes).into_response())
}

#[derive(Deserialize)]
pub struct CreateDeviceRequest {
    pub point_id: Uuid,
    pub register_id: Uuid,
}

#[derive(Serialize)]
pub struct CreateDeviceResponse {
    pub device_id: Uuid,
    pub secret: String,
}

pub async fn create_device(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<CreateDeviceRequest>,
) -> Result<(StatusCode, Json<CreateDeviceResponse>), IngestError> {
    authenticate_admin(&state, &headers)?;

    let device_id = Uuid::new_v4();
    let secret = Uuid::new_v4().to_string();
    let hash = hash_token(&secret);

    repository::create_device(&state.pool, device_id, req.point_id, req.register_id, &hash)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                IngestError::Conflict
            } else {
                IngestError::Db(e)
            }
        })?;

    Ok((StatusCode::CREATED, Json(CreateDeviceResponse { device_id, secret })))
}

#[derive(Serialize)]
pub struct DeviceSummary {
    pub device_id: Uuid,
    pub point_id: Uuid,
    pub register_id: Uuid,
    pub is_enabled: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
}

pub async fn list_devices(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Vec<DeviceSummary>>, IngestError> {
    authenticate_admin(&state, &headers)?;

    let devices = repository::list_devices(&state.pool).await?;
    Ok(Json(
        devices
            .into_iter()
            .map(|d| DeviceSummary {
                device_id: d.device_id,
                point_id: d.point_id,
                register_id: d.register_id,
                is_enabled: d.is_enabled,
                last_seen_at: d.last_seen_at,
            })
            .collect(),
    ))
}

#[derive(Deserialize)]
pub struct UpdateDeviceRequest {
    pub enabled: Option<bool>,
}

pub async fn patch_device(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(device_id): Path<Uuid>,
    Json(req): Json<UpdateDeviceRequest>,
) -> Result<StatusCode, IngestError> {
    authenticate_admin(&state, &headers)?;

    if let Some(enabled) = req.enabled {
        let found = repository::set_device_enabled(&state.pool, device_id, enabled).await?;
        if !found {
            return Err(IngestError::DeviceNotFound);
        }
    }
    Ok(StatusCode::OK)
}

pub async fn health(State(state): State<SharedState>) -> Response {
    let db_ok = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();
    let storage_ok = blob::check_storage_writable(&state.storage_root).await;

    if !db_ok || !storage_ok {
        warn!(db = db_ok, storage_writable = storage_ok, "health check degraded");
    }

    let status = if db_ok && storage_ok { "ok" } else { "degraded" };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": status,
            "db": db_ok,
            "storage_writable": storage_ok,
            "time": Utc::now(),
        })),
    )
        .into_response()
}
