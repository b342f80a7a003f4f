use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::error::BlobError;

/// Content-addressed path relative to the storage root, deterministic from
/// metadata alone so a chunk's location never needs a DB round-trip once its
/// id and timestamp are known. This is the exact string persisted in
/// `audio_chunks.file_path`.
pub fn relative_blob_path(
    point_id: Uuid,
    register_id: Uuid,
    start_ts: DateTime<Utc>,
    chunk_id: Uuid,
) -> PathBuf {
    PathBuf::from("audio")
        .join(point_id.to_string())
        .join(register_id.to_string())
        .join(start_ts.format("%Y-%m-%d").to_string())
        .join(start_ts.format("%H").to_string())
        .join(format!(
            "chunk_{}_{}.ogg",
            start_ts.format("%Y%m%d_%H%M%S"),
            chunk_id
        ))
}

pub fn chunk_blob_path(
    root: &Path,
    point_id: Uuid,
    register_id: Uuid,
    start_ts: DateTime<Utc>,
    chunk_id: Uuid,
) -> PathBuf {
    root.join(relative_blob_path(point_id, register_id, start_ts, chunk_id))
}

/// Writes `bytes` to `path` atomically: write to a sibling temp file, fsync,
/// then rename into place. Callers are responsible for removing the temp
/// file (via [`cleanup_temp`]) if anything downstream of the write fails.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BlobError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp_path = tmp_sibling(path);
    fs::write(&tmp_path, bytes).await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

pub fn tmp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.tmp"))
}

/// Best-effort cleanup of an orphaned blob — used both when the temp write
/// fails before rename and when the rename succeeds but the row insert that
/// should follow it does not.
pub async fn cleanup_orphan(path: &Path) {
    let _ = fs::remove_file(path).await;
    let _ = fs::remove_file(tmp_sibling(path)).await;
}

pub async fn read_blob(path: &Path) -> Result<Vec<u8>, BlobError> {
    fs::read(path).await.map_err(BlobError::from)
}

/// Write/read/remove a sentinel file under the storage root — the same
/// probe shape the acceptor's `/health` endpoint reports on.
pub async fn check_storage_writable(root: &Path) -> bool {
    let sentinel = root.join(".write_test");
    if fs::create_dir_all(root).await.is_err() {
        return false;
    }
    if fs::write(&sentinel, b"ok").await.is_err() {
        return false;
    }
    let readable = fs::read(&sentinel).await.is_ok();
    let _ = fs::remove_file(&sentinel).await;
    readable
}
