use std::sync::Arc;

use axum::body::Body;
use axum::extract::multipart::Field;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use common::storage::{BlobStore, BoxReader, ContentHash};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use tokio::io::AsyncWriteExt;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::entity::{uploaded_result, user};
use crate::error::AppError;
use crate::state::AppState;
use crate::utils::filename::content_disposition;

/// Orders blob writes against blob releases.
///
/// An upload holds a [`BlobPin`] from just before its bytes land in the store
/// until the row referencing them has committed. Releasing takes the exclusive
/// side for its reference check and delete.
#[derive(Clone, Default)]
pub struct BlobGate(Arc<RwLock<()>>);

/// Shared hold on the [`BlobGate`]. Drop it before releasing blobs in the same task.
pub type BlobPin = OwnedRwLockReadGuard<()>;

impl BlobGate {
    pub async fn pin(&self) -> BlobPin {
        self.0.clone().read_owned().await
    }

    pub async fn exclusive(&self) -> OwnedRwLockWriteGuard<()> {
        self.0.clone().write_owned().await
    }
}

/// A multipart file field after it has been written to the blob store.
pub struct StoredUpload {
    pub hash: ContentHash,
    pub size: i64,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    /// Keeps the blob from being released until the referencing row commits.
    pub pin: BlobPin,
}

/// Stream a multipart field to blob storage via a temp file.
///
/// The gate is pinned only once the client's bytes are spooled, so slow
/// uploads do not hold up releases.
pub async fn stream_field_to_store(
    mut field: Field<'_>,
    blob_store: &dyn BlobStore,
    gate: &BlobGate,
    max_size: u64,
) -> Result<StoredUpload, AppError> {
    let filename = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(str::to_string);
    let temp_path = std::env::temp_dir().join(format!("skillchallenge-upload-{}", Uuid::new_v4()));

    let result = async {
        let mut temp_file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create temp file: {e}")))?;

        let mut total_size: u64 = 0;

        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::Validation(format!("Upload read error: {e}")))?
        {
            total_size += chunk.len() as u64;
            if total_size > max_size {
                return Err(AppError::Validation(format!(
                    "File exceeds maximum size of {max_size} bytes"
                )));
            }
            temp_file
                .write_all(&chunk)
                .await
                .map_err(|e| AppError::Internal(format!("Temp file write failed: {e}")))?;
        }

        if total_size == 0 {
            return Err(AppError::Validation("Uploaded file is empty".into()));
        }

        temp_file
            .flush()
            .await
            .map_err(|e| AppError::Internal(format!("Temp file flush failed: {e}")))?;
        drop(temp_file);

        let file = tokio::fs::File::open(&temp_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to reopen temp file: {e}")))?;
        let reader: BoxReader = Box::new(file);
        let pin = gate.pin().await;
        let hash = blob_store.put_stream(reader).await?;

        Ok((hash, i64::try_from(total_size).unwrap_or(i64::MAX), pin))
    }
    .await;

    // Best effort.
    let _ = tokio::fs::remove_file(&temp_path).await;

    let (hash, size, pin) = result?;
    Ok(StoredUpload {
        hash,
        size,
        filename,
        content_type,
        pin,
    })
}

/// What the blob response should advertise besides the bytes themselves.
pub struct BlobMeta<'a> {
    pub content_hash: &'a str,
    pub content_type: Option<&'a str>,
    pub size: Option<i64>,
    pub filename: Option<&'a str>,
    pub cache_control: &'a str,
}

/// Build a streaming blob response, answering 304 when `If-None-Match` matches.
pub async fn build_blob_response(
    meta: BlobMeta<'_>,
    headers: &HeaderMap,
    blob_store: &dyn BlobStore,
) -> Result<Response, AppError> {
    let hash: ContentHash = meta.content_hash.parse()?;
    let etag_value = hash.etag();
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH)
        && let Ok(val) = if_none_match.to_str()
        && val.split(',').any(|v| v.trim() == etag_value || v.trim() == "*")
    {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag_value)]).into_response());
    }

    let size = match meta.size {
        Some(size) => size as u64,
        None => blob_store.size(&hash).await?,
    };
    let reader = blob_store.get_stream(&hash).await?;
    let body = Body::from_stream(ReaderStream::new(reader));

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            meta.content_type.unwrap_or("application/octet-stream"),
        )
        .header(header::CONTENT_LENGTH, size.to_string())
        .header(header::ETAG, &etag_value)
        .header(header::CACHE_CONTROL, meta.cache_control);
    if let Some(filename) = meta.filename {
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            content_disposition("inline", filename),
        );
    }

    builder
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

/// Delete a blob once no result and no avatar points at it any more.
///
/// Must run after the referencing rows are gone (i.e. after commit) and
/// without holding a [`BlobPin`]. Failures are logged; an orphaned blob only
/// costs disk space.
async fn release_blob_if_unreferenced(state: &AppState, content_hash: &str) {
    let referenced = async {
        let results = uploaded_result::Entity::find()
            .filter(uploaded_result::Column::ContentHash.eq(content_hash))
            .count(&state.db)
            .await?;
        if results > 0 {
            return Ok::<bool, sea_orm::DbErr>(true);
        }
        let avatars = user::Entity::find()
            .filter(user::Column::AvatarHash.eq(content_hash))
            .count(&state.db)
            .await?;
        Ok(avatars > 0)
    }
    .await;

    match referenced {
        Ok(true) => {}
        Ok(false) => {
            let hash: ContentHash = match content_hash.parse() {
                Ok(h) => h,
                Err(e) => {
                    tracing::warn!(content_hash, error = %e, "Stored content hash is malformed");
                    return;
                }
            };
            if let Err(e) = state.blob_store.delete(&hash).await {
                tracing::warn!(content_hash, error = %e, "Failed to delete released blob");
            }
        }
        Err(e) => {
            tracing::warn!(content_hash, error = %e, "Failed to check blob references");
        }
    }
}

/// Release each hash in turn; duplicates are harmless.
pub async fn release_blobs(state: &AppState, hashes: impl IntoIterator<Item = String>) {
    let mut hashes = hashes.into_iter().peekable();
    if hashes.peek().is_none() {
        return;
    }
    let _exclusive = state.blob_gate.exclusive().await;
    for hash in hashes {
        release_blob_if_unreferenced(state, &hash).await;
    }
}
