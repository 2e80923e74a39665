//! Native fingerprint API.
//!
//! Every route addresses a blob directly by its SHA-1 fingerprint. References
//! taken here are independent of S3 catalog entries.

use crate::body::{body_input, multipart_field_input};
use crate::engine::{BlobRelease, StoredBlob};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use hoard_core::{DEFAULT_CONTENT_TYPE, Fingerprint};
use serde::Serialize;

/// Form field carrying the upload in `multipart/form-data` requests.
const FILE_FIELD: &str = "file";

/// Response for GET /api/exists/{fingerprint}.
#[derive(Debug, Serialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

/// Parse a path fingerprint: 40 hex digits, either case.
fn parse_fingerprint(raw: &str) -> ApiResult<Fingerprint> {
    Fingerprint::from_hex(raw)
        .map_err(|_| ApiError::BadRequest(format!("invalid fingerprint: {raw}")))
}

fn is_form_upload(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("multipart/form-data"))
}

/// POST /api/store
///
/// Accepts either a `multipart/form-data` upload with a `file` field or the
/// raw bytes as the request body.
pub async fn store_blob(State(state): State<AppState>, req: Request) -> ApiResult<Json<StoredBlob>> {
    let input = if is_form_upload(&req) {
        let form = Multipart::from_request(req, &state)
            .await
            .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?;
        multipart_field_input(form, FILE_FIELD)
    } else {
        body_input(req.into_body())
    };

    let stored = state.engine.store_blob(input).await?;
    Ok(Json(stored))
}

/// GET /api/file/{fingerprint}
pub async fn get_blob(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> ApiResult<Response> {
    let fingerprint = parse_fingerprint(&fingerprint)?;
    let blob = state.engine.open_blob(&fingerprint).await?;

    let body_stream = blob
        .stream
        .map(|result| result.map_err(|e| std::io::Error::other(e.to_string())));

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, DEFAULT_CONTENT_TYPE),
            (CONTENT_LENGTH, &blob.size.to_string()),
        ],
        Body::from_stream(body_stream),
    )
        .into_response())
}

/// DELETE /api/file/{fingerprint}
///
/// Releases one native reference. Unknown fingerprints report `deleted: false`.
pub async fn delete_blob(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> ApiResult<Json<BlobRelease>> {
    let fingerprint = parse_fingerprint(&fingerprint)?;
    Ok(Json(state.engine.release_blob(&fingerprint).await?))
}

/// GET /api/exists/{fingerprint}
pub async fn blob_exists(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> ApiResult<Json<ExistsResponse>> {
    let fingerprint = parse_fingerprint(&fingerprint)?;
    let exists = state.engine.blob_exists(&fingerprint).await?;
    Ok(Json(ExistsResponse { exists }))
}
