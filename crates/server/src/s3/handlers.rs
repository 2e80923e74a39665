//! S3 API request handlers.
//!
//! Query parameters decide the operation behind a method and path: a PUT on
//! an object is `PutObject` or `UploadPart`, a POST is
//! `InitiateMultipartUpload` or `CompleteMultipartUpload`, and a DELETE is
//! `DeleteObject` or `AbortMultipartUpload`.

use super::error::S3Error;
use super::xml;
use crate::body::body_input;
use crate::engine::{ListRequest, MAX_KEYS_LIMIT, ManifestPart, NewUpload, PutObjectRequest};
use crate::state::AppState;
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED, LOCATION};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use hoard_core::DEFAULT_CONTENT_TYPE;
use hoard_metadata::models::{ObjectRow, UserMetadata};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::collections::BTreeMap;
use tracing::info;

type Params = BTreeMap<String, String>;

/// Prefix of user metadata headers.
const META_PREFIX: &str = "x-amz-meta-";

/// Characters escaped when a key is placed in a `Location` URL. `/` stays literal.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn xml_response(status: StatusCode, body: String) -> Response {
    (status, [(CONTENT_TYPE, "application/xml")], body).into_response()
}

fn object_location(bucket: &str, key: &str) -> String {
    format!("/{bucket}/{}", utf8_percent_encode(key, KEY_ENCODE_SET))
}

/// Capture `x-amz-meta-*` headers, keyed by the suffix.
fn user_metadata(headers: &HeaderMap) -> UserMetadata {
    let mut metadata = UserMetadata::new();
    for (name, value) in headers {
        if let Some(meta_key) = name.as_str().strip_prefix(META_PREFIX)
            && let Ok(v) = value.to_str()
        {
            metadata.insert(meta_key.to_string(), v.to_string());
        }
    }
    metadata
}

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// Headers describing a stored object, shared by GET and HEAD.
fn object_headers(row: &ObjectRow) -> Result<HeaderMap, S3Error> {
    let mut headers = HeaderMap::new();
    let header = |value: &str| {
        HeaderValue::from_str(value).map_err(|e| S3Error::Internal {
            message: format!("invalid header value: {e}"),
        })
    };

    headers.insert(CONTENT_TYPE, header(&row.content_type)?);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(row.size_bytes));
    headers.insert(ETAG, header(&format!("\"{}\"", row.etag))?);
    headers.insert(LAST_MODIFIED, header(&xml::http_date(row.updated_at)?)?);

    for (key, value) in row.user_metadata.0.iter() {
        let name = HeaderName::try_from(format!("{META_PREFIX}{key}"));
        match (name, HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(meta_key = %key, "skipping user metadata that is not a valid header"),
        }
    }
    Ok(headers)
}

// -----------------------------------------------------------------------
// GET /: ListBuckets
// -----------------------------------------------------------------------

pub(crate) async fn list_buckets(State(state): State<AppState>) -> Result<Response, S3Error> {
    let buckets = state.engine.list_buckets().await?;
    Ok(xml_response(StatusCode::OK, xml::list_all_my_buckets(&buckets)?))
}

// -----------------------------------------------------------------------
// Bucket-level operations
// -----------------------------------------------------------------------

/// PUT /{bucket}: CreateBucket
pub(crate) async fn create_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<Response, S3Error> {
    state.engine.create_bucket(&bucket).await?;
    info!(bucket = %bucket, "create_bucket");
    Ok((StatusCode::OK, [(LOCATION, format!("/{bucket}"))]).into_response())
}

/// DELETE /{bucket}: DeleteBucket. Rejected while objects remain.
pub(crate) async fn delete_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<StatusCode, S3Error> {
    state.engine.delete_bucket(&bucket).await?;
    info!(bucket = %bucket, "delete_bucket");
    Ok(StatusCode::NO_CONTENT)
}

/// HEAD /{bucket}: HeadBucket
pub(crate) async fn head_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<Response, S3Error> {
    state.engine.get_bucket(&bucket).await?;
    Ok((
        StatusCode::OK,
        [("x-amz-bucket-region", state.config.s3.region.clone())],
    )
        .into_response())
}

/// GET /{bucket}?prefix=&max-keys=&continuation-token=&start-after=: ListObjectsV2
pub(crate) async fn list_objects(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(params): Query<Params>,
) -> Result<Response, S3Error> {
    let max_keys = match params.get("max-keys") {
        Some(raw) => raw.parse::<u32>().map_err(|_| S3Error::InvalidArgument {
            message: format!("max-keys must be a non-negative integer, got {raw}"),
        })?,
        None => MAX_KEYS_LIMIT,
    };
    let request = ListRequest {
        prefix: params.get("prefix").cloned().unwrap_or_default(),
        continuation_token: params.get("continuation-token").cloned(),
        start_after: params.get("start-after").cloned(),
        max_keys,
    };
    tracing::debug!(bucket = %bucket, prefix = %request.prefix, max_keys, "list_objects");

    let page = state.engine.list_objects(&bucket, &request).await?;
    let body = xml::list_objects_v2(xml::ListObjectsV2 {
        bucket: &bucket,
        prefix: &request.prefix,
        continuation_token: request.continuation_token.as_deref(),
        start_after: request.start_after.as_deref(),
        max_keys: page.max_keys,
        is_truncated: page.is_truncated,
        next_continuation_token: page.next_continuation_token,
        objects: &page.objects,
    })?;
    Ok(xml_response(StatusCode::OK, body))
}

/// POST /{bucket}?delete: DeleteObjects
pub(crate) async fn post_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(params): Query<Params>,
    body: Bytes,
) -> Result<Response, S3Error> {
    if !params.contains_key("delete") {
        return Err(S3Error::InvalidRequest {
            message: "unsupported bucket POST".to_string(),
        });
    }

    let body = std::str::from_utf8(&body).map_err(|e| S3Error::MalformedXml {
        message: e.to_string(),
    })?;
    let (quiet, keys) = xml::parse_delete_request(body)?;

    let mut deleted = Vec::new();
    let mut failed = Vec::new();
    for (key, result) in state.engine.delete_objects(&bucket, &keys).await? {
        match result {
            // Absent keys count as deleted.
            Ok(_) => {
                if !quiet {
                    deleted.push(key);
                }
            }
            Err(e) => {
                let message = e.to_string();
                let code = S3Error::from(e).s3_code();
                failed.push((key, code, message));
            }
        }
    }
    info!(bucket = %bucket, requested = keys.len(), failed = failed.len(), "delete_objects");

    Ok(xml_response(StatusCode::OK, xml::delete_result(deleted, failed)?))
}

// -----------------------------------------------------------------------
// PUT /{bucket}/{*key}: PutObject or UploadPart
// -----------------------------------------------------------------------

pub(crate) async fn put_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(params): Query<Params>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, S3Error> {
    if let (Some(upload_id), Some(part_number)) = (params.get("uploadId"), params.get("partNumber")) {
        return upload_part(&state, &bucket, &key, upload_id, part_number, body).await;
    }

    let request = PutObjectRequest {
        bucket,
        key,
        content_type: content_type(&headers),
        user_metadata: user_metadata(&headers),
    };
    let (bucket, key) = (request.bucket.clone(), request.key.clone());
    let result = state.engine.put_object(request, body_input(body)).await?;

    info!(bucket = %bucket, key = %key, fingerprint = %result.fingerprint, size = result.size, "put_object");
    Ok((StatusCode::OK, [(ETAG, result.etag.quoted())]).into_response())
}

async fn upload_part(
    state: &AppState,
    bucket: &str,
    key: &str,
    upload_id: &str,
    part_number: &str,
    body: Body,
) -> Result<Response, S3Error> {
    let part_number: u32 = part_number.parse().map_err(|_| S3Error::InvalidArgument {
        message: format!("invalid part number: {part_number}"),
    })?;

    let etag = state
        .engine
        .upload_part(bucket, key, upload_id, part_number, body_input(body))
        .await?;

    tracing::debug!(bucket, key, upload_id, part_number, "upload_part");
    Ok((StatusCode::OK, [(ETAG, etag.quoted())]).into_response())
}

// -----------------------------------------------------------------------
// GET / HEAD /{bucket}/{*key}
// -----------------------------------------------------------------------

pub(crate) async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, S3Error> {
    let (row, blob) = state.engine.get_object(&bucket, &key).await?;
    let headers = object_headers(&row)?;

    let body_stream = blob
        .stream
        .map(|result| result.map_err(|e| std::io::Error::other(e.to_string())));
    Ok((StatusCode::OK, headers, Body::from_stream(body_stream)).into_response())
}

pub(crate) async fn head_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, S3Error> {
    let row = state.engine.head_object(&bucket, &key).await?;
    Ok((StatusCode::OK, object_headers(&row)?).into_response())
}

// -----------------------------------------------------------------------
// DELETE /{bucket}/{*key}: DeleteObject or AbortMultipartUpload
// -----------------------------------------------------------------------

pub(crate) async fn delete_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> Result<StatusCode, S3Error> {
    if let Some(upload_id) = params.get("uploadId") {
        let aborted = state.engine.abort_upload(&bucket, &key, upload_id).await?;
        info!(bucket = %bucket, key = %key, upload_id = %upload_id, aborted, "abort_multipart_upload");
        return Ok(StatusCode::NO_CONTENT);
    }

    let removed = state.engine.delete_object(&bucket, &key).await?;
    info!(bucket = %bucket, key = %key, removed, "delete_object");
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------
// POST /{bucket}/{*key}: InitiateMultipartUpload or CompleteMultipartUpload
// -----------------------------------------------------------------------

pub(crate) async fn post_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(params): Query<Params>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, S3Error> {
    if params.contains_key("uploads") {
        let upload_id = state
            .engine
            .initiate_upload(NewUpload {
                bucket: bucket.clone(),
                key: key.clone(),
                content_type: content_type(&headers),
                user_metadata: user_metadata(&headers),
            })
            .await?;
        info!(bucket = %bucket, key = %key, upload_id = %upload_id, "initiate_multipart_upload");
        let body = xml::initiate_multipart_upload(&bucket, &key, &upload_id.to_string())?;
        return Ok(xml_response(StatusCode::OK, body));
    }

    if let Some(upload_id) = params.get("uploadId") {
        return complete_multipart_upload(&state, &bucket, &key, upload_id, &body).await;
    }

    Err(S3Error::InvalidRequest {
        message: "unsupported object POST".to_string(),
    })
}

async fn complete_multipart_upload(
    state: &AppState,
    bucket: &str,
    key: &str,
    upload_id: &str,
    body: &[u8],
) -> Result<Response, S3Error> {
    let body = std::str::from_utf8(body).map_err(|e| S3Error::MalformedXml {
        message: e.to_string(),
    })?;
    let manifest: Vec<ManifestPart> = xml::parse_complete_multipart_request(body)?
        .into_iter()
        .map(|(part_number, etag)| ManifestPart { part_number, etag })
        .collect();

    let completed = state
        .engine
        .complete_upload(bucket, key, upload_id, &manifest)
        .await?;
    info!(
        bucket,
        key,
        upload_id,
        fingerprint = %completed.fingerprint,
        size = completed.size,
        "complete_multipart_upload"
    );

    let location = object_location(bucket, key);
    let body = xml::complete_multipart_upload(&location, bucket, key, completed.etag.as_str())?;
    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, "application/xml".to_string()), (ETAG, completed.etag.quoted())],
        body,
    )
        .into_response())
}
