//! S3-compatible HTTP API.
//!
//! Supported operations:
//!
//! - `GET /`: ListBuckets
//! - `PUT /{bucket}`: CreateBucket
//! - `DELETE /{bucket}`: DeleteBucket (rejected while objects remain)
//! - `HEAD /{bucket}`: HeadBucket
//! - `GET /{bucket}?prefix=&max-keys=&continuation-token=`: ListObjectsV2
//! - `POST /{bucket}?delete`: DeleteObjects
//! - `PUT /{bucket}/{key}`: PutObject
//! - `GET /{bucket}/{key}`: GetObject
//! - `HEAD /{bucket}/{key}`: HeadObject
//! - `DELETE /{bucket}/{key}`: DeleteObject
//! - `POST /{bucket}/{key}?uploads`: InitiateMultipartUpload
//! - `PUT /{bucket}/{key}?partNumber=N&uploadId=X`: UploadPart
//! - `POST /{bucket}/{key}?uploadId=X`: CompleteMultipartUpload
//! - `DELETE /{bucket}/{key}?uploadId=X`: AbortMultipartUpload
//!
//! Requests are not signed or authenticated.

mod error;
mod handlers;
mod xml;

pub use error::{S3Error, S3ErrorDetail};

use crate::auth::RequestId;
use crate::state::AppState;
use axum::Router;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::header::CONTENT_LENGTH;
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::{get, put};

/// Routes without state or outer layers.
pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_buckets))
        .route(
            "/{bucket}",
            put(handlers::create_bucket)
                .get(handlers::list_objects)
                .delete(handlers::delete_bucket)
                .head(handlers::head_bucket)
                .post(handlers::post_bucket),
        )
        // Trailing-slash variant; S3 clients often send GET /bucket/.
        .route(
            "/{bucket}/",
            put(handlers::create_bucket)
                .get(handlers::list_objects)
                .delete(handlers::delete_bucket)
                .head(handlers::head_bucket)
                .post(handlers::post_bucket),
        )
        // Object keys may contain slashes.
        .route(
            "/{bucket}/{*key}",
            put(handlers::put_object)
                .get(handlers::get_object)
                .delete(handlers::delete_object)
                .head(handlers::head_object)
                .post(handlers::post_object),
        )
        // Object bodies are streamed to disk.
        .layer(DefaultBodyLimit::disable())
}

/// Re-render S3 error bodies with the request path and request ID.
pub(crate) async fn render_error_context(req: Request, next: Next) -> Response {
    let resource = req.uri().path().to_string();
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.as_str().to_string())
        .unwrap_or_default();

    let mut response = next.run(req).await;
    if let Some(detail) = response.extensions_mut().remove::<S3ErrorDetail>() {
        let body = xml::error_xml(detail.code, &detail.message, &resource, &request_id);
        response.headers_mut().remove(CONTENT_LENGTH);
        *response.body_mut() = Body::from(body);
    }
    response
}
