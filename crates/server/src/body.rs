//! Request bodies as engine input streams.

use crate::engine::EngineError;
use axum::body::Body;
use axum::extract::Multipart;
use futures::TryStreamExt;
use hoard_storage::{InputStream, StorageError};

/// The client's byte stream failed or was malformed.
///
/// Carried inside an `io::Error` through the content store so the front ends
/// can answer 400 instead of blaming the storage medium.
#[derive(Debug, thiserror::Error)]
#[error("request body: {0}")]
pub struct BodyError(pub String);

fn body_error(err: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::other(BodyError(err.to_string()))
}

/// Stream a raw request body.
pub fn body_input(body: Body) -> InputStream {
    Box::pin(body.into_data_stream().map_err(body_error))
}

/// Stream the first form field named `field`. A form without it yields a body error.
pub fn multipart_field_input(mut form: Multipart, field: &'static str) -> InputStream {
    Box::pin(async_stream::try_stream! {
        let mut found = false;
        while let Some(mut part) = form.next_field().await.map_err(body_error)? {
            if part.name() != Some(field) {
                continue;
            }
            found = true;
            while let Some(chunk) = part.chunk().await.map_err(body_error)? {
                yield chunk;
            }
            break;
        }
        if !found {
            Err::<(), _>(body_error(format!("missing form field `{field}`")))?;
        }
    })
}

/// Whether an engine error was caused by the request body rather than the server.
pub fn is_body_error(err: &EngineError) -> bool {
    match err {
        EngineError::Storage(StorageError::Io(io)) => io
            .get_ref()
            .is_some_and(|inner| inner.downcast_ref::<BodyError>().is_some()),
        _ => false,
    }
}
