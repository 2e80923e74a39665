//! Request correlation and native API access control.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for request IDs.
/// Longer IDs are truncated to prevent log bloat and log injection.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Header a client may use to supply its own request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header echoing the request ID on every S3 response.
pub const AMZ_REQUEST_ID_HEADER: &str = "x-amz-request-id";

/// Header carrying the native API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Request ID for log correlation.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new random request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string().to_uppercase())
    }

    /// Create a request ID from a client-provided value.
    /// The value is truncated to MAX_REQUEST_ID_LEN characters and non-printable characters removed.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_REQUEST_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn extract_or_generate_request_id(req: &Request) -> RequestId {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(RequestId::from_client)
        .unwrap_or_else(RequestId::new)
}

/// Attach a request ID to the request, run it inside a span carrying the ID,
/// and echo the ID back on the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = extract_or_generate_request_id(&req);
    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
        response.headers_mut().insert(AMZ_REQUEST_ID_HEADER, value);
    }
    response
}

/// Digest a key so comparisons do not depend on where the first differing byte sits.
fn digest_key(key: &str) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}

/// Require the configured `X-API-Key` on native API requests.
///
/// When no key is configured the native API is open.
pub async fn api_key_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.api.key.as_deref() else {
        return Ok(next.run(req).await);
    };

    let supplied = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing API key".to_string()))?;

    if digest_key(supplied) != digest_key(expected) {
        tracing::warn!("rejected request with invalid API key");
        return Err(ApiError::Unauthorized("invalid API key".to_string()));
    }
    Ok(next.run(req).await)
}
