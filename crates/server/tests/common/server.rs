//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use hoard_core::config::AppConfig;
use hoard_server::{AppState, create_router, create_s3_router};
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with both routers over one engine.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub s3: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let mut config = AppConfig::for_testing(temp_dir.path());
        modifier(&mut config);

        let state = AppState::from_config(config)
            .await
            .expect("Failed to build application state");
        let router = create_router(state.clone());
        let s3 = create_s3_router(state.clone());

        Self {
            router,
            s3,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Send a request to the native router.
    pub async fn native(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send a request to the S3 router.
    pub async fn s3_request(&self, request: Request<Body>) -> Response {
        self.s3.clone().oneshot(request).await.unwrap()
    }

    /// Send a bodiless S3 request and return status and body.
    pub async fn s3_call(&self, method: &str, uri: &str) -> (StatusCode, Bytes) {
        self.s3_send(method, uri, Bytes::new()).await
    }

    /// Send an S3 request with a body and return status and body.
    pub async fn s3_send(&self, method: &str, uri: &str, body: impl Into<Bytes>) -> (StatusCode, Bytes) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.into()))
            .unwrap();
        let response = self.s3_request(request).await;
        let status = response.status();
        (status, read_body(response).await)
    }

    /// Create a bucket, asserting success.
    pub async fn create_bucket(&self, bucket: &str) {
        let (status, body) = self.s3_call("PUT", &format!("/{bucket}")).await;
        assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));
    }

    /// Put an object, asserting success, and return its quoted ETag.
    pub async fn put_object(&self, bucket: &str, key: &str, data: impl Into<Bytes>) -> String {
        let request = Request::builder()
            .method("PUT")
            .uri(format!("/{bucket}/{key}"))
            .body(Body::from(data.into()))
            .unwrap();
        let response = self.s3_request(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        response.headers()["etag"].to_str().unwrap().to_string()
    }

    /// Current reference count of a fingerprint, or None when no row exists.
    pub async fn refcount(&self, fingerprint_hex: &str) -> Option<i64> {
        use hoard_metadata::LedgerRepo;
        self.state
            .engine
            .metadata()
            .get_refcount(fingerprint_hex)
            .await
            .unwrap()
            .map(|row| row.refcount)
    }

    /// Whether the content store holds a blob.
    pub async fn blob_on_disk(&self, fingerprint_hex: &str) -> bool {
        let fingerprint = hoard_core::Fingerprint::from_hex(fingerprint_hex).unwrap();
        self.state.engine.blob_exists(&fingerprint).await.unwrap()
    }
}

/// Collect a response body.
#[allow(dead_code)]
pub async fn read_body(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}
