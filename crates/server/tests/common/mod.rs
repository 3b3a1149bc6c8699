//! Shared test harness for the HTTP API suites.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use cargohold_registry::{RegistryConfig, SessionRegistry};
use cargohold_server::{AppState, create_router};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// Small chunk size so tests exercise multi-chunk uploads with tiny files.
#[allow(dead_code)]
pub const TEST_CHUNK_SIZE: u64 = 64;

/// A router over a fresh registry with temporary storage.
#[allow(dead_code)] // each test file compiles common/ separately
pub struct TestServer {
    pub router: Router,
    pub registry: Arc<SessionRegistry>,
    _temp: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut RegistryConfig)) -> Self {
        let temp = TempDir::new().expect("temp dir");
        let mut config = RegistryConfig {
            storage_root: temp.path().to_path_buf(),
            chunk_size: TEST_CHUNK_SIZE,
            session_ttl: Duration::from_secs(3600),
            expired_grace: Duration::from_secs(3600),
        };
        tweak(&mut config);

        let registry = Arc::new(SessionRegistry::new(config).expect("registry"));
        let router = create_router(AppState::new(Arc::clone(&registry)));
        Self {
            router,
            registry,
            _temp: temp,
        }
    }
}

/// Sends a JSON request through the router and returns (status, body).
#[allow(dead_code)]
pub async fn json_request(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// Sends one chunk as the multipart form the real client uses.
#[allow(dead_code)]
pub async fn chunk_request(
    router: &Router,
    upload_id: &str,
    index: u32,
    hash: &str,
    bytes: &[u8],
) -> (StatusCode, Value) {
    let boundary = "cargohold-test-boundary";
    let mut body = Vec::new();
    for (name, value) in [
        ("uploadId", upload_id.to_string()),
        ("chunkIndex", index.to_string()),
        ("chunkHash", hash.to_string()),
    ] {
        write!(
            body,
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        )
        .unwrap();
    }
    write!(
        body,
        "--{boundary}\r\nContent-Disposition: form-data; name=\"chunk\"; filename=\"chunk_{index}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .unwrap();
    body.extend_from_slice(bytes);
    write!(body, "\r\n--{boundary}--\r\n").unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/upload/chunk")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Builds a small zip archive in memory for upload fixtures.
#[allow(dead_code)]
pub fn build_test_zip() -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("hello.txt", options).unwrap();
        writer.write_all(b"hello from cargohold").unwrap();
        writer.add_directory("assets", options).unwrap();
        writer.start_file("assets/blob.bin", options).unwrap();
        writer.write_all(&[7u8; 200]).unwrap();
        writer.finish().unwrap();
    }
    cursor.into_inner()
}
