use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use http_body_util::BodyExt;
use std::path::Path;
use tempfile::TempDir;

use ffs::receive::UploadFiler;
use ffs::server::{create_router, AppState};
use ffs::share::{ArchiveBuilder, SessionController};

use super::setup_temp_dir;

pub const BOUNDARY: &str = "ffs-test-boundary";
pub const MAX_UPLOAD_BYTES: u64 = 1024 * 1024;

pub struct TestApp {
    pub app: Router,
    pub controller: SessionController,
    pub uploads_root: TempDir,
}

//===========
// App Factory
//===========
pub fn create_test_app(uploads_allowed: bool, archiver: Option<ArchiveBuilder>) -> TestApp {
    let uploads_root = setup_temp_dir();
    let controller = SessionController::new(uploads_allowed, archiver);
    let app = build_router(&controller, uploads_root.path());

    TestApp {
        app,
        controller,
        uploads_root,
    }
}

/// Router storing uploads under `root`, which need not be a usable directory.
pub fn build_router(controller: &SessionController, root: &Path) -> Router {
    let state = AppState::new(
        controller.clone(),
        UploadFiler::new(root),
        "Test's Friendly File Server",
    );
    create_router(&state, MAX_UPLOAD_BYTES)
}

//=================
// Request Builders
//=================
pub fn build_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("Failed to build request")
}

/// Single-part multipart upload, as a browser form would send it.
pub fn upload_request(filename: Option<&str>, contents: &[u8]) -> Request<Body> {
    let disposition = match filename {
        Some(name) => format!("form-data; name=\"file\"; filename=\"{name}\""),
        None => "form-data; name=\"file\"".to_string(),
    };

    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Disposition: {disposition}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    multipart_request(body)
}

/// Multipart body with a closing boundary and no parts.
pub fn empty_multipart_request() -> Request<Body> {
    multipart_request(format!("--{BOUNDARY}--\r\n").into_bytes())
}

fn multipart_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("Failed to build request")
}

//================
// Response Helpers
//================
pub async fn extract_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect body")
        .to_bytes()
        .to_vec()
}

pub async fn extract_text(response: axum::response::Response) -> String {
    String::from_utf8(extract_bytes(response).await).expect("body should be valid UTF-8")
}

pub fn header_value(response: &axum::response::Response, name: header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .expect("header should be present")
        .to_str()
        .expect("header value is valid UTF-8")
        .to_string()
}
