//! Router tests driven through `tower::ServiceExt::oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use avatar_api::{create_router, ApiConfig, AppState};

const BOUNDARY: &str = "avatar-test-boundary";

fn app(tmp: &TempDir) -> Router {
    let config = ApiConfig {
        upload_dir: tmp.path().join("uploads"),
        output_dir: tmp.path().join("outputs"),
        ..ApiConfig::default()
    };
    create_router(AppState::new(config), None)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn upload_request(filename: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/v0/assets/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let tmp = TempDir::new().unwrap();
    let (status, body) = send(&app(&tmp), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_styles_catalog() {
    let tmp = TempDir::new().unwrap();
    let (status, body) = send(&app(&tmp), get("/v0/styles")).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["styles"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["beauty-realistic", "promptable-avatar", "animated-anime"]);
    assert!(body["styles"][0]["name"].is_string());
}

#[tokio::test]
async fn test_generation_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp);

    let (status, job) = send(
        &app,
        json_request(
            Method::POST,
            "/v0/generation",
            json!({"asset_id": "asset-1", "style_id": "animated-anime"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "queued");
    assert_eq!(job["seed"], 42);
    assert_eq!(job["pipeline"], "output_a");
    assert_eq!(job["progress"], 0.0);
    let job_id = job["job_id"].as_str().unwrap().to_string();
    let uri = format!("/v0/jobs/{}", job_id);

    let (status, fetched) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["job_id"], job_id.as_str());

    let (status, running) = send(
        &app,
        json_request(Method::PATCH, &uri, json!({"status": "running", "progress": 0.5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(running["status"], "running");
    assert_eq!(running["progress"], 0.5);

    // Absent fields keep their values.
    let (_, done) = send(
        &app,
        json_request(
            Method::PATCH,
            &uri,
            json!({"status": "done", "output_url": "/media/outputs/out.mp4"}),
        ),
    )
    .await;
    assert_eq!(done["status"], "done");
    assert_eq!(done["progress"], 0.5);
    assert_eq!(done["output_url"], "/media/outputs/out.mp4");

    let (status, list) = send(&app, get("/v0/jobs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["jobs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_generation_rejects_unknown_style() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp);
    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/v0/generation",
            json!({"asset_id": "asset-1", "style_id": "watercolor", "seed": 7}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("beauty-realistic"));
    assert!(detail.contains("animated-anime"));

    let (_, list) = send(&app, get("/v0/jobs")).await;
    assert!(list["jobs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_generation_rejects_empty_asset() {
    let tmp = TempDir::new().unwrap();
    let (status, body) = send(
        &app(&tmp),
        json_request(
            Method::POST,
            "/v0/generation",
            json!({"asset_id": "", "style_id": "animated-anime"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("asset_id"));
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp);

    let (status, body) = send(&app, get("/v0/jobs/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Job not found");

    let (status, _) = send(
        &app,
        json_request(Method::PATCH, "/v0/jobs/nope", json!({"status": "failed"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_then_lookup() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp);

    let (status, upload) = send(&app, upload_request("scan.mov", "video/quicktime", b"frames")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(upload["filename"], "scan.mov");
    let asset_id = upload["asset_id"].as_str().unwrap().to_string();
    assert_eq!(
        upload["url"],
        format!("/media/uploads/{}.mov", asset_id).as_str()
    );
    let stored = tmp.path().join("uploads").join(format!("{}.mov", asset_id));
    assert_eq!(std::fs::read(stored).unwrap(), b"frames");

    let (status, asset) = send(&app, get(&format!("/v0/assets/{}", asset_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(asset["type"], "upload");
}

#[tokio::test]
async fn test_upload_rejects_non_video() {
    let tmp = TempDir::new().unwrap();
    let (status, body) = send(&app(&tmp), upload_request("notes.txt", "text/plain", b"hi")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Only video files are accepted");
    assert!(!tmp.path().join("uploads").exists());
}

#[tokio::test]
async fn test_output_asset_lookup() {
    let tmp = TempDir::new().unwrap();
    let outputs = tmp.path().join("outputs");
    std::fs::create_dir_all(&outputs).unwrap();
    std::fs::write(outputs.join("render-1.mp4"), b"video").unwrap();
    let app = app(&tmp);

    let (status, asset) = send(&app, get("/v0/assets/render-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(asset["type"], "output");
    assert_eq!(asset["url"], "/media/outputs/render-1.mp4");

    let (status, _) = send(&app, get("/v0/assets/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
