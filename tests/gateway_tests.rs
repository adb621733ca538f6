//! End-to-end router tests with a scripted engine standing in for the model.

use axum::Router;
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Method, Request, StatusCode, header};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{Rgba, RgbaImage};
use ocr_gateway::engine::OcrEngine;
use ocr_gateway::rate_limit::RateLimiter;
use ocr_gateway::server::create_app;
use ocr_gateway::state::AppState;
use ocr_gateway::worker;
use serde_json::Value;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tower::util::ServiceExt;

const TOKEN: &str = "test-secret";
const BOUNDARY: &str = "gateway-test-boundary";

// deterministic engine: reports image dimensions and its own call count
struct ScriptedEngine {
    calls: Arc<AtomicUsize>,
}

impl OcrEngine for ScriptedEngine {
    fn recognize(&mut self, image: &image::RgbImage) -> anyhow::Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{}x{} #{}", image.width(), image.height(), call))
    }
}

fn test_app(rate_limit: i64, max_batch: usize) -> (Router, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let job_tx = worker::spawn(Box::new(ScriptedEngine {
        calls: calls.clone(),
    }));
    let state = Arc::new(AppState {
        bearer_token: TOKEN.to_string(),
        rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        max_batch,
        inference_timeout: Some(Duration::from_secs(5)),
        job_tx,
    });
    let app = create_app(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4444))));
    (app, calls)
}

fn tiny_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
    cursor.into_inner()
}

fn multipart_body(field: &str, files: &[Vec<u8>]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (idx, file) in files.iter().enumerate() {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"img{idx}.png\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
        body.extend_from_slice(file);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (
        format!("multipart/form-data; boundary={BOUNDARY}"),
        body,
    )
}

fn json_predict_request(auth: Option<&str>, body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_needs_no_auth() {
    let (app, _) = test_app(60, 16);
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn index_serves_the_front_end() {
    let (app, _) = test_app(60, 16);
    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("OCR Gateway"));
}

#[tokio::test]
async fn predict_rejects_missing_and_invalid_tokens() {
    let (app, calls) = test_app(60, 16);

    let body = serde_json::json!({ "image_base64": STANDARD.encode(tiny_png(1, 1)) }).to_string();

    let response = app
        .clone()
        .oneshot(json_predict_request(None, body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(json_predict_request(Some("Bearer wrong"), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // rejected requests never reach the engine
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn predict_accepts_a_data_uri_json_payload() {
    let (app, _) = test_app(60, 16);
    let payload = format!(
        "data:image/png;base64,{}",
        STANDARD.encode(tiny_png(3, 2))
    );
    let body = serde_json::json!({ "image_base64": payload }).to_string();

    let response = app
        .oneshot(json_predict_request(Some(&format!("Bearer {TOKEN}")), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["text"], "3x2 #1");
    assert!(body["seconds"].is_number());
}

#[tokio::test]
async fn predict_accepts_the_image_alias_key() {
    let (app, _) = test_app(60, 16);
    let body = serde_json::json!({ "image": STANDARD.encode(tiny_png(2, 2)) }).to_string();

    let response = app
        .oneshot(json_predict_request(Some(&format!("Bearer {TOKEN}")), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["text"], "2x2 #1");
}

#[tokio::test]
async fn predict_accepts_a_multipart_file() {
    let (app, _) = test_app(60, 16);
    let (content_type, body) = multipart_body("file", &[tiny_png(4, 5)]);

    let response = app
        .oneshot(
            Request::post("/predict")
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["text"], "4x5 #1");
}

#[tokio::test]
async fn predict_rejects_unusable_payloads() {
    let (app, calls) = test_app(60, 16);

    // valid base64, not an image
    let body = serde_json::json!({ "image_base64": STANDARD.encode(b"not an image") }).to_string();
    let response = app
        .clone()
        .oneshot(json_predict_request(Some(&format!("Bearer {TOKEN}")), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // body with neither accepted key
    let response = app
        .oneshot(json_predict_request(
            Some(&format!("Bearer {TOKEN}")),
            r#"{"unexpected": true}"#.to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn batch_over_the_cap_is_rejected_before_inference() {
    let (app, calls) = test_app(60, 2);
    let files = vec![tiny_png(1, 1), tiny_png(1, 1), tiny_png(1, 1)];
    let (content_type, body) = multipart_body("files", &files);

    let response = app
        .oneshot(
            Request::post("/predict_batch")
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn batch_answers_in_upload_order() {
    let (app, _) = test_app(60, 16);
    let files = vec![tiny_png(1, 1), tiny_png(2, 2), tiny_png(3, 3)];
    let (content_type, body) = multipart_body("files", &files);

    let response = app
        .oneshot(
            Request::post("/predict_batch")
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["texts"][0], "1x1 #1");
    assert_eq!(body["texts"][1], "2x2 #2");
    assert_eq!(body["texts"][2], "3x3 #3");
    assert_eq!(body["seconds"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn one_bad_file_fails_the_whole_batch_without_inference() {
    let (app, calls) = test_app(60, 16);
    let files = vec![tiny_png(1, 1), b"garbage bytes".to_vec()];
    let (content_type, body) = multipart_body("files", &files);

    let response = app
        .oneshot(
            Request::post("/predict_batch")
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    // decoding runs before the first inference, so nothing reached the engine
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rate_limit_returns_429_with_retry_after() {
    let (app, calls) = test_app(2, 16);
    let payload = serde_json::json!({ "image_base64": STANDARD.encode(tiny_png(1, 1)) });

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(json_predict_request(
                Some(&format!("Bearer {TOKEN}")),
                payload.to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(json_predict_request(
            Some(&format!("Bearer {TOKEN}")),
            payload.to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn metrics_endpoint_exposes_gateway_series() {
    let (app, _) = test_app(60, 16);

    // generate at least one admitted request first
    let body = serde_json::json!({ "image_base64": STANDARD.encode(tiny_png(1, 1)) }).to_string();
    let response = app
        .clone()
        .oneshot(json_predict_request(Some(&format!("Bearer {TOKEN}")), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8_lossy(&bytes).to_string();
    assert!(text.contains("ocr_gateway_requests_total"));
    assert!(text.contains("ocr_gateway_inference_latency_seconds"));
}
