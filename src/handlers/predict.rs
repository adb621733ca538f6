use axum::Json;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, FromRequest, Multipart, Request, State};
use axum::http::header;
use image::RgbImage;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth;
use crate::error::ApiError;
use crate::metrics::{RATE_LIMITED_TOTAL, REQUEST_TOTAL};
use crate::models::{Base64Payload, BatchPredictionResponse, PredictionResponse};
use crate::normalize;
use crate::state::AppState;

// ceiling on a JSON body; decoded images are capped separately
const MAX_JSON_BODY: usize = 32 * 1024 * 1024;

fn bearer_header(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

// auth gate then rate limiter, in that order, before any body is read
fn admit(state: &AppState, req: &Request, addr: &SocketAddr) -> Result<(), ApiError> {
    REQUEST_TOTAL.inc();
    auth::authorize(bearer_header(req), &state.bearer_token)?;
    if let Err(e) = state.rate_limiter.check_and_record(&addr.ip().to_string()) {
        RATE_LIMITED_TOTAL.inc();
        warn!("rate limit exceeded for {}", addr.ip());
        return Err(e.into());
    }
    Ok(())
}

// POST /predict - one image via multipart field `file` or a JSON base64 body
pub async fn predict_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
) -> Result<Json<PredictionResponse>, ApiError> {
    admit(&state, &req, &addr)?;

    let content = extract_single_image(req).await?;
    let image = normalize::normalize(&content)?;
    debug!("predict: {}x{} image from {}", image.width(), image.height(), addr.ip());

    let prediction = state.run_inference(image).await?;
    Ok(Json(PredictionResponse {
        text: prediction.text,
        seconds: prediction.seconds,
    }))
}

// POST /predict_batch - up to max_batch multipart `files` fields, answered in upload order
pub async fn predict_batch_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
) -> Result<Json<BatchPredictionResponse>, ApiError> {
    admit(&state, &req, &addr)?;

    let uploads = collect_batch_uploads(req).await?;
    if uploads.is_empty() {
        return Err(ApiError::BadRequest(
            "missing files in multipart form".to_string(),
        ));
    }
    if uploads.len() > state.max_batch {
        return Err(ApiError::BadRequest(format!(
            "batch too large: {} files (max: {})",
            uploads.len(),
            state.max_batch
        )));
    }

    // decode everything before the first inference call so shape errors
    // are reported without burning model time
    let mut images: Vec<RgbImage> = Vec::with_capacity(uploads.len());
    for upload in &uploads {
        images.push(normalize::normalize(upload)?);
    }
    debug!("predict_batch: {} images from {}", images.len(), addr.ip());

    let mut texts = Vec::with_capacity(images.len());
    let mut seconds = Vec::with_capacity(images.len());
    for image in images {
        let prediction = state.run_inference(image).await?;
        texts.push(prediction.text);
        seconds.push(prediction.seconds);
    }
    Ok(Json(BatchPredictionResponse { texts, seconds }))
}

// pull the image bytes out of either accepted /predict request shape
async fn extract_single_image(req: Request) -> Result<Vec<u8>, ApiError> {
    if is_multipart(&req) {
        let mut multipart = read_multipart(req).await?;
        while let Some(field) = next_field(&mut multipart).await? {
            if field.name() == Some("file") {
                let data = field.bytes().await.map_err(|e| {
                    ApiError::BadRequest(format!("unreadable file field: {}", e))
                })?;
                return Ok(data.to_vec());
            }
        }
        Err(ApiError::BadRequest(
            "missing file in multipart form".to_string(),
        ))
    } else {
        let body = axum::body::to_bytes(req.into_body(), MAX_JSON_BODY)
            .await
            .map_err(|e| ApiError::BadRequest(format!("unreadable request body: {}", e)))?;
        let payload: Base64Payload = serde_json::from_slice(&body).map_err(|_| {
            ApiError::BadRequest("provide a multipart file or JSON image/image_base64".to_string())
        })?;
        Ok(normalize::decode_base64_payload(&payload.image_base64)?)
    }
}

async fn collect_batch_uploads(req: Request) -> Result<Vec<Bytes>, ApiError> {
    let mut multipart = read_multipart(req).await?;
    let mut uploads = Vec::new();
    while let Some(field) = next_field(&mut multipart).await? {
        if field.name() == Some("files") {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("unreadable files field: {}", e)))?;
            uploads.push(data);
        }
    }
    Ok(uploads)
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("multipart/form-data"))
        .unwrap_or(false)
}

async fn read_multipart(req: Request) -> Result<Multipart, ApiError> {
    Multipart::from_request(req, &())
        .await
        .map_err(|e| ApiError::BadRequest(format!("unreadable multipart form: {}", e)))
}

async fn next_field(
    multipart: &mut Multipart,
) -> Result<Option<axum::extract::multipart::Field<'_>>, ApiError> {
    multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("unreadable multipart form: {}", e)))
}
