use crate::error::ApiError;
use crate::metrics::QUEUE_DEPTH;
use crate::models::{InferenceJob, Prediction};
use crate::rate_limit::RateLimiter;
use image::RgbImage;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

// app's shared state
pub struct AppState {
    pub bearer_token: String,
    pub rate_limiter: RateLimiter,
    pub max_batch: usize,
    // None waits on the worker indefinitely
    pub inference_timeout: Option<Duration>,
    pub job_tx: mpsc::Sender<InferenceJob>,
}

impl AppState {
    // hand one normalized image to the inference worker and wait for the result
    pub async fn run_inference(&self, image: RgbImage) -> Result<Prediction, ApiError> {
        let (respond_to, response_rx) = oneshot::channel();
        QUEUE_DEPTH.inc();
        if self
            .job_tx
            .send(InferenceJob { image, respond_to })
            .await
            .is_err()
        {
            QUEUE_DEPTH.dec();
            return Err(ApiError::Internal("inference worker is gone".to_string()));
        }

        let result = match self.inference_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, response_rx).await {
                Ok(inner) => inner,
                Err(_) => return Err(ApiError::Timeout),
            },
            None => response_rx.await,
        };

        result
            .map_err(|_| ApiError::Internal("inference worker dropped the job".to_string()))?
            .map_err(ApiError::Internal)
    }
}
