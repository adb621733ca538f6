//! Single-flight inference worker.
//!
//! All inference funnels through one blocking worker that owns the model,
//! so concurrent requests serialize on the compute resource instead of
//! racing it. Handlers talk to it over an mpsc queue and get their result
//! back on a oneshot channel.

use crate::engine::OcrEngine;
use crate::metrics::{INFERENCE_LATENCY, QUEUE_DEPTH};
use crate::models::{InferenceJob, Prediction};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

const QUEUE_CAPACITY: usize = 100;

// spawn the worker; jobs are processed one at a time in arrival order
pub fn spawn(mut engine: Box<dyn OcrEngine>) -> mpsc::Sender<InferenceJob> {
    let (tx, mut rx) = mpsc::channel::<InferenceJob>(QUEUE_CAPACITY);
    tokio::task::spawn_blocking(move || {
        info!("inference worker started, processing jobs sequentially");
        while let Some(job) = rx.blocking_recv() {
            QUEUE_DEPTH.dec();
            let start = Instant::now();
            let result = engine.recognize(&job.image);
            let elapsed = start.elapsed().as_secs_f64();
            INFERENCE_LATENCY.observe(elapsed);

            let response = match result {
                Ok(text) => Ok(Prediction {
                    text,
                    seconds: round_to_millis(elapsed),
                }),
                Err(e) => {
                    warn!("inference failed: {}", e);
                    Err(e.to_string())
                }
            };
            if job.respond_to.send(response).is_err() {
                warn!("inference result dropped, caller went away");
            }
        }
        info!("inference worker stopped, job channel closed");
    });
    tx
}

// wall-clock seconds at millisecond precision, the resolution responses carry
pub fn round_to_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}
