use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("ocr_gateway_requests_total", "Total number of requests").unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter = register_counter!(
        "ocr_gateway_rate_limited_total",
        "Requests rejected by the rate limiter"
    )
    .unwrap();
    pub static ref INFERENCE_LATENCY: Histogram = register_histogram!(
        "ocr_gateway_inference_latency_seconds",
        "Model inference latency in seconds"
    )
    .unwrap();
    pub static ref QUEUE_DEPTH: Gauge = register_gauge!(
        "ocr_gateway_queue_depth",
        "Jobs waiting for the inference worker"
    )
    .unwrap();
}
