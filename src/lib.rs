//! HTTP gateway in front of a pretrained OCR model.
//!
//! Request admission (bearer auth, per-IP sliding-window rate limiting,
//! batch cap), image normalization, and a single-flight inference worker
//! around a blocking `image -> text` engine.

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod rate_limit;
pub mod server;
pub mod state;
pub mod worker;
