mod health;
mod index;
mod metrics;
mod predict;

pub use health::health_handler;
pub use index::index_handler;
pub use metrics::metrics_handler;
pub use predict::{predict_batch_handler, predict_handler};
