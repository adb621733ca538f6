use clap::Parser;
use ocr_gateway::config::Args;
use ocr_gateway::engine::{ModelSource, TrOcrEngine};
use ocr_gateway::rate_limit::RateLimiter;
use ocr_gateway::state::AppState;
use ocr_gateway::{server, worker};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    // the gateway must not come up without its model
    let source = ModelSource::new(args.model_repo.clone(), args.model_revision.clone());
    info!("loading TrOCR model from {} ({})", source.repo, source.revision);
    let engine = TrOcrEngine::load(&source, args.cpu)?;
    info!("model loaded");

    let job_tx = worker::spawn(Box::new(engine));

    let state = Arc::new(AppState {
        bearer_token: args.bearer_token.clone(),
        rate_limiter: RateLimiter::new(args.rate_limit, Duration::from_secs(args.rate_window)),
        max_batch: args.max_batch,
        inference_timeout: (args.inference_timeout > 0)
            .then(|| Duration::from_secs(args.inference_timeout)),
        job_tx,
    });

    // idle rate-limit buckets are dropped in the background
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            sweep_state.rate_limiter.sweep();
        }
    });

    info!(
        "rate limit: {} requests per {} seconds",
        args.rate_limit, args.rate_window
    );
    info!("max batch size: {}", args.max_batch);

    server::serve(state, args.port).await
}
