use clap::Parser;

// CLI argument structure; secrets and limits can come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "ocr-gateway")]
#[command(about = "HTTP gateway in front of a pretrained OCR model")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Bearer secret required by the predict endpoints; no default on purpose
    #[arg(long, env = "BEARER_TOKEN", hide_env_values = true)]
    pub bearer_token: String,

    // Accepted requests per client within the window; <= 0 disables limiting
    #[arg(long, env = "RATE_LIMIT_PER_MIN", default_value_t = 60, allow_negative_numbers = true)]
    pub rate_limit: i64,

    // Rate limit window in seconds
    #[arg(long, default_value_t = 60)]
    pub rate_window: u64,

    // Maximum number of files accepted by /predict_batch
    #[arg(long, env = "MAX_BATCH", default_value_t = 16)]
    pub max_batch: usize,

    // Seconds to wait for one inference before answering 504; 0 waits forever
    #[arg(long, default_value_t = 120)]
    pub inference_timeout: u64,

    // Force CPU inference even when a GPU is visible
    #[arg(long)]
    pub cpu: bool,

    // Hugging Face repo holding the model weights
    #[arg(long, default_value = "microsoft/trocr-base-handwritten")]
    pub model_repo: String,

    // Revision within the model repo (safetensors live on a PR branch upstream)
    #[arg(long, default_value = "refs/pr/3")]
    pub model_revision: String,
}
