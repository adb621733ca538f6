use image::RgbImage;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

// JSON body accepted by POST /predict as an alternative to multipart;
// browsers and older clients send the image under either key
#[derive(Deserialize)]
pub struct Base64Payload {
    #[serde(alias = "image")]
    pub image_base64: String,
}

// response for POST /predict
#[derive(Serialize)]
pub struct PredictionResponse {
    pub text: String,
    pub seconds: f64,
}

// response for POST /predict_batch; positions match the upload order
#[derive(Serialize)]
pub struct BatchPredictionResponse {
    pub texts: Vec<String>,
    pub seconds: Vec<f64>,
}

// outcome of one inference pass
#[derive(Debug, Clone)]
pub struct Prediction {
    pub text: String,
    pub seconds: f64,
}

// job handed to the inference worker - normalized image + reply channel
pub struct InferenceJob {
    pub image: RgbImage,
    pub respond_to: oneshot::Sender<Result<Prediction, String>>,
}
