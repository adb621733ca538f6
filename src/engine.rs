//! TrOCR inference engine.
//!
//! Wraps the candle TrOCR port behind the [`OcrEngine`] trait so the rest of
//! the gateway (and the tests) never touch candle types. Decoding is greedy
//! with a fixed seed, so output is deterministic for a given image, and
//! generation is capped at [`MAX_NEW_TOKENS`].

use anyhow::anyhow;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::{trocr, vit};
use hf_hub::Repo;
use hf_hub::api::sync::Api;
use image::RgbImage;
use image::imageops::FilterType;
use tokenizers::Tokenizer;

// decoder tokenizer published alongside the candle TrOCR port
const TOKENIZER_REPO: &str = "ToluClassics/candle-trocr-tokenizer";
// generation is greedy; the seed only feeds the unused sampling path
const SAMPLING_SEED: u64 = 1337;
const MAX_NEW_TOKENS: usize = 512;
// ViT encoder input side length
const INPUT_SIZE: u32 = 384;

/// The blocking `image -> text` contract the gateway is built around.
/// Implementations are owned exclusively by the inference worker.
pub trait OcrEngine: Send {
    fn recognize(&mut self, image: &RgbImage) -> anyhow::Result<String>;
}

// where the model weights come from
#[derive(Debug, Clone)]
pub struct ModelSource {
    pub repo: String,
    pub revision: String,
    pub filename: String,
}

impl ModelSource {
    pub fn new(repo: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            revision: revision.into(),
            filename: "model.safetensors".to_string(),
        }
    }

    // the default checkpoint; its safetensors live on an upstream PR branch
    pub fn base_handwritten() -> Self {
        Self::new("microsoft/trocr-base-handwritten", "refs/pr/3")
    }
}

impl Default for ModelSource {
    fn default() -> Self {
        Self::base_handwritten()
    }
}

pub struct TrOcrEngine {
    device: Device,
    model: trocr::TrOCRModel,
    decoder_config: trocr::TrOCRConfig,
    tokenizer: Tokenizer,
}

impl TrOcrEngine {
    /// Fetches weights and tokenizer from the hub (cached after the first
    /// run) and loads the model. Called once at startup; failure here is
    /// fatal to the process, never a per-request error.
    pub fn load(source: &ModelSource, cpu: bool) -> anyhow::Result<Self> {
        let tokenizer = {
            let path = Api::new()?
                .model(TOKENIZER_REPO.to_string())
                .get("tokenizer.json")?;
            Tokenizer::from_file(&path).map_err(|e| anyhow!(e))?
        };

        let device = device(cpu)?;

        let vb = {
            let weights = Api::new()?
                .repo(Repo::with_revision(
                    source.repo.clone(),
                    hf_hub::RepoType::Model,
                    source.revision.clone(),
                ))
                .get(&source.filename)?;
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)? }
        };

        let encoder_config = vit::Config::microsoft_trocr_base_handwritten();
        let decoder_config = trocr::TrOCRConfig::default();
        let model = trocr::TrOCRModel::new(&encoder_config, &decoder_config, vb)?;

        Ok(Self {
            device,
            model,
            decoder_config,
            tokenizer,
        })
    }
}

impl OcrEngine for TrOcrEngine {
    fn recognize(&mut self, image: &RgbImage) -> anyhow::Result<String> {
        self.model.reset_kv_cache();

        let pixel_values = image_to_tensor(image, &self.device)?;
        let encoder_xs = self.model.encoder().forward(&pixel_values)?;

        let mut logits_processor = LogitsProcessor::new(SAMPLING_SEED, None, None);
        let mut token_ids: Vec<u32> = vec![self.decoder_config.decoder_start_token_id];
        for index in 0..MAX_NEW_TOKENS {
            let context_size = if index >= 1 { 1 } else { token_ids.len() };
            let start_pos = token_ids.len().saturating_sub(context_size);
            let input_ids = Tensor::new(&token_ids[start_pos..], &self.device)?.unsqueeze(0)?;

            let logits = self.model.decode(&input_ids, &encoder_xs, start_pos)?;
            let logits = logits.squeeze(0)?;
            let logits = logits.get(logits.dim(0)? - 1)?;
            let token = logits_processor.sample(&logits)?;
            token_ids.push(token);

            if token == self.decoder_config.eos_token_id {
                break;
            }
        }

        self.tokenizer
            .decode(&token_ids, true)
            .map_err(|e| anyhow!(e))
    }
}

// resize + rescale + normalize to the ViT input layout (1, 3, 384, 384)
pub(crate) fn image_to_tensor(image: &RgbImage, device: &Device) -> candle_core::Result<Tensor> {
    let resized = image::imageops::resize(image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
    let data = Tensor::from_vec(
        resized.into_raw(),
        (INPUT_SIZE as usize, INPUT_SIZE as usize, 3),
        device,
    )?
    .permute((2, 0, 1))?;
    // x/255 rescale and (x - 0.5)/0.5 normalization folded into one affine
    data.to_dtype(DType::F32)?.affine(1.0 / 127.5, -1.0)?.unsqueeze(0)
}

fn device(cpu: bool) -> anyhow::Result<Device> {
    if cpu {
        return Ok(Device::Cpu);
    }
    let device = Device::cuda_if_available(0)?;
    if !device.is_cuda() {
        tracing::warn!("no CUDA device visible, running inference on CPU");
    }
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_to_tensor_has_vit_layout() {
        let image = RgbImage::from_pixel(20, 10, image::Rgb([255, 0, 0]));
        let tensor = image_to_tensor(&image, &Device::Cpu).unwrap();
        assert_eq!(tensor.dims(), &[1, 3, 384, 384]);
    }

    #[test]
    fn image_to_tensor_normalizes_to_unit_range() {
        let white = RgbImage::from_pixel(4, 4, image::Rgb([255, 255, 255]));
        let tensor = image_to_tensor(&white, &Device::Cpu).unwrap();
        let values = tensor.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(values.iter().all(|v| (*v - 1.0).abs() < 1e-5));

        let black = RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0]));
        let tensor = image_to_tensor(&black, &Device::Cpu).unwrap();
        let values = tensor.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(values.iter().all(|v| (*v + 1.0).abs() < 1e-5));
    }

    #[test]
    fn default_source_is_the_base_checkpoint() {
        let source = ModelSource::default();
        assert_eq!(source.repo, "microsoft/trocr-base-handwritten");
        assert_eq!(source.filename, "model.safetensors");
    }
}
