use anyhow::Result;
use celebmatch_vision::{ImageSource, Pipeline};

use crate::config::VisionConfig;
use crate::corpus::Embedding;

/// Turns an image into at most one face embedding.
pub trait EmbeddingSource: Send {
    /// `Ok(None)` when the image contains no detectable face.
    fn embed(&mut self, image: ImageSource) -> Result<Option<Embedding>>;
}

/// YuNet + SFace embedder backed by ONNX Runtime.
pub struct VisionEmbedder {
    pipeline: Pipeline,
}

impl VisionEmbedder {
    pub fn new(cfg: &VisionConfig) -> Result<Self> {
        let pipeline = Pipeline::new(&cfg.model_paths(), cfg.thresholds())?;
        Ok(Self { pipeline })
    }
}

impl EmbeddingSource for VisionEmbedder {
    fn embed(&mut self, image: ImageSource) -> Result<Option<Embedding>> {
        Ok(self
            .pipeline
            .embed(image)?
            .map(|face| face.to_vec().into_iter().map(f64::from).collect()))
    }
}
