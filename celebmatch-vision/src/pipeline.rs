use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;

use crate::face::{self, Detection, FaceEmbedding};
use crate::model::{self, ModelPaths};
use crate::source::ImageSource;

/// Detector cut-offs.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub score: f32,
    pub nms: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            score: 0.6,
            nms: 0.3,
        }
    }
}

/// Full pipeline: detect faces → align → encode
pub struct Pipeline {
    pub detector: Session,
    pub encoder: Session,
    pub thresholds: Thresholds,
}

impl Pipeline {
    pub fn new(paths: &ModelPaths, thresholds: Thresholds) -> Result<Self> {
        paths.validate()?;
        Ok(Self {
            detector: model::detector_session(paths)?,
            encoder: model::recog_session(paths)?,
            thresholds,
        })
    }

    /// Encode the highest-scoring face, or `None` when no face is found.
    pub fn process_image(
        &mut self,
        img: &DynamicImage,
    ) -> Result<Option<(Detection, FaceEmbedding)>> {
        let detections = face::detect_faces(
            &mut self.detector,
            img,
            self.thresholds.score,
            self.thresholds.nms,
        )
        .context("detecting faces")?;

        let Some(best) = detections
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
        else {
            return Ok(None);
        };

        let face_img =
            face::align_face(img, &best, face::ENCODER_INPUT).context("aligning face")?;
        let embedding = face::encode_face(&mut self.encoder, &face_img).context("encoding face")?;

        Ok(Some((best, embedding)))
    }

    /// Resolve an image source and return only the embedding
    pub fn embed(&mut self, source: ImageSource) -> Result<Option<FaceEmbedding>> {
        let img = source.resolve()?;
        Ok(self.process_image(&img)?.map(|(detection, embedding)| {
            log::debug!(
                "selected face with score {:.3} at {:?}",
                detection.score,
                detection.bbox
            );
            embedding
        }))
    }
}
