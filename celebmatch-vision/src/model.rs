use std::path::PathBuf;

use anyhow::{Context, Result};
#[cfg(any(feature = "openvino", feature = "cuda"))]
use ort::ep::{self, ExecutionProvider};
use ort::session::{
    builder::{GraphOptimizationLevel, SessionBuilder},
    Session,
};

/// Locations of the ONNX models used by the pipeline.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    /// YuNet face detector (`face_detection_yunet_2023mar.onnx`).
    pub detector: PathBuf,
    /// SFace recognizer (`face_recognition_sface_2021dec.onnx`).
    pub recognizer: PathBuf,
}

impl ModelPaths {
    /// Fail early if either model file is missing.
    pub fn validate(&self) -> Result<()> {
        for (kind, path) in [("detector", &self.detector), ("recognizer", &self.recognizer)] {
            if !path.is_file() {
                anyhow::bail!("{} model not found at {}", kind, path.display());
            }
        }
        Ok(())
    }
}

pub fn session_builder() -> Result<SessionBuilder> {
    #[allow(unused_mut)]
    let mut builder =
        Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "openvino")]
    {
        let ep = ep::OpenVINO::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("openvino feature is enabled, onnx runtime not compiled with openvino")
        }
    }

    #[cfg(feature = "cuda")]
    {
        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

pub fn recog_session(paths: &ModelPaths) -> Result<Session> {
    session_builder()?
        .commit_from_file(&paths.recognizer)
        .with_context(|| format!("load recognition model {}", paths.recognizer.display()))
}

pub fn detector_session(paths: &ModelPaths) -> Result<Session> {
    session_builder()?
        .commit_from_file(&paths.detector)
        .with_context(|| format!("load detector model {}", paths.detector.display()))
}
