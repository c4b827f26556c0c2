use std::path::{Path, PathBuf};

use anyhow::Result;
use celebmatch_vision::{ImageSource, ModelPaths, Pipeline, Thresholds};

fn model_paths() -> Option<ModelPaths> {
    let dir = PathBuf::from(std::env::var("CELEBMATCH_MODEL_DIR").unwrap_or("models".into()));
    let paths = ModelPaths {
        detector: dir.join("face_detection_yunet_2023mar.onnx"),
        recognizer: dir.join("face_recognition_sface_2021dec.onnx"),
    };
    if paths.validate().is_err() {
        eprintln!("Skipping: models not found in {}", dir.display());
        return None;
    }
    Some(paths)
}

#[test]
fn test_missing_models_rejected() {
    let paths = ModelPaths {
        detector: PathBuf::from("/nonexistent/detector.onnx"),
        recognizer: PathBuf::from("/nonexistent/recognizer.onnx"),
    };
    assert!(Pipeline::new(&paths, Thresholds::default()).is_err());
}

#[test]
fn test_blank_image_has_no_face() -> Result<()> {
    env_logger::try_init().ok();
    let Some(paths) = model_paths() else {
        return Ok(());
    };
    let mut pipeline = Pipeline::new(&paths, Thresholds::default())?;

    let blank = ndarray::Array3::<u8>::zeros((240, 320, 3));
    assert!(pipeline.embed(ImageSource::DecodedArray(blank))?.is_none());
    Ok(())
}

#[test]
fn test_face_embedding_is_unit_length() -> Result<()> {
    env_logger::try_init().ok();
    let Some(paths) = model_paths() else {
        return Ok(());
    };
    let img_path = Path::new("test_faces/face.png");
    if !img_path.exists() {
        eprintln!("Skipping: {} not found", img_path.display());
        return Ok(());
    }

    let mut pipeline = Pipeline::new(&paths, Thresholds::default())?;
    let embedding = pipeline
        .embed(ImageSource::FilePath(img_path.to_path_buf()))?
        .expect("face expected in test image");

    assert_eq!(embedding.dim(), 128);
    let norm: f32 = embedding.to_vec().iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-3, "norm was {}", norm);
    Ok(())
}
