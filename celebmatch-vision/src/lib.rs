pub mod face;
pub mod model;
pub mod pipeline;
pub mod source;
pub mod yunet;

// Re-export commonly used types
pub use face::{Detection, FaceEmbedding};
pub use model::ModelPaths;
pub use pipeline::{Pipeline, Thresholds};
pub use source::ImageSource;
