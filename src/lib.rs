pub mod analyze;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod ranking;
pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};

// Re-export vision types for convenience
pub use celebmatch_vision::{ImageSource, Pipeline};

pub use analyze::{AnalysisResponse, AnalyzeError, Analyzer};
pub use corpus::{CatalogEntry, CorpusAccessor, Embedding};
pub use ranking::{RankError, RankedResult, RankingEngine};

/// Build the corpus accessor the config points at: the snapshot file if set, else the remote catalog.
pub fn open_corpus(cfg: &config::Config) -> Result<Arc<dyn CorpusAccessor>> {
    match &cfg.corpus.snapshot {
        Some(path) => Ok(Arc::new(
            corpus::SnapshotCorpus::open(path)
                .with_context(|| format!("opening snapshot {}", path.display()))?,
        )),
        None => Ok(Arc::new(
            corpus::RestCorpus::new(&cfg.corpus.remote).context("building catalog client")?,
        )),
    }
}

/// Validated config → ready analyzer with the ONNX embedder.
pub fn build_analyzer(cfg: &config::Config) -> Result<Analyzer> {
    cfg.validate()?;
    let corpus = open_corpus(cfg)?;
    let embedder = embedding::VisionEmbedder::new(&cfg.vision)
        .context("Failed to initialize face recognition pipeline")?;
    Ok(Analyzer::new(
        Box::new(embedder),
        RankingEngine::new(corpus, cfg.corpus.page_size),
    ))
}
