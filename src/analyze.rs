use std::sync::{Arc, Mutex, PoisonError};

use celebmatch_vision::ImageSource;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::embedding::EmbeddingSource;
use crate::ranking::{validate_num_results, RankError, RankedResult, RankingEngine};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub results: Vec<RankedResult>,
}

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("no face detected in the image")]
    NoFaceDetected,
    #[error("embedding failed: {0:#}")]
    Embed(anyhow::Error),
    #[error(transparent)]
    Rank(#[from] RankError),
}

/// Image in, ranked catalog matches out.
pub struct Analyzer {
    embedder: Arc<Mutex<Box<dyn EmbeddingSource>>>,
    engine: RankingEngine,
}

impl Analyzer {
    pub fn new(embedder: Box<dyn EmbeddingSource>, engine: RankingEngine) -> Self {
        Self {
            embedder: Arc::new(Mutex::new(embedder)),
            engine,
        }
    }

    pub fn engine(&self) -> &RankingEngine {
        &self.engine
    }

    pub async fn analyze(
        &self,
        image: ImageSource,
        num_results: i64,
    ) -> Result<AnalysisResponse, AnalyzeError> {
        validate_num_results(num_results)?;
        let request_id = Uuid::new_v4();

        // inference is CPU bound, keep it off the async workers
        let embedder = Arc::clone(&self.embedder);
        let query = tokio::task::spawn_blocking(move || {
            // a panic mid-inference leaves the sessions usable, only that request fails
            let mut embedder = embedder.lock().unwrap_or_else(PoisonError::into_inner);
            embedder.embed(image)
        })
        .await
        .map_err(|e| AnalyzeError::Embed(e.into()))?
        .map_err(AnalyzeError::Embed)?
        .ok_or(AnalyzeError::NoFaceDetected)?;

        log::info!(
            "request {}: query embedding of dimension {}, ranking top {}",
            request_id,
            query.len(),
            num_results
        );

        let results = self.engine.rank(&query, num_results).await?;
        log::info!("request {}: returning {} result(s)", request_id, results.len());
        Ok(AnalysisResponse { results })
    }
}
