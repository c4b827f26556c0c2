//! Exact similarity ranking over the full catalog.
//!
//! Every call re-scans the whole corpus page by page, computes Euclidean
//! distances to the query, min–max normalizes them into a `[0, 10]` score and
//! keeps the best `num_results`. Scores are relative to the candidates seen by
//! that call, so they are not comparable across requests.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::corpus::{CatalogEntry, CorpusAccessor, CorpusError, Embedding};

pub const DEFAULT_PAGE_SIZE: u64 = 1000;
pub const MAX_SCORE: f64 = 10.0;

#[derive(Error, Debug)]
pub enum RankError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("could not determine corpus size: {0}")]
    CountUnavailable(#[source] CorpusError),
    #[error("fetching corpus page at offset {offset} failed: {source}")]
    PageFetch {
        offset: u64,
        #[source]
        source: CorpusError,
    },
    #[error("no matching celebrity records found")]
    NoMatch,
}

/// A catalog entry paired with its distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub reference_url: String,
    pub distance: f64,
    /// Position in corpus fetch order, the tie-break for equal scores.
    pub ordinal: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub rank: usize,
    pub name: String,
    /// Rounded to 2 decimals.
    pub similarity: f64,
    #[serde(rename = "image_url")]
    pub reference_url: String,
}

/// Checks `num_results >= 1`.
pub fn validate_num_results(num_results: i64) -> Result<usize, RankError> {
    if num_results < 1 {
        return Err(RankError::InvalidParameter(format!(
            "num_results must be at least 1, got {num_results}"
        )));
    }
    Ok(usize::try_from(num_results).unwrap_or(usize::MAX))
}

/// `None` when the dimensions differ.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }
    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    Some(sum.sqrt())
}

/// Min–max map distances onto `[0, 10]`, nearest = 10.
///
/// A single candidate or a set of equidistant ones all score 10.
pub fn normalize(candidates: Vec<Candidate>) -> Vec<ScoredCandidate> {
    let (min_d, max_d) = candidates
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
            (lo.min(c.distance), hi.max(c.distance))
        });
    let span = max_d - min_d;

    candidates
        .into_iter()
        .map(|candidate| {
            let score = if span == 0.0 {
                MAX_SCORE
            } else {
                MAX_SCORE * (max_d - candidate.distance) / span
            };
            ScoredCandidate { candidate, score }
        })
        .collect()
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Order by unrounded score descending, earlier fetched first on ties, and keep `k`.
pub fn select_top(mut scored: Vec<ScoredCandidate>, k: usize) -> Vec<RankedResult> {
    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.candidate.ordinal.cmp(&b.candidate.ordinal))
    });

    scored
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(i, s)| RankedResult {
            rank: i + 1,
            name: s.candidate.name,
            similarity: round2(s.score),
            reference_url: s.candidate.reference_url,
        })
        .collect()
}

/// Walk the corpus in `[offset, offset + page_size)` windows while `offset < total`.
///
/// Stops early on an empty page. Returns the number of pages fetched.
pub async fn scan_pages<F>(
    corpus: &dyn CorpusAccessor,
    total: u64,
    page_size: u64,
    mut on_entry: F,
) -> Result<u64, RankError>
where
    F: FnMut(CatalogEntry),
{
    let mut offset = 0u64;
    let mut pages = 0u64;

    while offset < total {
        let page = corpus
            .fetch_page(offset, page_size)
            .await
            .map_err(|source| RankError::PageFetch { offset, source })?;
        pages += 1;
        if page.is_empty() {
            log::warn!(
                "empty page at offset {} of {} records, stopping early",
                offset,
                total
            );
            break;
        }
        page.into_iter().for_each(&mut on_entry);
        offset += page_size;
    }

    Ok(pages)
}

pub struct RankingEngine {
    corpus: Arc<dyn CorpusAccessor>,
    page_size: u64,
}

impl RankingEngine {
    pub fn new(corpus: Arc<dyn CorpusAccessor>, page_size: u64) -> Self {
        Self {
            corpus,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Score every candidate in the corpus against `query`, in fetch order.
    pub async fn candidates(&self, query: &Embedding) -> Result<Vec<Candidate>, RankError> {
        let total = self
            .corpus
            .count()
            .await
            .map_err(RankError::CountUnavailable)?;
        if total == 0 {
            log::info!("corpus is empty");
            return Ok(vec![]);
        }

        let mut candidates = Vec::new();
        let mut seen = 0usize;
        let mut skipped = 0usize;

        let pages = scan_pages(self.corpus.as_ref(), total, self.page_size, |entry| {
            let ordinal = seen;
            seen += 1;
            match euclidean_distance(query, &entry.embedding) {
                Some(distance) if distance.is_finite() => candidates.push(Candidate {
                    name: entry.name,
                    reference_url: entry.reference_url,
                    distance,
                    ordinal,
                }),
                Some(_) => {
                    log::debug!("skipping {}: non-finite distance", entry.name);
                    skipped += 1;
                }
                None => {
                    log::debug!(
                        "skipping {}: dimension {} != {}",
                        entry.name,
                        entry.embedding.len(),
                        query.len()
                    );
                    skipped += 1;
                }
            }
        })
        .await?;

        log::info!(
            "scanned {} of {} records in {} page(s), {} candidate(s), {} skipped",
            seen,
            total,
            pages,
            candidates.len(),
            skipped
        );
        Ok(candidates)
    }

    /// Top `num_results` catalog entries most similar to `query`.
    pub async fn rank(
        &self,
        query: &Embedding,
        num_results: i64,
    ) -> Result<Vec<RankedResult>, RankError> {
        let k = validate_num_results(num_results)?;

        let candidates = self.candidates(query).await?;
        if candidates.is_empty() {
            return Err(RankError::NoMatch);
        }

        Ok(select_top(normalize(candidates), k))
    }
}
