//! Access to the reference catalog the ranking engine scans.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod rest;
pub mod snapshot;

pub use memory::MemoryCorpus;
pub use rest::RestCorpus;
pub use snapshot::SnapshotCorpus;

/// A face embedding. Widened to `f64` so distances are computed at full precision.
pub type Embedding = Vec<f64>;

/// One reference face in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub embedding: Embedding,
    pub reference_url: String,
}

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("request to corpus failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("corpus responded with {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("could not decode corpus response: {0}")]
    Decode(String),
    #[error("record count not found")]
    MissingCount,
    #[error("corpus i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corpus snapshot is corrupt: {0}")]
    Snapshot(#[from] postcard::Error),
}

/// Read-only, paged view over the catalog.
///
/// `fetch_page` may return fewer than `limit` entries at the end of the
/// catalog; an empty page means there is nothing past `offset`.
#[async_trait]
pub trait CorpusAccessor: Send + Sync {
    async fn count(&self) -> Result<u64, CorpusError>;

    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Vec<CatalogEntry>, CorpusError>;
}

/// Serve a page out of an in-memory slice with the same bounds rules as the remote.
pub(crate) fn page_of(entries: &[CatalogEntry], offset: u64, limit: u64) -> Vec<CatalogEntry> {
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(entries.len());
    let end = usize::try_from(offset.saturating_add(limit))
        .unwrap_or(usize::MAX)
        .min(entries.len());
    entries[start..end].to_vec()
}
