use async_trait::async_trait;

use super::{page_of, CatalogEntry, CorpusAccessor, CorpusError};

/// Catalog held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    entries: Vec<CatalogEntry>,
}

impl MemoryCorpus {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }
}

#[async_trait]
impl CorpusAccessor for MemoryCorpus {
    async fn count(&self) -> Result<u64, CorpusError> {
        Ok(self.entries.len() as u64)
    }

    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Vec<CatalogEntry>, CorpusError> {
        Ok(page_of(&self.entries, offset, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(n: usize) -> MemoryCorpus {
        MemoryCorpus::new(
            (0..n)
                .map(|i| CatalogEntry {
                    name: format!("celeb-{i}"),
                    embedding: vec![i as f64],
                    reference_url: String::new(),
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_pages() {
        let c = corpus(5);
        assert_eq!(c.count().await.unwrap(), 5);

        let first = c.fetch_page(0, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].name, "celeb-0");

        let last = c.fetch_page(4, 2).await.unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].name, "celeb-4");
    }

    #[tokio::test]
    async fn test_past_end_is_empty() {
        let c = corpus(3);
        assert!(c.fetch_page(3, 10).await.unwrap().is_empty());
        assert!(c.fetch_page(u64::MAX, u64::MAX).await.unwrap().is_empty());
    }
}
