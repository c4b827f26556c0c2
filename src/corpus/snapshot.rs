use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{page_of, CatalogEntry, CorpusAccessor, CorpusError};

/// Catalog loaded from a local postcard file written by `celebmatch snapshot`.
#[derive(Debug, Clone)]
pub struct SnapshotCorpus {
    path: PathBuf,
    entries: Vec<CatalogEntry>,
}

impl SnapshotCorpus {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let path = path.as_ref().to_path_buf();
        let entries = load_entries(&path)?;
        log::info!(
            "loaded {} catalog entries from {}",
            entries.len(),
            path.display()
        );
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn load_entries(path: &Path) -> Result<Vec<CatalogEntry>, CorpusError> {
    let data = std::fs::read(path)?;
    Ok(postcard::from_bytes(&data)?)
}

pub fn save_entries(path: &Path, entries: &[CatalogEntry]) -> Result<(), CorpusError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let data = postcard::to_allocvec(entries)?;
    std::fs::write(path, data)?;
    Ok(())
}

#[async_trait]
impl CorpusAccessor for SnapshotCorpus {
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

    #[tokio::test]
    async fn test_save_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.bin");
        let entries = vec![
            CatalogEntry {
                name: "Ada".into(),
                embedding: vec![0.25, -0.5],
                reference_url: "https://cdn.example/ada.png".into(),
            },
            CatalogEntry {
                name: "Grace".into(),
                embedding: vec![1.0, 2.0],
                reference_url: "https://cdn.example/grace.png".into(),
            },
        ];

        save_entries(&path, &entries).unwrap();
        let corpus = SnapshotCorpus::open(&path).unwrap();

        assert_eq!(corpus.count().await.unwrap(), 2);
        assert_eq!(corpus.fetch_page(1, 5).await.unwrap(), entries[1..].to_vec());
    }

    #[test]
    fn test_missing_file() {
        let err = SnapshotCorpus::open("/nonexistent/catalog.bin").unwrap_err();
        assert!(matches!(err, CorpusError::Io(_)));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.bin");
        std::fs::write(&path, [0xff, 0xff, 0xff]).unwrap();
        assert!(matches!(
            SnapshotCorpus::open(&path).unwrap_err(),
            CorpusError::Snapshot(_)
        ));
    }
}
