//! Directory indexer
//!
//! Finds every PDF in a directory and indexes it into the similarity store
//! under its file name, a bounded number of files at a time.

use crate::errors::IngestionError;
use askroute_common::{agent::SimilarityStore, ingest};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Outcome of one directory run
#[derive(Debug, Default)]
pub struct IndexReport {
    /// `(source id, chunks created)` per indexed file
    pub indexed: Vec<(String, usize)>,
    pub failed: Vec<(PathBuf, String)>,
}

impl IndexReport {
    pub fn total_chunks(&self) -> usize {
        self.indexed.iter().map(|(_, chunks)| chunks).sum()
    }
}

pub struct Indexer {
    store: Arc<dyn SimilarityStore>,
    concurrency: usize,
}

impl Indexer {
    pub fn new(store: Arc<dyn SimilarityStore>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Index every PDF in `dir`. Per-file failures land in the report.
    #[instrument(skip(self, dir), fields(dir = %dir.display()))]
    pub async fn run(&self, dir: &Path) -> Result<IndexReport, IngestionError> {
        let files = discover(dir).await?;
        info!(files = files.len(), concurrency = self.concurrency, "Indexing directory");

        let results: Vec<_> = stream::iter(files)
            .map(|path| async move {
                let outcome = self.index_file(&path).await;
                (path, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = IndexReport::default();
        for (path, outcome) in results {
            match outcome {
                Ok(indexed) => report.indexed.push(indexed),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping file");
                    report.failed.push((path, e.to_string()));
                }
            }
        }

        report.indexed.sort();
        report.failed.sort();
        Ok(report)
    }

    async fn index_file(&self, path: &Path) -> Result<(String, usize), IngestionError> {
        let start = Instant::now();
        let source = source_id(path);

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| IngestionError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let name = source.clone();
        let text = tokio::task::spawn_blocking(move || ingest::extract_text(&bytes, &name))
            .await
            .map_err(|e| IngestionError::Task {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
            .map_err(|source| IngestionError::Index {
                path: path.to_path_buf(),
                source,
            })?;

        let chunks = self
            .store
            .ingest(&text, &source)
            .await
            .map_err(|e| IngestionError::Index {
                path: path.to_path_buf(),
                source: e,
            })?;

        info!(
            source = %source,
            chunks,
            latency_ms = start.elapsed().as_millis() as u64,
            "File indexed"
        );
        Ok((source, chunks))
    }
}

/// Regular files with a `.pdf` extension (any case), sorted by path
pub async fn discover(dir: &Path) -> Result<Vec<PathBuf>, IngestionError> {
    let dir_error = |source| IngestionError::SourceDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(dir_error)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(dir_error)? {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && entry.file_type().await.map_err(dir_error)?.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// The file name is the document id
fn source_id(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use askroute_common::agent::fakes::ScriptedStore;

    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn new(name: &str) -> Self {
            let path = std::env::temp_dir()
                .join(format!("askroute-ingest-{}-{}", name, std::process::id()));
            let _ = std::fs::remove_dir_all(&path);
            std::fs::create_dir_all(&path).unwrap();
            Self(path)
        }

        fn write(&self, name: &str, bytes: &[u8]) {
            std::fs::write(self.0.join(name), bytes).unwrap();
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[tokio::test]
    async fn test_discover_only_pdfs() {
        let dir = ScratchDir::new("discover");
        dir.write("b.pdf", b"x");
        dir.write("A.PDF", b"x");
        dir.write("notes.txt", b"x");
        std::fs::create_dir_all(dir.0.join("nested.pdf")).unwrap();

        let files = discover(&dir.0).await.unwrap();
        let names: Vec<String> = files.iter().map(|p| source_id(p)).collect();
        assert_eq!(names, vec!["A.PDF", "b.pdf"]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let dir = std::env::temp_dir().join("askroute-ingest-does-not-exist");
        let err = discover(&dir).await.unwrap_err();
        assert!(matches!(err, IngestionError::SourceDir { .. }));
    }

    #[tokio::test]
    async fn test_unreadable_pdfs_are_reported_not_fatal() {
        let dir = ScratchDir::new("failures");
        dir.write("broken.pdf", b"not really a pdf");
        dir.write("also-broken.pdf", b"%PDF-garbage");

        let indexer = Indexer::new(Arc::new(ScriptedStore::with_chunks(&[])), 2);
        let report = indexer.run(&dir.0).await.unwrap();

        assert!(report.indexed.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.total_chunks(), 0);
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = ScratchDir::new("empty");
        let indexer = Indexer::new(Arc::new(ScriptedStore::with_chunks(&[])), 0);
        let report = tokio_test::assert_ok!(indexer.run(&dir.0).await);
        assert!(report.indexed.is_empty() && report.failed.is_empty());
    }

    #[test]
    fn test_source_id_is_file_name() {
        assert_eq!(source_id(Path::new("data/manual.pdf")), "manual.pdf");
    }
}
