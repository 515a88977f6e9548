use crate::chunking::ChunkingOptions;
use crate::document::read_documents;
use crate::embeddings::Embedder;
use crate::index::{fingerprint_files, IndexLoadError, IndexManifest, VectorIndex};
use anyhow::{Context, Result};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where an index handed out by the builder came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    /// Reused from the persisted index directory
    Loaded,
    /// Built from the documents and persisted
    Rebuilt,
}

#[derive(Debug)]
pub struct BuiltIndex {
    pub index: VectorIndex,
    pub origin: IndexOrigin,
}

/// Loads the persisted index for an upload batch, or builds and persists a new one
pub struct IndexBuilder {
    index_dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingOptions,
}

impl IndexBuilder {
    pub fn new(index_dir: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        IndexBuilder {
            index_dir: index_dir.into(),
            embedder,
            chunking: ChunkingOptions::default(),
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkingOptions) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Reuse the persisted index when it was built from exactly these files
    /// with the current embedding model; otherwise rebuild.
    ///
    /// Any load failure triggers a full rebuild, there is no retry.
    pub async fn load_or_build<P: AsRef<Path>>(&self, paths: &[P]) -> Result<BuiltIndex> {
        let manifest = self.manifest_for(paths)?;

        match VectorIndex::load(&self.index_dir) {
            Ok(index) if index.manifest() == &manifest => {
                info!(
                    "Loaded persisted index from {} ({} nodes)",
                    self.index_dir.display(),
                    index.len()
                );
                return Ok(BuiltIndex {
                    index,
                    origin: IndexOrigin::Loaded,
                });
            }
            Ok(_) => info!("Persisted index does not match the uploaded documents, rebuilding"),
            Err(IndexLoadError::NotFound(path)) => {
                info!("No persisted index at {}, building", path.display())
            }
            Err(e) => warn!("Failed to load persisted index, rebuilding: {}", e),
        }

        let index = self.build(paths, manifest).await?;
        Ok(BuiltIndex {
            index,
            origin: IndexOrigin::Rebuilt,
        })
    }

    /// Build and persist without looking at what is already stored
    pub async fn build_fresh<P: AsRef<Path>>(&self, paths: &[P]) -> Result<VectorIndex> {
        let manifest = self.manifest_for(paths)?;
        self.build(paths, manifest).await
    }

    /// Whatever index is persisted, regardless of which documents built it.
    ///
    /// A missing or unreadable index yields `None`.
    pub fn load_persisted(&self) -> Option<VectorIndex> {
        match VectorIndex::load(&self.index_dir) {
            Ok(index) => {
                info!("Resuming persisted index from {}", self.index_dir.display());
                Some(index)
            }
            Err(IndexLoadError::NotFound(_)) => None,
            Err(e) => {
                warn!("Ignoring unreadable persisted index: {}", e);
                None
            }
        }
    }

    fn manifest_for<P: AsRef<Path>>(&self, paths: &[P]) -> Result<IndexManifest> {
        Ok(IndexManifest {
            embed_model: self.embedder.model_name().to_string(),
            sources: fingerprint_files(paths)?,
        })
    }

    async fn build<P: AsRef<Path>>(&self, paths: &[P], manifest: IndexManifest) -> Result<VectorIndex> {
        let documents = read_documents(paths)?;
        let index = VectorIndex::from_documents(
            &documents,
            manifest,
            self.embedder.as_ref(),
            self.chunking,
        )
        .await?;

        index
            .persist(&self.index_dir)
            .with_context(|| format!("Failed to persist index to {}", self.index_dir.display()))?;

        Ok(index)
    }
}
