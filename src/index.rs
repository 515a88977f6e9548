use crate::chunking::{split_document, ChunkingOptions};
use crate::document::{Document, Metadata};
use crate::embeddings::{Embedder, Embedding};
use anyhow::{Context, Result};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DOCSTORE_FILE: &str = "docstore.json";
const VECTOR_STORE_FILE: &str = "vector_store.json";
const INDEX_STORE_FILE: &str = "index_store.json";

/// Why a persisted index could not be used
#[derive(Debug, Error)]
pub enum IndexLoadError {
    #[error("no persisted index at {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt index file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("inconsistent index: {0}")]
    Inconsistent(String),
}

/// Identifies one source file by name and content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceFingerprint {
    pub file_name: String,
    pub sha256: String,
}

impl SourceFingerprint {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .context("Invalid file name")?
            .to_string();

        Ok(SourceFingerprint {
            file_name,
            sha256: hex::encode(Sha256::digest(&bytes)),
        })
    }
}

/// Fingerprint every path, in order
pub fn fingerprint_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<SourceFingerprint>> {
    paths.iter().map(SourceFingerprint::from_file).collect()
}

/// What an index was built from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexManifest {
    pub embed_model: String,
    pub sources: Vec<SourceFingerprint>,
}

/// A retrieved chunk with provenance and similarity score
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceNode {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

/// An indexed chunk
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub text: String,
    pub start_position: usize,
    pub metadata: Metadata,
    pub embedding: Embedding,
}

#[derive(Serialize, Deserialize)]
struct StoredNode {
    id: String,
    text: String,
    start_position: usize,
    metadata: Metadata,
}

#[derive(Serialize, Deserialize)]
struct DocStore {
    nodes: Vec<StoredNode>,
}

#[derive(Serialize, Deserialize)]
struct VectorStore {
    embedding_dict: BTreeMap<String, Vec<f32>>,
}

/// In-memory vector index over document chunks, persisted as JSON files
#[derive(Debug, Clone)]
pub struct VectorIndex {
    manifest: IndexManifest,
    nodes: Vec<Node>,
}

impl VectorIndex {
    /// Chunk and embed `documents`
    pub async fn from_documents(
        documents: &[Document],
        manifest: IndexManifest,
        embedder: &dyn Embedder,
        options: ChunkingOptions,
    ) -> Result<Self> {
        let chunks: Vec<_> = documents
            .iter()
            .enumerate()
            .flat_map(|(position, doc)| split_document(doc, position, options))
            .collect();
        info!(
            "Split {} documents into {} chunks",
            documents.len(),
            chunks.len()
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .await
            .context("Failed to embed document chunks")?;

        if embeddings.len() != chunks.len() {
            anyhow::bail!(
                "Embedder returned {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            );
        }

        let nodes = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| Node {
                id: chunk.id,
                text: chunk.text,
                start_position: chunk.start_position,
                metadata: chunk.metadata,
                embedding,
            })
            .collect();

        Ok(VectorIndex { manifest, nodes })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Up to `top_k` nodes, most similar first
    pub fn search(&self, query: &Embedding, top_k: usize) -> Vec<SourceNode> {
        let mut scored: Vec<(f32, &Node)> = self
            .nodes
            .iter()
            .map(|node| (query.cosine_similarity(&node.embedding), node))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(top_k)
            .map(|(score, node)| SourceNode {
                id: node.id.clone(),
                text: node.text.clone(),
                metadata: node.metadata.clone(),
                score,
            })
            .collect()
    }

    /// Write the index to `dir`, creating it if needed
    pub fn persist<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory {}", dir.display()))?;

        let docstore = DocStore {
            nodes: self
                .nodes
                .iter()
                .map(|n| StoredNode {
                    id: n.id.clone(),
                    text: n.text.clone(),
                    start_position: n.start_position,
                    metadata: n.metadata.clone(),
                })
                .collect(),
        };
        let vector_store = VectorStore {
            embedding_dict: self
                .nodes
                .iter()
                .map(|n| (n.id.clone(), n.embedding.values.clone()))
                .collect(),
        };
        if vector_store.embedding_dict.len() != docstore.nodes.len() {
            anyhow::bail!(
                "Index has {} nodes but only {} distinct node ids",
                docstore.nodes.len(),
                vector_store.embedding_dict.len()
            );
        }

        write_json(&dir.join(DOCSTORE_FILE), &docstore)?;
        write_json(&dir.join(VECTOR_STORE_FILE), &vector_store)?;
        // Written last: a readable manifest implies the other files are complete
        write_json(&dir.join(INDEX_STORE_FILE), &self.manifest)?;

        info!("Persisted index with {} nodes to {}", self.nodes.len(), dir.display());
        Ok(())
    }

    /// Read an index previously written by [`VectorIndex::persist`]
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self, IndexLoadError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(IndexLoadError::NotFound(dir.to_path_buf()));
        }

        let manifest: IndexManifest = read_json(&dir.join(INDEX_STORE_FILE))?;
        let docstore: DocStore = read_json(&dir.join(DOCSTORE_FILE))?;
        let mut vector_store: VectorStore = read_json(&dir.join(VECTOR_STORE_FILE))?;

        if docstore.nodes.len() != vector_store.embedding_dict.len() {
            return Err(IndexLoadError::Inconsistent(format!(
                "{} nodes but {} embeddings",
                docstore.nodes.len(),
                vector_store.embedding_dict.len()
            )));
        }

        let nodes = docstore
            .nodes
            .into_iter()
            .map(|stored| {
                let values = vector_store
                    .embedding_dict
                    .remove(&stored.id)
                    .ok_or_else(|| {
                        IndexLoadError::Inconsistent(format!("no embedding for node {}", stored.id))
                    })?;
                Ok(Node {
                    id: stored.id,
                    text: stored.text,
                    start_position: stored.start_position,
                    metadata: stored.metadata,
                    embedding: Embedding::new(values),
                })
            })
            .collect::<Result<Vec<_>, IndexLoadError>>()?;

        debug!("Loaded {} nodes from {}", nodes.len(), dir.display());
        Ok(VectorIndex { manifest, nodes })
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string(value)?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, IndexLoadError> {
    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            IndexLoadError::NotFound(path.to_path_buf())
        } else {
            IndexLoadError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    serde_json::from_str(&content).map_err(|source| IndexLoadError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}
