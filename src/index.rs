//! Persisted vector index.
//!
//! Stores one embedding vector per chunk alongside the chunk itself and
//! supports nearest-neighbor retrieval and incremental insertion. The index
//! persists as two artifacts in a directory:
//!
//! - `vectors.bin` — concatenated little-endian f32 embeddings
//! - `chunks.json` — dimensionality plus the chunk documents, in vector order
//!
//! Both files must exist for [`VectorIndex::load`] to succeed. Entries are
//! append-only: nothing is mutated in place or individually deleted.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingProvider};
use crate::models::Document;

const VECTORS_FILE: &str = "vectors.bin";
const CHUNKS_FILE: &str = "chunks.json";

/// Index failure modes the caller dispatches on.
#[derive(Debug)]
pub enum IndexError {
    /// One or both index artifacts are missing from the directory.
    NotFound(PathBuf),
    /// `build` was called with no chunks; the caller must skip persistence.
    EmptyInput,
    /// The embedding backend failed while building or inserting.
    Embedding(String),
    /// Reading or writing the index artifacts failed.
    Persistence(String),
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::NotFound(dir) => {
                write!(f, "index not found in {}", dir.display())
            }
            IndexError::EmptyInput => write!(f, "cannot build an index from zero chunks"),
            IndexError::Embedding(e) => write!(f, "embedding failed: {}", e),
            IndexError::Persistence(e) => write!(f, "index persistence failed: {}", e),
        }
    }
}

impl std::error::Error for IndexError {}

/// Sidecar metadata persisted next to the raw vectors.
#[derive(Serialize, Deserialize)]
struct Manifest {
    dims: usize,
    documents: Vec<Document>,
}

/// In-memory vector index: parallel vectors and chunk documents.
pub struct VectorIndex {
    dims: usize,
    vectors: Vec<Vec<f32>>,
    documents: Vec<Document>,
}

impl VectorIndex {
    /// Embed every chunk and build a fresh index.
    ///
    /// # Errors
    ///
    /// [`IndexError::EmptyInput`] if `chunks` is empty,
    /// [`IndexError::Embedding`] if the backend fails.
    pub async fn build(
        chunks: Vec<Document>,
        embedder: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::EmptyInput);
        }

        let mut index = Self {
            dims: embedder.dims(),
            vectors: Vec::new(),
            documents: Vec::new(),
        };
        index.insert(chunks, embedder, batch_size).await?;
        Ok(index)
    }

    /// Append new chunks to the index.
    ///
    /// Performs no deduplication against existing entries: re-inserting a
    /// previously fetched topic grows the index with duplicate chunks. That
    /// drift is accepted; it does not hurt retrieval recall.
    ///
    /// All batches are embedded before anything is appended, so a mid-batch
    /// embedding failure leaves the index exactly as it was. `vectors` and
    /// `documents` stay parallel in every outcome.
    pub async fn insert(
        &mut self,
        chunks: Vec<Document>,
        embedder: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<usize, IndexError> {
        let batch_size = batch_size.max(1);
        let inserted = chunks.len();

        let mut vectors = Vec::with_capacity(inserted);
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embedded = embedder
                .embed(&texts)
                .await
                .map_err(|e| IndexError::Embedding(e.to_string()))?;
            vectors.extend(embedded);
        }

        self.vectors.extend(vectors);
        self.documents.extend(chunks);

        Ok(inserted)
    }

    /// Discard every entry past `len`, restoring the state a caller recorded
    /// with [`VectorIndex::len`] before an insert whose persistence failed.
    pub fn truncate(&mut self, len: usize) {
        self.vectors.truncate(len);
        self.documents.truncate(len);
    }

    /// Load an index from its directory.
    ///
    /// Fails with [`IndexError::NotFound`] unless both artifacts exist.
    /// Contents are trusted: the index is assumed to come from this same
    /// system, not an adversarial source.
    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        let vectors_path = dir.join(VECTORS_FILE);
        let chunks_path = dir.join(CHUNKS_FILE);

        if !vectors_path.is_file() || !chunks_path.is_file() {
            return Err(IndexError::NotFound(dir.to_path_buf()));
        }

        let manifest_text = std::fs::read_to_string(&chunks_path)
            .map_err(|e| IndexError::Persistence(e.to_string()))?;
        let manifest: Manifest = serde_json::from_str(&manifest_text)
            .map_err(|e| IndexError::Persistence(e.to_string()))?;

        let blob =
            std::fs::read(&vectors_path).map_err(|e| IndexError::Persistence(e.to_string()))?;

        let expected = manifest.documents.len() * manifest.dims * 4;
        if blob.len() != expected {
            return Err(IndexError::Persistence(format!(
                "vector blob is {} bytes, expected {}",
                blob.len(),
                expected
            )));
        }

        let floats = blob_to_vec(&blob);
        let vectors: Vec<Vec<f32>> = floats
            .chunks(manifest.dims.max(1))
            .map(|c| c.to_vec())
            .collect();

        Ok(Self {
            dims: manifest.dims,
            vectors,
            documents: manifest.documents,
        })
    }

    /// Serialize the full index state into `dir`, overwriting prior state.
    ///
    /// Each artifact is written to a temporary file and renamed into place,
    /// so a reader never observes a half-written file. No recovery is
    /// attempted if the process dies between the two renames.
    pub fn persist(&self, dir: &Path) -> Result<(), IndexError> {
        std::fs::create_dir_all(dir).map_err(|e| IndexError::Persistence(e.to_string()))?;

        let mut blob = Vec::with_capacity(self.vectors.len() * self.dims * 4);
        for vec in &self.vectors {
            blob.extend_from_slice(&vec_to_blob(vec));
        }
        write_atomic(&dir.join(VECTORS_FILE), &blob)?;

        let manifest = Manifest {
            dims: self.dims,
            documents: self.documents.clone(),
        };
        let manifest_text = serde_json::to_string(&manifest)
            .map_err(|e| IndexError::Persistence(e.to_string()))?;
        write_atomic(&dir.join(CHUNKS_FILE), manifest_text.as_bytes())?;

        Ok(())
    }

    /// Return the `k` chunks most similar to `query_vec`, most similar
    /// first. Ties are broken by insertion order.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Vec<(f32, &Document)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query_vec, v)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| (score, &self.documents[i]))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes).map_err(|e| IndexError::Persistence(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| IndexError::Persistence(e.to_string()))?;
    Ok(())
}
