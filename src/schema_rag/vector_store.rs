//! Vector Store
//!
//! In-memory nearest-neighbour store with three named collections. Search is
//! a linear cosine-similarity scan, which is plenty for a few hundred
//! schema/example/doc documents. Persisted as JSON so a restart does not
//! have to re-embed everything.

use crate::error::{AgenticError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Vector embedding (simple f32 vector)
pub type Embedding = Vec<f32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Schema,
    Examples,
    Docs,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Schema, Collection::Examples, Collection::Docs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Schema => "schema",
            Collection::Examples => "examples",
            Collection::Docs => "docs",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = AgenticError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "schema" | "pms_schema" => Ok(Collection::Schema),
            "examples" | "query_examples" => Ok(Collection::Examples),
            "docs" | "documentation" => Ok(Collection::Docs),
            other => Err(AgenticError::VectorStore(format!("Unknown collection '{}'", other))),
        }
    }
}

/// Document in the vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: HashMap<String, String>,
    pub embedding: Embedding,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>, embedding: Embedding) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: HashMap::new(),
            embedding,
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Search result from vector store
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub text: String,
    pub metadata: HashMap<String, String>,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub schema_count: usize,
    pub examples_count: usize,
    pub docs_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    dimension: usize,
    collections: HashMap<Collection, HashMap<String, Document>>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            collections: Collection::ALL.iter().map(|c| (*c, HashMap::new())).collect(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert or replace by id.
    pub fn upsert(&mut self, collection: Collection, document: Document) -> Result<()> {
        if document.embedding.len() != self.dimension {
            return Err(AgenticError::VectorStore(format!(
                "Embedding dimension {} doesn't match store dimension {}",
                document.embedding.len(),
                self.dimension
            )));
        }
        self.collections
            .entry(collection)
            .or_default()
            .insert(document.id.clone(), document);
        Ok(())
    }

    /// Top-k by cosine similarity. `filter` keeps only documents whose
    /// metadata has the given key/value.
    pub fn search(
        &self,
        collection: Collection,
        query_embedding: &[f32],
        top_k: usize,
        filter: Option<(&str, &str)>,
    ) -> Result<Vec<SearchResult>> {
        if query_embedding.len() != self.dimension {
            return Err(AgenticError::VectorStore(format!(
                "Query embedding dimension {} doesn't match store dimension {}",
                query_embedding.len(),
                self.dimension
            )));
        }

        let Some(documents) = self.collections.get(&collection) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<SearchResult> = documents
            .values()
            .filter(|doc| filter.map_or(true, |(key, value)| doc.meta(key) == Some(value)))
            .map(|doc| SearchResult {
                id: doc.id.clone(),
                text: doc.text.clone(),
                metadata: doc.metadata.clone(),
                score: cosine_similarity(query_embedding, &doc.embedding),
            })
            .collect();

        // Sort by score descending, id for a stable order between equal scores
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(top_k);
        Ok(results)
    }

    pub fn count(&self, collection: Collection) -> usize {
        self.collections.get(&collection).map_or(0, HashMap::len)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            schema_count: self.count(Collection::Schema),
            examples_count: self.count(Collection::Examples),
            docs_count: self.count(Collection::Docs),
        }
    }

    pub fn clear(&mut self, collection: Collection) {
        if let Some(documents) = self.collections.get_mut(&collection) {
            documents.clear();
        }
    }

    pub fn clear_all(&mut self) {
        for collection in Collection::ALL {
            self.clear(collection);
        }
    }

    /// Save the vector store to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let encoded = serde_json::to_string(self)?;
        std::fs::write(path, encoded)?;
        info!("Saved vector index to {}", path.display());
        Ok(())
    }

    /// Load the vector store from disk
    pub fn load(path: &Path) -> Result<Self> {
        let encoded = std::fs::read_to_string(path)?;
        let mut index: VectorIndex = serde_json::from_str(&encoded)?;
        for collection in Collection::ALL {
            index.collections.entry(collection).or_default();
        }
        Ok(index)
    }

    /// Load a saved index, or start empty when there is none or it was built
    /// with a different embedding dimension.
    pub fn load_or_new(path: &Path, dimension: usize) -> Self {
        if !path.exists() {
            return Self::new(dimension);
        }
        match Self::load(path) {
            Ok(index) if index.dimension == dimension => {
                info!("Loaded vector index from {} ({:?})", path.display(), index.stats());
                index
            }
            Ok(index) => {
                warn!(
                    "Vector index at {} has dimension {}, expected {}; starting empty",
                    path.display(),
                    index.dimension,
                    dimension
                );
                Self::new(dimension)
            }
            Err(e) => {
                warn!("Failed to load vector index from {}: {}", path.display(), e);
                Self::new(dimension)
            }
        }
    }
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
