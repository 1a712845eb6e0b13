//! Retrieval-augmented grounding for SQL generation.

pub mod embedder;
pub mod indexer;
pub mod retriever;
pub mod vector_store;

pub use embedder::{Embedder, OpenAiEmbedder};
pub use indexer::{IndexReport, Indexer};
pub use retriever::{ContextRetriever, RagContext};
pub use vector_store::{Collection, Document, IndexStats, SearchResult, VectorIndex};
