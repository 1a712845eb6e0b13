//! Context Retriever
//!
//! Embeds the question once and pulls the closest tables, worked examples
//! and documentation chunks. The rendered context replaces the full static
//! schema in the SQL generation prompt.

use crate::error::Result;
use crate::schema_rag::embedder::Embedder;
use crate::schema_rag::vector_store::{Collection, SearchResult, VectorIndex};
use itertools::Itertools;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RagContext {
    pub tables: Vec<SearchResult>,
    pub examples: Vec<SearchResult>,
    pub docs: Vec<SearchResult>,
}

impl RagContext {
    pub fn has_tables(&self) -> bool {
        !self.tables.is_empty()
    }

    /// Grounding text for the SQL prompt: tables, then examples, then docs.
    pub fn render(&self) -> String {
        let mut sections = vec![format!(
            "=== RELEVANT TABLES ===\n{}",
            self.tables.iter().map(|t| t.text.as_str()).join("\n\n")
        )];

        if !self.examples.is_empty() {
            let examples: Vec<String> = self
                .examples
                .iter()
                .map(|e| match (e.metadata.get("natural_language"), e.metadata.get("sql_query")) {
                    (Some(question), Some(sql)) => format!("Q: \"{}\"\nA: {}", question, sql),
                    _ => e.text.clone(),
                })
                .collect();
            sections.push(format!("=== SIMILAR EXAMPLES ===\n{}", examples.join("\n\n")));
        }

        if !self.docs.is_empty() {
            sections.push(format!(
                "=== BUSINESS RULES ===\n{}",
                self.docs.iter().map(|d| d.text.as_str()).join("\n\n")
            ));
        }

        sections.join("\n\n")
    }
}

pub struct ContextRetriever {
    index: Arc<RwLock<VectorIndex>>,
    embedder: Arc<dyn Embedder>,
}

impl ContextRetriever {
    pub fn new(index: Arc<RwLock<VectorIndex>>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &Arc<RwLock<VectorIndex>> {
        &self.index
    }

    /// Docs are filtered by `role` when one is given; a role with no tagged
    /// docs falls back to the unfiltered docs search.
    pub async fn retrieve(&self, query: &str, role: Option<&str>, top_k: usize) -> Result<RagContext> {
        let embedding = self.embedder.embed(query).await?;
        let index = self.index.read().await;

        let tables = index.search(Collection::Schema, &embedding, top_k, None)?;
        let examples = index.search(Collection::Examples, &embedding, top_k, None)?;
        let role = role.map(|r| r.trim().to_lowercase()).filter(|r| !r.is_empty());
        let docs = match &role {
            Some(role) => {
                let filtered = index.search(Collection::Docs, &embedding, top_k, Some(("role", role.as_str())))?;
                if filtered.is_empty() {
                    index.search(Collection::Docs, &embedding, top_k, None)?
                } else {
                    filtered
                }
            }
            None => index.search(Collection::Docs, &embedding, top_k, None)?,
        };

        debug!(
            "RAG context: {} tables, {} examples, {} docs",
            tables.len(),
            examples.len(),
            docs.len()
        );
        Ok(RagContext { tables, examples, docs })
    }

    /// Raw search over one collection, used by the search endpoint.
    pub async fn search(
        &self,
        collection: Collection,
        query: &str,
        top_k: usize,
        role: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        let embedding = self.embedder.embed(query).await?;
        let role = role.map(|r| r.trim().to_lowercase()).filter(|r| !r.is_empty());
        let filter = match (&role, collection) {
            (Some(role), Collection::Docs) => Some(("role", role.as_str())),
            _ => None,
        };
        self.index.read().await.search(collection, &embedding, top_k, filter)
    }
}
