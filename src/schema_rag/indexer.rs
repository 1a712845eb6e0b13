//! Indexer
//!
//! Fills the three collections of the vector store: one document per schema
//! table, one per worked example, and documentation chunks (built-in
//! business rules plus an optional text file).

use crate::error::Result;
use crate::schema_rag::embedder::Embedder;
use crate::schema_rag::vector_store::{Collection, Document, VectorIndex};
use crate::schema_registry::{SchemaRegistry, TableDef, RELATIONSHIPS};
use crate::worked_examples::WORKED_EXAMPLES;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const MAX_CHUNK_CHARS: usize = 1000;

const KNOWN_ROLES: &[&str] = &["admin", "manager", "employee", "executive"];

/// (source, content) pairs always indexed into the docs collection.
const SYSTEM_DOCS: &[(&str, &str)] = &[
    (
        "system_rules",
        "Hit Tickets Status Fields:\n\
         - is_inprogress: 1 = in progress, 0 = not in progress\n\
         - done_status: 1 = completed, NULL = not done\n\
         - hold_status: 1 = on hold, NULL = not on hold\n\
         user_id is the person who CREATED the ticket; helping_person_id is the person ASSIGNED to resolve it. \
         For \"tickets by user\" questions use helping_person_id.",
    ),
    (
        "system_rules",
        "Visualization Guidelines:\n\
         For status breakdowns return one SUM(condition) column per status (in_progress, completed, on_hold, pending).\n\
         Single entity + status breakdown gives a pie chart, several entities a stacked bar chart, \
         rankings and counts a bar chart, dates a line chart.",
    ),
    (
        "system_rules",
        "Name Search Guidelines:\n\
         Always use LIKE with % wildcards for names, never =.\n\
         WHERE CONCAT(first_name, ' ', last_name) LIKE '%john doe%' matches full names.",
    ),
    (
        "best_practices",
        "Date Handling: use CURDATE() for today, DATE_SUB(CURDATE(), INTERVAL X DAY) for past ranges, \
         MONTH() and YEAR() for monthly comparisons and DATEDIFF() for day differences.",
    ),
    (
        "best_practices",
        "Aggregation: GROUP BY every non-aggregated column, COUNT(column) for non-null counts, \
         COALESCE(SUM(...), 0) for nullable sums, ORDER BY the aggregate DESC for rankings and HAVING for aggregate filters.",
    ),
];

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub collection: Collection,
    pub indexed: usize,
    /// True when the collection was already populated and `force` was off.
    pub skipped: bool,
    pub message: String,
}

pub struct Indexer {
    index: Arc<RwLock<VectorIndex>>,
    embedder: Arc<dyn Embedder>,
    registry: Arc<SchemaRegistry>,
    docs_path: Option<PathBuf>,
    index_path: Option<PathBuf>,
}

impl Indexer {
    pub fn new(index: Arc<RwLock<VectorIndex>>, embedder: Arc<dyn Embedder>, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            index,
            embedder,
            registry,
            docs_path: None,
            index_path: None,
        }
    }

    pub fn with_docs_path(mut self, path: Option<PathBuf>) -> Self {
        self.docs_path = path;
        self
    }

    /// Persist the index here after every successful indexing run.
    pub fn with_index_path(mut self, path: PathBuf) -> Self {
        self.index_path = Some(path);
        self
    }

    pub async fn index_all(&self, force: bool) -> Result<Vec<IndexReport>> {
        let mut reports = Vec::new();
        for collection in Collection::ALL {
            reports.push(self.index_collection(collection, force).await?);
        }
        Ok(reports)
    }

    pub async fn index_collection(&self, collection: Collection, force: bool) -> Result<IndexReport> {
        let existing = self.index.read().await.count(collection);
        if existing > 0 && !force {
            return Ok(IndexReport {
                collection,
                indexed: existing,
                skipped: true,
                message: format!(
                    "{} already indexed ({} documents). Use force_reindex to re-index.",
                    collection, existing
                ),
            });
        }

        let documents = match collection {
            Collection::Schema => self.schema_documents(),
            Collection::Examples => example_documents(),
            Collection::Docs => self.doc_documents(),
        };
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let indexed = documents.len();
        {
            let mut index = self.index.write().await;
            index.clear(collection);
            for (pending, embedding) in documents.into_iter().zip(embeddings) {
                let mut document = Document::new(pending.id, pending.text, embedding);
                document.metadata = pending.metadata;
                index.upsert(collection, document)?;
            }
            if let Some(path) = &self.index_path {
                index.save(path)?;
            }
        }

        info!("Indexed {} documents into {}", indexed, collection);
        Ok(IndexReport {
            collection,
            indexed,
            skipped: false,
            message: format!("Successfully indexed {} {} documents", indexed, collection),
        })
    }

    fn schema_documents(&self) -> Vec<PendingDocument> {
        self.registry
            .tables()
            .iter()
            .map(|table| {
                let relationships = table_relationships(table);
                let mut text = table.render();
                if !relationships.is_empty() {
                    text.push_str("\nRelationships:\n");
                    text.push_str(&relationships.join("\n"));
                }
                PendingDocument::new(table.name.clone(), text)
                    .meta("table_name", &table.name)
                    .meta("columns", &table.column_names().join(","))
                    .meta("category", table.category())
            })
            .collect()
    }

    fn doc_documents(&self) -> Vec<PendingDocument> {
        let mut documents: Vec<PendingDocument> = SYSTEM_DOCS
            .iter()
            .enumerate()
            .map(|(i, (source, content))| {
                PendingDocument::new(format!("doc_{}_{}", source, i), *content)
                    .meta("source", source)
                    .meta("role", "general")
            })
            .collect();

        if let Some(path) = &self.docs_path {
            match read_doc_chunks(path) {
                Ok(chunks) => {
                    let source = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "documentation".to_string());
                    documents.extend(chunks.into_iter().enumerate().map(|(i, chunk)| {
                        let role = detect_role(&chunk);
                        PendingDocument::new(format!("doc_{}_{}", source, i), chunk)
                            .meta("source", &source)
                            .meta("role", role)
                    }));
                }
                Err(e) => warn!("Could not read documentation file {}: {}", path.display(), e),
            }
        }

        documents
    }
}

/// Document awaiting its embedding.
struct PendingDocument {
    id: String,
    text: String,
    metadata: std::collections::HashMap<String, String>,
}

impl PendingDocument {
    fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Default::default(),
        }
    }

    fn meta(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

fn example_documents() -> Vec<PendingDocument> {
    WORKED_EXAMPLES
        .iter()
        .enumerate()
        .map(|(i, example)| {
            PendingDocument::new(example.id(i), format!("Question: {}\nSQL: {}", example.question, example.sql))
                .meta("natural_language", example.question)
                .meta("sql_query", example.sql)
                .meta("category", example.category)
        })
        .collect()
}

fn table_relationships(table: &TableDef) -> Vec<&'static str> {
    let prefix = format!("{}.", table.name);
    RELATIONSHIPS
        .iter()
        .copied()
        .filter(|r| r.contains(&prefix))
        .collect()
}

fn read_doc_chunks(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(chunk_paragraphs(&text, MAX_CHUNK_CHARS))
}

/// Greedily pack blank-line separated paragraphs into chunks of at most
/// `max_chars` characters. Oversized paragraphs are cut on word boundaries.
pub fn chunk_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    let paragraphs = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .flat_map(|p| split_long(p, max_chars));

    for paragraph in paragraphs {
        let joined_len = current.chars().count() + paragraph.chars().count() + 2;
        if !current.is_empty() && joined_len > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(&paragraph);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_long(paragraph: &str, max_chars: usize) -> Vec<String> {
    if paragraph.chars().count() <= max_chars {
        return vec![paragraph.to_string()];
    }
    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in paragraph.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > max_chars {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn detect_role(chunk: &str) -> &'static str {
    let lower = chunk.to_lowercase();
    KNOWN_ROLES
        .iter()
        .copied()
        .find(|role| lower.contains(role))
        .unwrap_or("general")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    fn indexer() -> (Indexer, Arc<RwLock<VectorIndex>>, Arc<CountingEmbedder>) {
        let index = Arc::new(RwLock::new(VectorIndex::new(2)));
        let embedder = Arc::new(CountingEmbedder { calls: AtomicUsize::new(0) });
        let indexer = Indexer::new(index.clone(), embedder.clone(), Arc::new(SchemaRegistry::fallback()));
        (indexer, index, embedder)
    }

    #[tokio::test]
    async fn test_index_all_populates_every_collection() {
        let (indexer, index, _) = indexer();
        let reports = indexer.index_all(false).await.unwrap();
        assert_eq!(reports.len(), 3);

        let stats = index.read().await.stats();
        assert_eq!(stats.schema_count, 3);
        assert_eq!(stats.examples_count, WORKED_EXAMPLES.len());
        assert_eq!(stats.docs_count, SYSTEM_DOCS.len());
    }

    #[tokio::test]
    async fn test_populated_collection_is_skipped_without_force() {
        let (indexer, _, embedder) = indexer();
        indexer.index_collection(Collection::Schema, false).await.unwrap();
        let calls = embedder.calls.load(Ordering::SeqCst);

        let report = indexer.index_collection(Collection::Schema, false).await.unwrap();
        assert!(report.skipped);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls);

        let report = indexer.index_collection(Collection::Schema, true).await.unwrap();
        assert!(!report.skipped);
        assert_eq!(report.indexed, 3);
    }

    #[test]
    fn test_chunking_respects_limit() {
        let paragraph = "word ".repeat(300);
        let text = format!("Intro for managers.\n\n{}\n\nShort tail.", paragraph);
        let chunks = chunk_paragraphs(&text, MAX_CHUNK_CHARS);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_CHUNK_CHARS));
        assert_eq!(detect_role(&chunks[0]), "manager");
        assert_eq!(detect_role("Holiday calendar"), "general");
    }
}
