//! Embedder
//!
//! Text embeddings through the OpenAI embeddings API.

use crate::error::{AgenticError, Result};
use crate::schema_rag::vector_store::Embedding;
use async_trait::async_trait;
use tracing::debug;

/// Inputs per embeddings request.
const BATCH_SIZE: usize = 100;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize;
}

/// Embedding client using OpenAI API
pub struct OpenAiEmbedder {
    api_key: String,
    base_url: String,
    model: String, // e.g., "text-embedding-3-small"
    dimensions: usize,
    http: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, base_url: String, model: String, dimensions: usize) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            dimensions,
            http: reqwest::Client::new(),
        }
    }

    async fn request(&self, input: serde_json::Value) -> Result<Vec<Embedding>> {
        if self.api_key.trim().is_empty() {
            return Err(AgenticError::Embedding("OpenAI API key is not configured".to_string()));
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "input": input,
        });
        // only the text-embedding-3 family accepts a dimensions override
        if self.model.starts_with("text-embedding-3") {
            body["dimensions"] = serde_json::json!(self.dimensions);
        }

        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AgenticError::Embedding(format!("Embedding API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgenticError::Embedding(format!("Embedding API error ({}): {}", status, error_text)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AgenticError::Embedding(format!("Failed to parse embedding response: {}", e)))?;

        parse_embeddings(&json)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.request(serde_json::json!(text))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AgenticError::Embedding("No embedding in response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            debug!("Embedding batch of {} texts", chunk.len());
            let batch = self.request(serde_json::json!(chunk)).await?;
            if batch.len() != chunk.len() {
                return Err(AgenticError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    chunk.len(),
                    batch.len()
                )));
            }
            embeddings.extend(batch);
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Embeddings in input order (the API tags each with an `index`).
fn parse_embeddings(json: &serde_json::Value) -> Result<Vec<Embedding>> {
    let data = json["data"]
        .as_array()
        .ok_or_else(|| AgenticError::Embedding("Invalid embedding response format".to_string()))?;

    let mut indexed: Vec<(u64, Embedding)> = data
        .iter()
        .enumerate()
        .map(|(pos, item)| {
            let index = item["index"].as_u64().unwrap_or(pos as u64);
            let embedding = item["embedding"]
                .as_array()
                .ok_or_else(|| AgenticError::Embedding("Missing embedding vector".to_string()))?
                .iter()
                .map(|v| v.as_f64().map(|f| f as f32))
                .collect::<Option<Vec<f32>>>()
                .ok_or_else(|| AgenticError::Embedding("Non-numeric embedding value".to_string()))?;
            Ok((index, embedding))
        })
        .collect::<Result<_>>()?;

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, e)| e).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_embeddings_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let embeddings = parse_embeddings(&json).unwrap();
        assert_eq!(embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_embeddings_rejects_bad_payload() {
        assert!(parse_embeddings(&serde_json::json!({"error": "quota"})).is_err());
    }

    #[tokio::test]
    async fn test_unconfigured_key_fails() {
        let embedder = OpenAiEmbedder::new(
            String::new(),
            "https://api.openai.com/v1".to_string(),
            "text-embedding-3-small".to_string(),
            8,
        );
        assert!(matches!(embedder.embed("users").await, Err(AgenticError::Embedding(_))));
    }
}
