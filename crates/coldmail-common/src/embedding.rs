/// Text embedding seam and its fastembed implementation.
///
/// `TextEmbedding` from fastembed is synchronous and CPU-bound. All embed calls go through
/// `tokio::task::spawn_blocking`. The inner ONNX session is shared behind an `Arc` and only
/// touched from blocking tasks.
///
/// The model is all-MiniLM-L6-v2 (384 dimensions). It takes raw text, so unlike task-prefixed
/// models no `search_document:`/`search_query:` prefix is added.
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CommonError;

/// Dimensionality of all-MiniLM-L6-v2 vectors.
pub const MINILM_DIMENSIONS: usize = 384;

/// Anything that maps text to a fixed-length vector.
///
/// Implementations must be deterministic for a given model version: the evidence index stores
/// document vectors once and compares fresh query vectors against them later.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Embed a batch of texts. The output has one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CommonError>;

    /// Length of every vector produced by `embed`.
    fn dimensions(&self) -> usize;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, CommonError> {
        let mut results = self.embed(&[text.to_string()]).await?;
        if results.len() != 1 {
            return Err(CommonError::Embedding(format!(
                "expected 1 embedding, got {}",
                results.len()
            )));
        }
        results
            .pop()
            .ok_or_else(|| CommonError::Embedding("empty embedding result".to_string()))
    }
}

/// Wraps fastembed's `TextEmbedding` model for generating vector embeddings.
pub struct Embedder {
    model: Arc<fastembed::TextEmbedding>,
}

impl Embedder {
    /// Initialize the embedding model (all-MiniLM-L6-v2).
    ///
    /// This downloads the model on first run (~90MB). The download happens synchronously
    /// inside a blocking task.
    pub async fn new() -> Result<Self, CommonError> {
        let model = tokio::task::spawn_blocking(|| {
            let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
                .with_show_download_progress(true);
            fastembed::TextEmbedding::try_new(options)
        })
        .await
        .map_err(|e| CommonError::Embedding(format!("spawn_blocking join error: {e}")))?
        .map_err(|e| CommonError::Embedding(format!("model initialization failed: {e}")))?;

        Ok(Self {
            model: Arc::new(model),
        })
    }
}

#[async_trait]
impl TextEmbedder for Embedder {
    /// Texts are processed in small batches to bound peak memory during ONNX inference.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CommonError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let owned = texts.to_vec();
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || model.embed(owned, Some(16)))
            .await
            .map_err(|e| CommonError::Embedding(format!("spawn_blocking join error: {e}")))?
            .map_err(|e| CommonError::Embedding(format!("embedding failed: {e}")))
    }

    fn dimensions(&self) -> usize {
        MINILM_DIMENSIONS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<Vec<f32>>);

    #[async_trait]
    impl TextEmbedder for Fixed {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, CommonError> {
            Ok(self.0.clone())
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn embed_one_returns_single_vector() {
        let embedder = Fixed(vec![vec![1.0, 0.0]]);
        let v = embedder.embed_one("rust").await.expect("one vector");
        assert_eq!(v, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn embed_one_rejects_wrong_batch_size() {
        let embedder = Fixed(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let err = embedder.embed_one("rust").await.expect_err("two vectors for one input");
        assert!(matches!(err, CommonError::Embedding(_)));
    }
}
