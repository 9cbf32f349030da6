//! Embedding service trait and the in-process mock.
//!
//! - The HTTP provider lives in `unibot-llm` and implements
//!   [`EmbeddingService`] against an OpenAI-compatible `/embeddings` endpoint.
//! - `MockEmbedding` provides deterministic bag-of-words vectors for tests
//!   and offline runs.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use unibot_core::error::UnibotError;

/// Dimensionality of [`MockEmbedding`] vectors.
pub const MOCK_DIMENSIONS: usize = 384;

/// Turns knowledge-base text and student questions into vectors.
///
/// The same service must embed both sides: chunks at ingest time and
/// questions at query time, or similarity scores are meaningless.
pub trait EmbeddingService: Send + Sync {
    /// Embed one piece of text.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, UnibotError>> + Send;

    /// Length of every vector this service returns.
    fn dimensions(&self) -> usize;
}

/// Boxed-future twin of [`EmbeddingService`], usable as
/// `Arc<dyn DynEmbeddingService>` when the provider is picked at startup.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, UnibotError>> + Send + 'a>>;

    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, UnibotError>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

// ---------------------------------------------------------------------------
// MockEmbedding - deterministic token-hash vectors
// ---------------------------------------------------------------------------

/// Offline embedder producing hashed bag-of-words vectors.
///
/// Each lowercase alphanumeric token is hashed into one dimension and the
/// counts are L2-normalized, so texts sharing most of their words score a
/// high cosine similarity and unrelated texts score near zero. Identical
/// inputs always produce identical outputs.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedding;

impl MockEmbedding {
    pub fn new() -> Self {
        Self
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
    }

    fn hash_to_vector(text: &str) -> Vec<f32> {
        let mut result = vec![0.0f32; MOCK_DIMENSIONS];
        for token in Self::tokens(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let slot = (hasher.finish() % MOCK_DIMENSIONS as u64) as usize;
            result[slot] += 1.0;
        }

        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }

        result
    }
}

impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, UnibotError> {
        if Self::tokens(text).next().is_none() {
            return Err(UnibotError::Embedding(
                "Cannot embed empty text".to_string(),
            ));
        }
        Ok(Self::hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        MOCK_DIMENSIONS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    #[tokio::test]
    async fn test_mock_embedding_dimension() {
        let service = MockEmbedding::new();
        let vec = service.embed("hello world").await.unwrap();
        assert_eq!(vec.len(), 384);
    }

    #[tokio::test]
    async fn test_mock_embedding_deterministic() {
        let service = MockEmbedding::new();
        let v1 = service.embed("same text").await.unwrap();
        let v2 = service.embed("same text").await.unwrap();
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn test_mock_embedding_case_and_punctuation_insensitive() {
        let service = MockEmbedding::new();
        let v1 = service.embed("Refund Policy?").await.unwrap();
        let v2 = service.embed("refund policy").await.unwrap();
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn test_mock_embedding_empty_text() {
        let service = MockEmbedding::new();
        assert!(service.embed("").await.is_err());
        assert!(service.embed("  ?! ").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_embedding_is_unit_length() {
        let service = MockEmbedding::new();
        let vec = service.embed("the library opens at nine").await.unwrap();
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_embedding_overlap_scores_higher() {
        let service = MockEmbedding::new();
        let doc = service
            .embed("how do I reset my lms password")
            .await
            .unwrap();
        let close = service.embed("reset my lms password").await.unwrap();
        let far = service.embed("graduation ceremony venue").await.unwrap();
        assert!(cosine_similarity(&doc, &close) > cosine_similarity(&doc, &far));
    }

    #[tokio::test]
    async fn test_dyn_dispatch_matches_static() {
        let service = MockEmbedding::new();
        let boxed: &dyn DynEmbeddingService = &service;
        let a = boxed.embed_boxed("exam dates").await.unwrap();
        let b = service.embed("exam dates").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(DynEmbeddingService::dimensions(&service), 384);
    }
}
