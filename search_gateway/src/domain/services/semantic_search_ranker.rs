use std::sync::Arc;

use common::{
    domain::entities::image_point::ScoredImagePoint,
    helper::error_chain_fmt,
    ports::{
        embedder::{Embedder, EmbeddingClientError, EmbeddingInput},
        vector_index::{VectorIndex, VectorIndexError},
    },
};
use serde::Serialize;
use tracing::info;

/// Matches scoring at or below this similarity are not returned
pub const SIMILARITY_THRESHOLD: f32 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticSearchHit {
    pub id: String,
    pub score: f32,
    pub title: String,
    pub image_url: String,
}

impl From<ScoredImagePoint> for SemanticSearchHit {
    fn from(point: ScoredImagePoint) -> Self {
        Self {
            id: point.id,
            score: point.score,
            title: point.metadata.title,
            image_url: point.metadata.public_url,
        }
    }
}

/// Ranks indexed images by similarity between their embedding and the embedding of a text query
pub struct SemanticSearchRanker {
    embedder: Arc<dyn Embedder>,
    vector_index: Arc<dyn VectorIndex>,
}

impl SemanticSearchRanker {
    pub fn new(embedder: Arc<dyn Embedder>, vector_index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            vector_index,
        }
    }

    /// Searches the `top_k` images closest to `query`, most similar first
    ///
    /// Fewer than `top_k` hits are returned when some neighbours are not similar enough.
    #[tracing::instrument(name = "Semantic search", skip(self))]
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SemanticSearchHit>, SemanticSearchError> {
        if query.trim().is_empty() {
            return Err(SemanticSearchError::MissingQuery);
        }

        let embedding = self.embedder.embed(&EmbeddingInput::text(query)).await?;
        let neighbours = self
            .vector_index
            .query_nearest(embedding.vector(), top_k)
            .await?;

        let neighbours_count = neighbours.len();
        let hits: Vec<SemanticSearchHit> = neighbours
            .into_iter()
            .filter(|point| point.score > SIMILARITY_THRESHOLD)
            .map(SemanticSearchHit::from)
            .collect();

        info!(
            neighbours = neighbours_count,
            hits = hits.len(),
            "Filtered neighbours below similarity threshold"
        );

        Ok(hits)
    }
}

#[derive(thiserror::Error)]
pub enum SemanticSearchError {
    #[error("A query is required for a semantic search")]
    MissingQuery,
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    #[error(transparent)]
    VectorIndex(#[from] VectorIndexError),
}

impl std::fmt::Debug for SemanticSearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
