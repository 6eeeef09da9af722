use async_trait::async_trait;

use crate::{
    domain::entities::image_point::{ImagePoint, ScoredImagePoint},
    helper::error_chain_fmt,
};

/// Nearest neighbours store holding one embedding per image
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserts the point or replaces the one with the same id
    async fn upsert(&self, point: &ImagePoint) -> Result<(), VectorIndexError>;

    /// The `top_k` points closest to `vector`, with their metadata, most similar first
    async fn query_nearest(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredImagePoint>, VectorIndexError>;
}

#[derive(thiserror::Error)]
pub enum VectorIndexError {
    #[error("Vector index request failed: {0}")]
    Backend(String),

    #[error("Point {0} returned by the vector index is missing metadata: {1}")]
    InvalidPoint(String, String),
}

impl std::fmt::Debug for VectorIndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
