use async_trait::async_trait;

use crate::{
    domain::entities::embedding::Embedding, helper::error_chain_fmt,
    services::vertex_ai::RemoteCallError,
};

/// What to embed: a text, an image, or both
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddingInput {
    pub text: Option<String>,
    /// Storage reference of the image, ex: `gs://bucket/path.png`
    pub image_ref: Option<String>,
}

impl EmbeddingInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image_ref: None,
        }
    }

    pub fn image(image_ref: impl Into<String>) -> Self {
        Self {
            text: None,
            image_ref: Some(image_ref.into()),
        }
    }
}

/// Computes embeddings in the shared text/image space
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, input: &EmbeddingInput) -> Result<Embedding, EmbeddingClientError>;
}

#[derive(thiserror::Error)]
pub enum EmbeddingClientError {
    #[error("Either a text or an image reference is needed to compute an embedding")]
    InvalidInput,

    #[error(transparent)]
    RemoteCall(#[from] RemoteCallError),

    #[error("The embedding model returned no prediction")]
    EmptyPrediction,

    #[error("The embedding model prediction contains neither a text nor an image embedding")]
    NoEmbeddingFound,

    #[error("Expected an embedding of {expected} dimensions, got {actual}")]
    UnexpectedDimension { expected: usize, actual: usize },
}

impl std::fmt::Debug for EmbeddingClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
