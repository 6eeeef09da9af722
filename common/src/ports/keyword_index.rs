use async_trait::async_trait;

use crate::{domain::entities::image_record::ImageDocument, helper::error_chain_fmt};

/// Maximum number of keywords accepted by `query_by_keyword_overlap`
pub const MAX_OVERLAP_QUERY_KEYWORDS: usize = 10;

/// Document store in which images are searched by exact keyword
#[async_trait]
pub trait KeywordIndex: Send + Sync {
    /// Inserts the document or replaces the one with the same id
    async fn upsert(&self, document: &ImageDocument) -> Result<(), KeywordIndexError>;

    /// Documents sharing at least one keyword with `keywords`, most recent first
    ///
    /// At most `MAX_OVERLAP_QUERY_KEYWORDS` keywords are accepted.
    async fn query_by_keyword_overlap(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<ImageDocument>, KeywordIndexError>;

    /// The `limit` most recently uploaded documents
    async fn query_recent(&self, limit: usize) -> Result<Vec<ImageDocument>, KeywordIndexError>;
}

#[derive(thiserror::Error)]
pub enum KeywordIndexError {
    #[error("Too many keywords in an overlap query: {count}, at most {max} are accepted")]
    TooManyKeywords { count: usize, max: usize },

    #[error("Keyword index request failed: {0}")]
    Backend(String),
}

impl std::fmt::Debug for KeywordIndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
