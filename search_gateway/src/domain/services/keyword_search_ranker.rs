use std::sync::Arc;

use common::{
    core::keyword_extractor::extract_keywords,
    domain::entities::image_record::ImageDocument,
    helper::error_chain_fmt,
    ports::keyword_index::{KeywordIndex, KeywordIndexError, MAX_OVERLAP_QUERY_KEYWORDS},
};
use serde::Serialize;
use tracing::{info, warn};

/// Number of candidates fetched from the index for each requested result
pub const CANDIDATES_PER_RESULT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordSearchHit {
    pub id: String,
    pub image_url: String,
    pub title: String,
}

impl From<ImageDocument> for KeywordSearchHit {
    fn from(document: ImageDocument) -> Self {
        Self {
            id: document.id,
            image_url: document.public_url,
            title: document.title,
        }
    }
}

/// Ranks indexed images by the number of query keywords found in their description
pub struct KeywordSearchRanker {
    keyword_index: Arc<dyn KeywordIndex>,
}

impl KeywordSearchRanker {
    pub fn new(keyword_index: Arc<dyn KeywordIndex>) -> Self {
        Self { keyword_index }
    }

    /// Searches the `top_k` images best matching the keywords of `query`
    ///
    /// An empty query lists the most recently uploaded images instead.
    /// Ties keep the order of the index, most recent first.
    #[tracing::instrument(name = "Keyword search", skip(self))]
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<KeywordSearchHit>, KeywordSearchError> {
        if query.trim().is_empty() {
            let documents = self.keyword_index.query_recent(top_k).await?;
            return Ok(documents.into_iter().map(KeywordSearchHit::from).collect());
        }

        let mut keywords = extract_keywords(query);
        if keywords.is_empty() {
            info!("No keyword in query, nothing to search");
            return Ok(vec![]);
        }

        if keywords.len() > MAX_OVERLAP_QUERY_KEYWORDS {
            warn!(
                count = keywords.len(),
                dropped = ?&keywords[MAX_OVERLAP_QUERY_KEYWORDS..],
                "Query has too many keywords, only the first {} are used",
                MAX_OVERLAP_QUERY_KEYWORDS
            );
            keywords.truncate(MAX_OVERLAP_QUERY_KEYWORDS);
        }

        let candidates = self
            .keyword_index
            .query_by_keyword_overlap(&keywords, top_k.saturating_mul(CANDIDATES_PER_RESULT))
            .await?;

        info!(
            candidates = candidates.len(),
            "Ranking candidates for keywords {:?}", keywords
        );

        Ok(rank_by_overlap(&keywords, candidates, top_k)
            .into_iter()
            .map(KeywordSearchHit::from)
            .collect())
    }
}

/// Number of `keywords` found in the document keywords
fn overlap_score(keywords: &[String], document: &ImageDocument) -> usize {
    keywords
        .iter()
        .filter(|keyword| document.keywords.contains(keyword))
        .count()
}

/// Keeps the `top_k` candidates sharing the most keywords with the query
///
/// Candidates sharing none are dropped. The sort is stable.
fn rank_by_overlap(
    keywords: &[String],
    candidates: Vec<ImageDocument>,
    top_k: usize,
) -> Vec<ImageDocument> {
    let mut scored: Vec<(usize, ImageDocument)> = candidates
        .into_iter()
        .map(|document| (overlap_score(keywords, &document), document))
        .filter(|(score, _)| *score > 0)
        .collect();

    scored.sort_by(|(a, _), (b, _)| b.cmp(a));
    scored.truncate(top_k);

    scored.into_iter().map(|(_, document)| document).collect()
}

#[derive(thiserror::Error)]
pub enum KeywordSearchError {
    #[error(transparent)]
    KeywordIndex(#[from] KeywordIndexError),
}

impl std::fmt::Debug for KeywordSearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
