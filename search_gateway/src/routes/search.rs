use actix_web::{web, HttpResponse};
use tracing::info;

use crate::{
    domain::services::keyword_search_ranker::KeywordSearchRanker,
    routes::{resolve_limit, SearchError, SearchResults},
};

/// Keyword search controller
///
/// Every field of the body is optional, and so is the body itself:
/// without a query, the most recently uploaded images are returned.
#[tracing::instrument(name = "Keyword search handler", skip(keyword_search_ranker, body))]
pub async fn search(
    keyword_search_ranker: web::Data<KeywordSearchRanker>,
    body: web::Bytes,
) -> Result<HttpResponse, SearchError> {
    let body = SearchBodyData::try_parsing(&body)?;
    let limit = resolve_limit(body.limit)?;
    let query = body.query.as_deref().unwrap_or_default();

    info!("Searching images for query: {:?}", query);

    let results = keyword_search_ranker.search(query, limit).await?;

    Ok(HttpResponse::Ok().json(SearchResults { results }))
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct SearchBodyData {
    query: Option<String>,
    limit: Option<i64>,
}

impl SearchBodyData {
    /// Parses a JSON body, whatever its content type, an empty body being an empty request
    pub fn try_parsing(data: &[u8]) -> Result<Self, SearchError> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        serde_json::from_slice(data)
            .map_err(|error| SearchError::InvalidBody(error.to_string()))
    }
}
