use actix_web::{web, HttpResponse};
use tracing::info;

use crate::{
    domain::services::semantic_search_ranker::SemanticSearchRanker,
    routes::{resolve_limit, SearchError, SearchResults},
};

#[tracing::instrument(name = "Semantic search handler", skip(semantic_search_ranker))]
pub async fn semantic_search(
    semantic_search_ranker: web::Data<SemanticSearchRanker>,
    body: web::Json<SemanticSearchBodyData>,
) -> Result<HttpResponse, SearchError> {
    let limit = resolve_limit(body.limit)?;
    let query = body.query.as_deref().unwrap_or_default();

    info!("Semantic search of images for query: {:?}", query);

    let results = semantic_search_ranker.search(query, limit).await?;

    Ok(HttpResponse::Ok().json(SearchResults { results }))
}

#[derive(Debug, serde::Deserialize)]
pub struct SemanticSearchBodyData {
    query: Option<String>,
    limit: Option<i64>,
}
