use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{error::InternalError, error::JsonPayloadError, HttpRequest, HttpResponse, ResponseError};
use common::helper::error_chain_fmt;
use serde_json::json;
use tracing::error;

use crate::domain::services::{
    keyword_search_ranker::KeywordSearchError, semantic_search_ranker::SemanticSearchError,
};

#[derive(thiserror::Error)]
pub enum SearchError {
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error("Invalid limit {0}: at least 1 result must be requested")]
    InvalidLimit(i64),
    #[error(transparent)]
    KeywordSearchError(#[from] KeywordSearchError),
    #[error(transparent)]
    SemanticSearchError(#[from] SemanticSearchError),
}

impl std::fmt::Debug for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for SearchError {
    fn status_code(&self) -> StatusCode {
        match self {
            SearchError::InvalidBody(_)
            | SearchError::InvalidLimit(_)
            | SearchError::SemanticSearchError(SemanticSearchError::MissingQuery) => {
                StatusCode::BAD_REQUEST
            }
            SearchError::KeywordSearchError(_) | SearchError::SemanticSearchError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Server errors are only detailed in the logs
    #[tracing::instrument(name = "Response error from search controllers", skip(self), fields(error = %self))]
    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        let status_code = self.status_code();
        let message = if status_code.is_server_error() {
            error!(error = ?self, "Search failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        HttpResponse::build(status_code)
            .insert_header(ContentType::json())
            .json(json!({ "error": message }))
    }
}

/// Answers malformed JSON bodies with the same `{ "error": ... }` shape as the controllers
pub fn json_error_handler(error: JsonPayloadError, _request: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest()
        .insert_header(ContentType::json())
        .json(json!({ "error": format!("Invalid request body: {}", error) }));

    InternalError::from_response(error, response).into()
}
