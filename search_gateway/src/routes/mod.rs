mod health_check;
mod search;
mod search_error;
mod semantic_search;

pub use health_check::*;
pub use search::*;
pub use search_error::*;
pub use semantic_search::*;

/// Number of results returned when the request sets no limit
pub const DEFAULT_LIMIT: usize = 5;
/// Larger requested limits are lowered to this value
pub const MAX_LIMIT: usize = 100;

#[derive(Debug, serde::Serialize)]
pub struct SearchResults<T> {
    pub results: Vec<T>,
}

/// Validates the requested number of results
pub fn resolve_limit(limit: Option<i64>) -> Result<usize, SearchError> {
    match limit {
        None => Ok(DEFAULT_LIMIT),
        Some(limit) if limit < 1 => Err(SearchError::InvalidLimit(limit)),
        Some(limit) => Ok(usize::try_from(limit).unwrap_or(MAX_LIMIT).min(MAX_LIMIT)),
    }
}
