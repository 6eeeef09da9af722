pub mod keyword_search_ranker;
pub mod semantic_search_ranker;
