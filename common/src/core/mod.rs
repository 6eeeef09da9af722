pub mod keyword_extractor;
pub mod retry_policy;
