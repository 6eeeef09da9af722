pub mod image_document_meilisearch_repository;
pub mod image_point_qdrant_repository;
