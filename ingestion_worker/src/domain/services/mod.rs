pub mod description_client;
pub mod ingestion_pipeline;
