use common::configuration::{
    load_configuration, MeilisearchSettings, QdrantSettings, RetrySettings, VertexAiSettings,
};
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub vertex_ai: VertexAiSettings,
    pub retry: RetrySettings,
    pub meilisearch: MeilisearchSettings,
    pub qdrant: QdrantSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
}

/// Extracts the gateway settings from `configuration/` and `APP_` env variables
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    load_configuration::<Settings>()
}
