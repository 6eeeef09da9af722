use std::time::Duration;

use common::configuration::{
    load_configuration, MeilisearchSettings, QdrantSettings, RetrySettings, VertexAiSettings,
};
use lapin::ConnectionProperties;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub rabbitmq: RabbitMQSettings,
    pub object_storage: ObjectStorageSettings,
    pub ingestion: IngestionSettings,
    pub vertex_ai: VertexAiSettings,
    pub retry: RetrySettings,
    pub meilisearch: MeilisearchSettings,
    pub qdrant: QdrantSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RabbitMQSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    /// Useful to create parallel exchanges during tests for example.
    pub exchange_name_prefix: String,
    /// Exchange on which the object storage publishes its upload notifications
    pub upload_exchange: String,
    /// Replicas of the worker sharing the same prefix consume from the same queue
    pub queue_name_prefix: String,
}

impl RabbitMQSettings {
    pub fn get_uri(&self) -> String {
        format!("amqp://{}:{}", &self.host, &self.port)
    }

    pub fn get_upload_exchange_name(&self) -> String {
        format!("{}_{}", self.exchange_name_prefix, self.upload_exchange)
    }

    pub fn get_connection_properties(&self) -> ConnectionProperties {
        ConnectionProperties::default()
            // Use tokio executor and reactor.
            // At the moment the reactor is only available for unix.
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio)
    }
}

/// Where uploaded images live and how they are referenced
#[derive(Deserialize, Debug, Clone)]
pub struct ObjectStorageSettings {
    /// Bucket assumed when an upload notification does not name one
    pub default_bucket: String,
    /// Scheme of the references given to the remote models, ex: "gs"
    pub uri_scheme: String,
    pub public_base_url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct IngestionSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_concurrent_ingestions: usize,
    /// Wall-clock budget of one ingestion, retries included
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_secs: u64,
}

impl IngestionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Extracts the worker settings from `configuration/` and `APP_` env variables
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    load_configuration::<Settings>()
}
