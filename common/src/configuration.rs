use std::time::Duration;

use secrecy::Secret;
use serde::{de::DeserializeOwned, Deserialize};
use serde_aux::field_attributes::deserialize_number_from_string;

use crate::core::retry_policy::RetryPolicy;

/// Access to the Vertex AI endpoints used to describe and embed images
#[derive(Debug, Deserialize, Clone)]
pub struct VertexAiSettings {
    /// Overrides the regional endpoint, ex: to target a local fake during tests
    pub base_url: Option<String>,
    pub project_id: String,
    pub location: String,
    pub access_token: Secret<String>,
    pub description_model: String,
    pub embedding_model: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub request_timeout_secs: u64,
}

impl VertexAiSettings {
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(base_url) => base_url.trim_end_matches('/').to_string(),
            None => format!("https://{}-aiplatform.googleapis.com", self.location),
        }
    }

    /// URL of a publisher model method, ex: `gemini-2.0-flash-001:generateContent`
    pub fn model_endpoint(&self, model: &str, method: &str) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:{}",
            self.base_url(),
            self.project_id,
            self.location,
            model,
            method
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrySettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_attempts: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub initial_delay_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_jitter_ms: u64,
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy::new(
            settings.max_attempts,
            Duration::from_millis(settings.initial_delay_ms),
            Duration::from_millis(settings.max_jitter_ms),
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MeilisearchSettings {
    pub api_key: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub images_index: String,
    /// How long to wait for Meilisearch to process an indexing task
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub task_timeout_secs: u64,
}

impl MeilisearchSettings {
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QdrantSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub grpc_port: u16,
    pub collection: String,
    /// Qdrant distance name, "Cosine" or "Dot"
    pub collection_distance: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub collection_vector_size: u64,
}

impl QdrantSettings {
    pub fn get_grpc_base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.grpc_port)
    }
}

/// Extracts settings of type `T` from configuration files and env variables
///
/// `base.yaml` contains the settings shared by all environments, and one file per environment
/// (`local.yaml`, `production.yaml`) overrides them. The environment is selected with `APP_ENVIRONMENT`
/// and defaults to `local`.
///
/// Settings are also taken from environment variables: with a prefix of APP and '__' as separator
/// For ex: `APP_APPLICATION__PORT=5001` would set `Settings.application.port`
pub fn load_configuration<T: DeserializeOwned>() -> Result<T, config::ConfigError> {
    let base_path =
        std::env::current_dir().map_err(|error| config::ConfigError::Foreign(Box::new(error)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<T>()
}

/// The possible runtime environment for our services.
#[derive(Debug, PartialEq, Eq)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}
