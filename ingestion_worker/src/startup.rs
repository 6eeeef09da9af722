use std::sync::Arc;

use common::{
    configuration::{MeilisearchSettings, QdrantSettings},
    core::retry_policy::RetryPolicy,
    repositories::{
        image_document_meilisearch_repository::{
            ImageDocumentMeilisearchRepository, ImageDocumentMeilisearchRepositoryError,
        },
        image_point_qdrant_repository::{
            ImagePointQdrantRepository, ImagePointQdrantRepositoryError,
        },
    },
    services::{
        embedding_client::VertexEmbeddingClient,
        vertex_ai::{RemoteCallError, VertexAiClient},
    },
};
use futures::{future::join_all, TryFutureExt};
use lapin::Connection as RabbitMQConnection;
use meilisearch_sdk::Client as MeilisearchClient;
use qdrant_client::prelude::{QdrantClient, QdrantClientConfig};
use secrecy::ExposeSecret;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{
    configuration::{IngestionSettings, RabbitMQSettings, Settings},
    domain::services::{
        description_client::VertexDescriptionClient, ingestion_pipeline::IngestionPipeline,
    },
    handlers::handler_image_uploaded::{self, RegisterHandlerImageUploadedError},
};

/// Holds the message handlers of the worker, running on their own tasks
pub struct Application {
    rabbitmq_upload_exchange_name: String,
    rabbitmq_queue_name_prefix: String,
    handlers: Vec<JoinHandle<Result<(), ApplicationError>>>,
}

impl Application {
    #[tracing::instrument(name = "Building worker application")]
    pub async fn build(settings: Settings) -> Result<Self, ApplicationError> {
        let rabbitmq_consuming_connection = get_rabbitmq_connection(&settings.rabbitmq).await?;

        let retry_policy = RetryPolicy::from(&settings.retry);
        let vertex_ai = VertexAiClient::try_new(&settings.vertex_ai)?;
        let image_describer =
            VertexDescriptionClient::new(vertex_ai.clone(), retry_policy.clone());
        let embedder = VertexEmbeddingClient::new(vertex_ai, retry_policy);

        let image_point_repository = ImagePointQdrantRepository::try_new(
            get_qdrant_client(&settings.qdrant)?,
            &settings.qdrant.collection,
            &settings.qdrant.collection_distance,
            settings.qdrant.collection_vector_size,
        )
        .await?;

        let image_document_repository = ImageDocumentMeilisearchRepository::try_new(
            get_meilisearch_client(&settings.meilisearch),
            &settings.meilisearch.images_index,
            settings.meilisearch.task_timeout(),
        )
        .await?;

        // Shared with every concurrent ingestion
        let ingestion_pipeline = Arc::new(IngestionPipeline::new(
            Arc::new(image_describer),
            Arc::new(embedder),
            Arc::new(image_point_repository),
            Arc::new(image_document_repository),
            settings.object_storage.clone(),
        ));

        let mut app = Self {
            rabbitmq_upload_exchange_name: settings.rabbitmq.get_upload_exchange_name(),
            rabbitmq_queue_name_prefix: settings.rabbitmq.queue_name_prefix.clone(),
            handlers: vec![],
        };

        app.prepare_message_handlers(
            rabbitmq_consuming_connection,
            ingestion_pipeline,
            settings.ingestion,
        );

        Ok(app)
    }

    /// Spawns the task on which the upload notifications handler runs
    #[tracing::instrument(
        name = "Preparing the messages handlers",
        skip(self, rabbitmq_consuming_connection, ingestion_pipeline)
    )]
    fn prepare_message_handlers(
        &mut self,
        rabbitmq_consuming_connection: RabbitMQConnection,
        ingestion_pipeline: Arc<IngestionPipeline>,
        ingestion_settings: IngestionSettings,
    ) {
        let handler = tokio::spawn(
            handler_image_uploaded::register_handler(
                rabbitmq_consuming_connection,
                self.rabbitmq_upload_exchange_name.clone(),
                self.rabbitmq_queue_name_prefix.clone(),
                ingestion_pipeline,
                ingestion_settings,
            )
            .map_err(|e| e.into()),
        );

        self.handlers.push(handler);
    }

    /// Runs the application until its handlers stop
    ///
    /// self is moved in order for the application not to drop out of scope
    pub async fn run_until_stopped(self) -> Result<(), ApplicationError> {
        let handler_results = join_all(self.handlers).await;

        info!(
            "Application stopped with the following results: {:?}",
            handler_results
        );

        for result in handler_results {
            result??;
        }

        info!("👋 Bye!");
        Ok(())
    }
}

/// Creates a connection to RabbitMQ
pub async fn get_rabbitmq_connection(
    config: &RabbitMQSettings,
) -> Result<RabbitMQConnection, lapin::Error> {
    RabbitMQConnection::connect(&config.get_uri(), config.get_connection_properties()).await
}

/// Set up a client to Qdrant
pub fn get_qdrant_client(config: &QdrantSettings) -> Result<QdrantClient, ApplicationError> {
    let qdrant_config = QdrantClientConfig::from_url(&config.get_grpc_base_url());
    QdrantClient::new(Some(qdrant_config)).map_err(|e| ApplicationError::QdrantError(e.to_string()))
}

/// Set up a client to Meilisearch
pub fn get_meilisearch_client(config: &MeilisearchSettings) -> MeilisearchClient {
    MeilisearchClient::new(config.endpoint(), Some(config.api_key.expose_secret()))
}

#[derive(thiserror::Error, Debug)]
pub enum ApplicationError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error(transparent)]
    RabbitMQError(#[from] lapin::Error),
    #[error(transparent)]
    RegisterHandlerImageUploadedError(#[from] RegisterHandlerImageUploadedError),
    #[error(transparent)]
    RemoteCallError(#[from] RemoteCallError),
    #[error("Error from Qdrant: {0}")]
    QdrantError(String),
    #[error(transparent)]
    ImagePointQdrantRepositoryError(#[from] ImagePointQdrantRepositoryError),
    #[error(transparent)]
    ImageDocumentMeilisearchRepositoryError(#[from] ImageDocumentMeilisearchRepositoryError),
    #[error("Handler task failed: {0}")]
    HandlerTaskError(#[from] tokio::task::JoinError),
}
