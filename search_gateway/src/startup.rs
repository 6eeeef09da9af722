use std::{net::TcpListener, sync::Arc};

use actix_web::{dev::Server, web, App, HttpServer};
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
use meilisearch_sdk::Client as MeilisearchClient;
use qdrant_client::prelude::{QdrantClient, QdrantClientConfig};
use secrecy::ExposeSecret;
use tracing::info;
use tracing_actix_web::TracingLogger;

use crate::{
    configuration::Settings,
    domain::services::{
        keyword_search_ranker::KeywordSearchRanker, semantic_search_ranker::SemanticSearchRanker,
    },
    routes::{health_check, json_error_handler, search, semantic_search},
};

/// Holds the newly built server, and some useful properties
pub struct Application {
    // For tests
    port: u16,
    server: Server,
}

impl Application {
    /// Builds the rankers on top of the indexes, and binds the server
    ///
    /// - `workers`: number of actix workers, defaults to the number of physical CPU cores
    #[tracing::instrument(name = "Building gateway application")]
    pub async fn build(
        settings: Settings,
        workers: Option<usize>,
    ) -> Result<Self, ApplicationError> {
        let vertex_ai = VertexAiClient::try_new(&settings.vertex_ai)?;
        let embedder = VertexEmbeddingClient::new(vertex_ai, RetryPolicy::from(&settings.retry));

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

        let keyword_search_ranker = KeywordSearchRanker::new(Arc::new(image_document_repository));
        let semantic_search_ranker =
            SemanticSearchRanker::new(Arc::new(embedder), Arc::new(image_point_repository));

        let address = format!(
            "{}:{}",
            settings.application.host, settings.application.port
        );
        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();

        let server = run(
            listener,
            keyword_search_ranker,
            semantic_search_ranker,
            workers,
        )?;

        Ok(Self { port, server })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Only returns when the application is stopped
    ///
    /// self is moved in order for the application not to drop out of scope
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        info!("🚀 Search gateway listening on port {}", self.port);
        self.server.await
    }
}

/// Runs the HTTP server on an already bound listener
///
/// The rankers are shared by every actix worker.
pub fn run(
    listener: TcpListener,
    keyword_search_ranker: KeywordSearchRanker,
    semantic_search_ranker: SemanticSearchRanker,
    workers: Option<usize>,
) -> Result<Server, std::io::Error> {
    let keyword_search_ranker = web::Data::new(keyword_search_ranker);
    let semantic_search_ranker = web::Data::new(semantic_search_ranker);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .route("/health_check", web::get().to(health_check))
            .route("/search", web::post().to(search))
            .route("/semantic_search", web::post().to(semantic_search))
            .app_data(keyword_search_ranker.clone())
            .app_data(semantic_search_ranker.clone())
    });

    let server = match workers {
        Some(workers) => server.workers(workers),
        None => server,
    };

    Ok(server.listen(listener)?.run())
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
    RemoteCallError(#[from] RemoteCallError),
    #[error("Error from Qdrant: {0}")]
    QdrantError(String),
    #[error(transparent)]
    ImagePointQdrantRepositoryError(#[from] ImagePointQdrantRepositoryError),
    #[error(transparent)]
    ImageDocumentMeilisearchRepositoryError(#[from] ImageDocumentMeilisearchRepositoryError),
}
