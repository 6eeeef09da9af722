use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use qdrant_client::{
    prelude::QdrantClient,
    qdrant::{
        self, value::Kind, vectors_config::Config, CreateCollection, Distance, PointStruct,
        ScoredPoint, SearchPoints, VectorParams, VectorsConfig,
    },
};
use tracing::info;
use uuid::Uuid;

use crate::{
    domain::entities::{
        embedding::EMBEDDING_DIMENSION,
        image_point::{ImagePoint, ImagePointMetadata, ScoredImagePoint},
    },
    helper::error_chain_fmt,
    ports::vector_index::{VectorIndex, VectorIndexError},
};

const ID_KEY: &str = "image_id";
const TITLE_KEY: &str = "title";
const DESCRIPTION_KEY: &str = "description";
const PUBLIC_URL_KEY: &str = "public_url";
const UPLOADED_AT_KEY: &str = "uploaded_at";

/// Repository for image embeddings (`ImagePoint`) persisted in Qdrant
pub struct ImagePointQdrantRepository {
    client: QdrantClient,
    collection_name: String,
}

impl ImagePointQdrantRepository {
    #[tracing::instrument(
        name = "Initializing Qdrant and the associated collection",
        skip(client)
    )]
    pub async fn try_new(
        client: QdrantClient,
        collection_name: &str,
        collection_distance: &str,
        collection_vector_size: u64,
    ) -> Result<Self, ImagePointQdrantRepositoryError> {
        let collection_distance = similarity_distance(collection_distance)?;

        if collection_vector_size != EMBEDDING_DIMENSION as u64 {
            return Err(ImagePointQdrantRepositoryError::QdrantConfigurationError(
                format!(
                    "Collection vector size must be {}, got {}",
                    EMBEDDING_DIMENSION, collection_vector_size
                ),
            ));
        }

        match client
            .create_collection(&CreateCollection {
                collection_name: collection_name.to_string(),
                vectors_config: Some(VectorsConfig {
                    config: Some(Config::Params(VectorParams {
                        size: collection_vector_size,
                        distance: collection_distance as i32,
                        ..Default::default()
                    })),
                }),
                ..Default::default()
            })
            .await
        {
            Ok(_) => info!(collection_name, "Created Qdrant collection"),
            Err(error) => {
                // Qdrant client only returns anyhow errors, an existing collection is not a failure
                if !error.to_string().contains("already exists") {
                    return Err(ImagePointQdrantRepositoryError::QdrantError(
                        error.to_string(),
                    ));
                }
            }
        };

        Ok(Self {
            client,
            collection_name: collection_name.to_string(),
        })
    }

    #[tracing::instrument(name = "Saving image point to Qdrant", skip(self, point), fields(id = %point.id))]
    pub async fn save(&self, point: &ImagePoint) -> Result<(), ImagePointQdrantRepositoryError> {
        self.client
            .upsert_points_blocking(
                &self.collection_name,
                vec![PointStruct::from(point.clone())],
                None,
            )
            .await
            .map_err(|e| ImagePointQdrantRepositoryError::QdrantError(e.to_string()))?;

        info!("Saved image point");
        Ok(())
    }

    #[tracing::instrument(name = "Searching nearest image points in Qdrant", skip(self, vector))]
    pub async fn search_nearest(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredImagePoint>, ImagePointQdrantRepositoryError> {
        let response = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.collection_name.clone(),
                vector: vector.to_vec(),
                limit: top_k as u64,
                with_payload: Some(true.into()),
                ..Default::default()
            })
            .await
            .map_err(|e| ImagePointQdrantRepositoryError::QdrantError(e.to_string()))?;

        info!(matches = response.result.len(), "Found nearest image points");

        response
            .result
            .into_iter()
            .map(ScoredImagePoint::try_from)
            .collect()
    }
}

#[async_trait]
impl VectorIndex for ImagePointQdrantRepository {
    async fn upsert(&self, point: &ImagePoint) -> Result<(), VectorIndexError> {
        Ok(self.save(point).await?)
    }

    async fn query_nearest(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredImagePoint>, VectorIndexError> {
        Ok(self.search_nearest(vector, top_k).await?)
    }
}

#[derive(thiserror::Error)]
pub enum ImagePointQdrantRepositoryError {
    #[error("Error from Qdrant: {0}")]
    QdrantError(String),

    #[error("Error from Qdrant config: {0}")]
    QdrantConfigurationError(String),

    #[error("Point {0} has an invalid payload: {1}")]
    InvalidPayload(String, String),
}

impl std::fmt::Debug for ImagePointQdrantRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl From<ImagePointQdrantRepositoryError> for VectorIndexError {
    fn from(error: ImagePointQdrantRepositoryError) -> Self {
        match error {
            ImagePointQdrantRepositoryError::InvalidPayload(id, reason) => {
                VectorIndexError::InvalidPoint(id, reason)
            }
            other => VectorIndexError::Backend(other.to_string()),
        }
    }
}

/// Parses the configured distance of the collection
///
/// Only similarity metrics are accepted: searches keep the points scoring above a threshold,
/// which requires a higher score to mean a closer point.
fn similarity_distance(name: &str) -> Result<Distance, ImagePointQdrantRepositoryError> {
    match Distance::from_str_name(name) {
        Some(distance @ (Distance::Cosine | Distance::Dot)) => Ok(distance),
        Some(_) => Err(ImagePointQdrantRepositoryError::QdrantConfigurationError(
            format!("Qdrant distance {} is not a similarity, use Cosine or Dot", name),
        )),
        None => Err(ImagePointQdrantRepositoryError::QdrantConfigurationError(
            format!("Invalid Qdrant distance: {}", name),
        )),
    }
}

/// Qdrant only accepts UUIDs or integers as point ids: the record id is mapped to a stable UUID
pub fn point_uuid(image_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, image_id.as_bytes())
}

impl From<ImagePoint> for PointStruct {
    fn from(point: ImagePoint) -> Self {
        let id = point_uuid(&point.id);
        let mut payload: HashMap<String, qdrant::Value> = point.metadata.into();
        payload.insert(ID_KEY.into(), qdrant::Value::from(point.id));

        Self {
            id: Some(id.to_string().into()),
            vectors: Some(point.vector.into()),
            payload,
        }
    }
}

impl From<ImagePointMetadata> for HashMap<String, qdrant::Value> {
    fn from(metadata: ImagePointMetadata) -> Self {
        HashMap::from([
            (TITLE_KEY.into(), qdrant::Value::from(metadata.title)),
            (DESCRIPTION_KEY.into(), qdrant::Value::from(metadata.description)),
            (PUBLIC_URL_KEY.into(), qdrant::Value::from(metadata.public_url)),
            (
                UPLOADED_AT_KEY.into(),
                qdrant::Value::from(metadata.uploaded_at.timestamp_millis()),
            ),
        ])
    }
}

impl TryFrom<ScoredPoint> for ScoredImagePoint {
    type Error = ImagePointQdrantRepositoryError;

    fn try_from(point: ScoredPoint) -> Result<Self, Self::Error> {
        let payload = point.payload;
        let id = payload_string(&payload, ID_KEY).ok_or_else(|| {
            ImagePointQdrantRepositoryError::InvalidPayload(
                format!("{:?}", point.id),
                format!("missing {}", ID_KEY),
            )
        })?;
        let missing = |key: &str| {
            ImagePointQdrantRepositoryError::InvalidPayload(id.clone(), format!("missing {}", key))
        };

        let uploaded_at_millis = payload_integer(&payload, UPLOADED_AT_KEY)
            .ok_or_else(|| missing(UPLOADED_AT_KEY))?;
        let uploaded_at = Utc
            .timestamp_millis_opt(uploaded_at_millis)
            .single()
            .ok_or_else(|| missing(UPLOADED_AT_KEY))?;

        let metadata = ImagePointMetadata {
            title: payload_string(&payload, TITLE_KEY).ok_or_else(|| missing(TITLE_KEY))?,
            description: payload_string(&payload, DESCRIPTION_KEY)
                .ok_or_else(|| missing(DESCRIPTION_KEY))?,
            public_url: payload_string(&payload, PUBLIC_URL_KEY)
                .ok_or_else(|| missing(PUBLIC_URL_KEY))?,
            uploaded_at,
        };

        Ok(Self {
            id,
            score: point.score,
            metadata,
        })
    }
}

fn payload_string(payload: &HashMap<String, qdrant::Value>, key: &str) -> Option<String> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(value) => Some(value.clone()),
        _ => None,
    }
}

fn payload_integer(payload: &HashMap<String, qdrant::Value>, key: &str) -> Option<i64> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::IntegerValue(value) => Some(*value),
        _ => None,
    }
}
