use std::sync::Arc;

use chrono::Utc;
use common::{
    core::keyword_extractor::extract_keywords,
    domain::entities::{
        embedding::EMBEDDING_DIMENSION,
        image_record::{ImageRecord, StoredImage},
    },
    dtos::image_uploaded::ImageUploadedDto,
    helper::error_chain_fmt,
    ports::{
        embedder::{Embedder, EmbeddingClientError, EmbeddingInput},
        keyword_index::{KeywordIndex, KeywordIndexError},
        vector_index::{VectorIndex, VectorIndexError},
    },
};
use tracing::{error, info};

use crate::{
    configuration::ObjectStorageSettings,
    ports::image_describer::{DescriptionClientError, ImageDescriber},
};

/// Result of the ingestion of one upload
#[derive(Debug)]
pub enum IngestionOutcome {
    /// The image is searchable in both indexes
    Indexed(ImageRecord),
    /// The upload was not an image to ingest, nothing was written
    Skipped(SkipReason),
    /// The ingestion stopped on an error, already logged
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotAnImage(Option<String>),
    MissingPath,
}

/// An upload accepted by the validation step
#[derive(Debug)]
struct ImageUpload {
    image: StoredImage,
    content_type: String,
}

/// Turns an uploaded image into a record of the vector index and of the keyword index
///
/// Steps run in order: validation, description, embedding, vector index write, keyword index write.
/// The first failing step stops the ingestion, so a failed description or embedding writes nothing.
/// A failure of the keyword index write leaves the vector index updated: both writes are not atomic.
pub struct IngestionPipeline {
    image_describer: Arc<dyn ImageDescriber>,
    embedder: Arc<dyn Embedder>,
    vector_index: Arc<dyn VectorIndex>,
    keyword_index: Arc<dyn KeywordIndex>,
    object_storage: ObjectStorageSettings,
}

impl IngestionPipeline {
    pub fn new(
        image_describer: Arc<dyn ImageDescriber>,
        embedder: Arc<dyn Embedder>,
        vector_index: Arc<dyn VectorIndex>,
        keyword_index: Arc<dyn KeywordIndex>,
        object_storage: ObjectStorageSettings,
    ) -> Self {
        Self {
            image_describer,
            embedder,
            vector_index,
            keyword_index,
            object_storage,
        }
    }

    /// Ingests one upload
    ///
    /// Never returns an error: failures are logged here and reported as `IngestionOutcome::Failed`.
    #[tracing::instrument(name = "Ingesting uploaded image", skip(self))]
    pub async fn ingest(&self, upload: &ImageUploadedDto) -> IngestionOutcome {
        let upload = match self.validate(upload) {
            Ok(upload) => upload,
            Err(reason) => {
                info!(?reason, "Skipping upload");
                return IngestionOutcome::Skipped(reason);
            }
        };

        match self.try_ingest(&upload).await {
            Ok(record) => {
                info!(id = %record.id, keywords = record.keywords.len(), "Image indexed");
                IngestionOutcome::Indexed(record)
            }
            Err(error) => {
                error!(
                    ?error,
                    bucket = %upload.image.bucket,
                    path = %upload.image.path,
                    "Failed to ingest image"
                );
                IngestionOutcome::Failed
            }
        }
    }

    fn validate(&self, upload: &ImageUploadedDto) -> Result<ImageUpload, SkipReason> {
        // MIME types are case-insensitive
        let content_type = upload
            .content_type
            .as_deref()
            .map(str::to_ascii_lowercase)
            .filter(|content_type| content_type.starts_with("image/"))
            .ok_or_else(|| SkipReason::NotAnImage(upload.content_type.clone()))?;

        let path = upload
            .name
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .ok_or(SkipReason::MissingPath)?;

        let bucket = upload
            .bucket
            .as_deref()
            .filter(|bucket| !bucket.is_empty())
            .unwrap_or(&self.object_storage.default_bucket);

        let image = StoredImage::new(bucket, path);
        if image.record_id().is_empty() {
            return Err(SkipReason::MissingPath);
        }

        Ok(ImageUpload {
            image,
            content_type,
        })
    }

    async fn try_ingest(&self, upload: &ImageUpload) -> Result<ImageRecord, IngestionError> {
        let ImageUpload {
            image,
            content_type,
        } = upload;
        let source_uri = image.source_uri(&self.object_storage.uri_scheme);

        let description = self
            .image_describer
            .describe(&source_uri, content_type)
            .await?;

        let embedding = self
            .embedder
            .embed(&EmbeddingInput::image(source_uri.as_str()))
            .await?;
        if embedding.dimension() != EMBEDDING_DIMENSION {
            return Err(IngestionError::InvalidEmbedding {
                expected: EMBEDDING_DIMENSION,
                actual: embedding.dimension(),
            });
        }

        let record = ImageRecord {
            id: image.record_id(),
            public_url: image.public_url(&self.object_storage.public_base_url),
            source_uri,
            keywords: extract_keywords(&description.description),
            title: description.title,
            description: description.description,
            embedding,
            uploaded_at: Utc::now(),
        };

        self.vector_index.upsert(&record.to_point()).await?;
        self.keyword_index.upsert(&record.to_document()).await?;

        Ok(record)
    }
}

#[derive(thiserror::Error)]
pub enum IngestionError {
    #[error("Failed to describe the image")]
    Description(#[from] DescriptionClientError),

    #[error("Failed to compute the image embedding")]
    Embedding(#[from] EmbeddingClientError),

    #[error("Embedding has {actual} dimensions instead of {expected}")]
    InvalidEmbedding { expected: usize, actual: usize },

    #[error("Failed to write the image to the vector index")]
    VectorIndex(#[from] VectorIndexError),

    #[error("Failed to write the image to the keyword index")]
    KeywordIndex(#[from] KeywordIndexError),
}

impl std::fmt::Debug for IngestionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
