use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    core::retry_policy::RetryPolicy,
    domain::entities::embedding::{Embedding, EMBEDDING_DIMENSION},
    ports::embedder::{Embedder, EmbeddingClientError, EmbeddingInput},
    services::vertex_ai::{RemoteCallError, VertexAiClient},
};

/// Embeds texts and images with the Vertex AI multimodal embedding model
pub struct VertexEmbeddingClient {
    vertex_ai: VertexAiClient,
    retry_policy: RetryPolicy,
}

impl VertexEmbeddingClient {
    pub fn new(vertex_ai: VertexAiClient, retry_policy: RetryPolicy) -> Self {
        Self {
            vertex_ai,
            retry_policy,
        }
    }
}

#[async_trait]
impl Embedder for VertexEmbeddingClient {
    #[tracing::instrument(name = "Computing embedding", skip(self))]
    async fn embed(&self, input: &EmbeddingInput) -> Result<Embedding, EmbeddingClientError> {
        let request = PredictRequest::try_from(input)?;
        let model = &self.vertex_ai.settings().embedding_model;

        let response: PredictResponse = self
            .retry_policy
            .retry(
                || self.vertex_ai.call_model(model, "predict", &request),
                RemoteCallError::is_rate_limited,
            )
            .await?;

        let embedding = response.try_into_embedding()?;
        info!(dimension = embedding.dimension(), "Computed embedding");

        Ok(embedding)
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: Vec<EmbeddingInstance<'a>>,
    parameters: PredictParameters,
}

#[derive(Debug, Serialize)]
struct EmbeddingInstance<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<ImageReference<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageReference<'a> {
    gcs_uri: &'a str,
}

#[derive(Debug, Serialize)]
struct PredictParameters {
    dimension: usize,
}

impl<'a> TryFrom<&'a EmbeddingInput> for PredictRequest<'a> {
    type Error = EmbeddingClientError;

    fn try_from(input: &'a EmbeddingInput) -> Result<Self, Self::Error> {
        let text = input.text.as_deref().filter(|text| !text.is_empty());
        let image = input
            .image_ref
            .as_deref()
            .filter(|image_ref| !image_ref.is_empty())
            .map(|gcs_uri| ImageReference { gcs_uri });

        if text.is_none() && image.is_none() {
            return Err(EmbeddingClientError::InvalidInput);
        }

        Ok(Self {
            instances: vec![EmbeddingInstance { text, image }],
            parameters: PredictParameters {
                dimension: EMBEDDING_DIMENSION,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<EmbeddingPrediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingPrediction {
    text_embedding: Option<Vec<f32>>,
    image_embedding: Option<Vec<f32>>,
}

impl PredictResponse {
    /// Resolves the first prediction into an embedding of the expected dimension
    ///
    /// When both a text and an image were embedded, the text embedding is kept.
    fn try_into_embedding(self) -> Result<Embedding, EmbeddingClientError> {
        let prediction = self
            .predictions
            .into_iter()
            .next()
            .ok_or(EmbeddingClientError::EmptyPrediction)?;

        let embedding = match (prediction.text_embedding, prediction.image_embedding) {
            (Some(vector), _) => Embedding::Text(vector),
            (None, Some(vector)) => Embedding::Image(vector),
            (None, None) => return Err(EmbeddingClientError::NoEmbeddingFound),
        };

        if embedding.dimension() != EMBEDDING_DIMENSION {
            return Err(EmbeddingClientError::UnexpectedDimension {
                expected: EMBEDDING_DIMENSION,
                actual: embedding.dimension(),
            });
        }

        Ok(embedding)
    }
}
