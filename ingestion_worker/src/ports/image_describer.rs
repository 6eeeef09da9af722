use async_trait::async_trait;
use common::{helper::error_chain_fmt, services::vertex_ai::RemoteCallError};

/// Human readable description of an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescription {
    pub title: String,
    pub description: String,
}

/// Describes images with a multimodal generative model
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    /// # Parameters
    /// - `image_ref`: storage reference of the image, readable by the model
    /// - `mime_type`: content type of the image, ex: "image/png"
    async fn describe(
        &self,
        image_ref: &str,
        mime_type: &str,
    ) -> Result<ImageDescription, DescriptionClientError>;
}

#[derive(thiserror::Error)]
pub enum DescriptionClientError {
    #[error(transparent)]
    RemoteCall(#[from] RemoteCallError),

    #[error("The description model answered without any text")]
    NoContent,

    #[error("The description model answered without a description")]
    MissingDescription,
}

impl std::fmt::Debug for DescriptionClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
