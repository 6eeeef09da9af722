use serde::Deserialize;

use crate::helper::error_chain_fmt;

/// Notification sent by the object storage once an object has been uploaded
///
/// Every field is optional: the notification is validated by the ingestion pipeline,
/// which skips objects that are not images.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUploadedDto {
    pub bucket: Option<String>,
    /// Path of the object inside the bucket
    pub name: Option<String>,
    pub content_type: Option<String>,
}

impl ImageUploadedDto {
    pub fn try_parsing(data: &[u8]) -> Result<Self, ImageUploadedDtoError> {
        let data = std::str::from_utf8(data)?;
        let dto = serde_json::from_str(data)
            .map_err(|e| ImageUploadedDtoError::InvalidJsonData(e, data.to_string()))?;

        Ok(dto)
    }
}

#[derive(thiserror::Error)]
pub enum ImageUploadedDtoError {
    #[error("Data could not be converted from utf8 u8 vector to string")]
    InvalidStringData(#[from] std::str::Utf8Error),

    #[error("Data did not represent a valid JSON object: {0}. Data: {1}")]
    InvalidJsonData(serde_json::Error, String),
}

impl std::fmt::Debug for ImageUploadedDtoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
