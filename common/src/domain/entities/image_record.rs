use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    embedding::Embedding,
    image_point::{ImagePoint, ImagePointMetadata},
};

/// Title given to an image when the description model did not provide one
pub const UNTITLED_IMAGE_TITLE: &str = "Untitled Image";

/// An uploaded object, as located in the object storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub bucket: String,
    pub path: String,
}

impl StoredImage {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into(),
        }
    }

    /// Id of the record built from this image
    ///
    /// Derived from the basename of the path, so uploading again to the same path
    /// overwrites the same record. Characters not accepted in a document id
    /// by the keyword index are replaced by `_`.
    pub fn record_id(&self) -> String {
        let basename = self
            .path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();

        basename
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Reference given to the remote models, ex: `gs://bucket/path/to/image.png`
    pub fn source_uri(&self, uri_scheme: &str) -> String {
        format!("{}://{}/{}", uri_scheme, self.bucket, self.path)
    }

    /// Publicly reachable URL of the image
    pub fn public_url(&self, public_base_url: &str) -> String {
        format!(
            "{}/{}/{}",
            public_base_url.trim_end_matches('/'),
            self.bucket,
            self.path
        )
    }
}

/// Everything known about an ingested image
///
/// `keywords` is always the result of `extract_keywords(description)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub id: String,
    pub source_uri: String,
    pub public_url: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub embedding: Embedding,
    pub uploaded_at: DateTime<Utc>,
}

impl ImageRecord {
    /// Document stored in the keyword index
    pub fn to_document(&self) -> ImageDocument {
        ImageDocument {
            id: self.id.clone(),
            source_uri: self.source_uri.clone(),
            public_url: self.public_url.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            keywords: self.keywords.clone(),
            uploaded_at: self.uploaded_at,
        }
    }

    /// Point stored in the vector index
    pub fn to_point(&self) -> ImagePoint {
        ImagePoint {
            id: self.id.clone(),
            vector: self.embedding.vector().to_vec(),
            metadata: ImagePointMetadata {
                title: self.title.clone(),
                description: self.description.clone(),
                public_url: self.public_url.clone(),
                uploaded_at: self.uploaded_at,
            },
        }
    }
}

/// An `ImageRecord` as stored in the keyword index: the embedding only lives in the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDocument {
    pub id: String,
    pub source_uri: String,
    pub public_url: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    /// Stored as epoch milliseconds to be sortable
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub uploaded_at: DateTime<Utc>,
}
