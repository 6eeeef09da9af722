use chrono::{DateTime, Utc};

/// An image as stored in the vector index: its embedding and the metadata needed to display a match
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePoint {
    /// Id of the `ImageRecord` the point was built from
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ImagePointMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImagePointMetadata {
    pub title: String,
    pub description: String,
    pub public_url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A point returned by a nearest neighbours query, with its similarity to the queried vector
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredImagePoint {
    pub id: String,
    pub score: f32,
    pub metadata: ImagePointMetadata,
}
