/// Number of dimensions of every embedding stored in the vector index
pub const EMBEDDING_DIMENSION: usize = 1408;

/// A vector produced by the multimodal embedding model, tagged with the kind of input it was computed from
///
/// Text and image embeddings share the same space, which is what makes a text query
/// comparable to image vectors.
#[derive(Debug, Clone, PartialEq)]
pub enum Embedding {
    Text(Vec<f32>),
    Image(Vec<f32>),
}

impl Embedding {
    pub fn vector(&self) -> &[f32] {
        match self {
            Embedding::Text(vector) | Embedding::Image(vector) => vector,
        }
    }

    pub fn dimension(&self) -> usize {
        self.vector().len()
    }
}
