pub mod embedder;
pub mod keyword_index;
pub mod vector_index;
