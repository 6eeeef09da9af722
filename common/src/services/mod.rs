pub mod embedding_client;
pub mod vertex_ai;
