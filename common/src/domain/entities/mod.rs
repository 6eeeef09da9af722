pub mod embedding;
pub mod image_point;
pub mod image_record;
