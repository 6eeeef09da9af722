pub mod image_uploaded;
