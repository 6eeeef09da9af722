pub mod handler_image_uploaded;
