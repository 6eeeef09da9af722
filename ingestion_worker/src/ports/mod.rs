pub mod image_describer;
